//! Node runtime wiring: configuration, the standard method/event dispatch
//! table, and the listener/static-peer/discovery lifecycle that sits on top
//! of `clawmesh-transport` and `clawmesh-mesh`.

mod config;
mod error;
mod handlers;
mod node;
mod propagation;
mod state;

pub use config::{find_config_path, load_config, parse_config, Config, PeerConfig};
pub use error::{ConfigError, NodeError};
pub use handlers::{NodeEventHandler, NodeRequestHandler};
pub use node::Node;
pub use propagation::Propagation;
pub use state::NodeState;
