//! LAN peer discovery behind one interface, two concrete backends: real
//! mDNS multicast and a static peer list from configuration. Discovery is a
//! signal source only — it neither decides trust nor opens connections.

mod backend;
mod composite;
mod error;
mod mdns;
mod static_backend;
mod types;

pub use backend::DiscoveryBackend;
pub use composite::CompositeDiscovery;
pub use error::DiscoveryError;
pub use mdns::MdnsDiscovery;
pub use static_backend::StaticDiscovery;
pub use types::{DiscoveredPeer, DiscoveryEvent};
