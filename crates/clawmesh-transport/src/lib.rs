//! WebSocket wire transport: the JSON frame shape, the signed handshake,
//! the per-connection driver, and the peer session registry that sits on
//! top of all accepted/dialed connections.

mod conn;
mod dialer;
mod driver;
mod error;
mod handshake;
mod listener;
mod registry;
mod session;
mod wire;

pub use conn::Conn;
pub use dialer::dial;
pub use driver::{run_connection, EventHandler, RequestHandler};
pub use error::{RpcError, TransportError};
pub use handshake::{
    canonical_signing_string, should_initiate, verify_auth_payload, AuthPayload, HandshakeError,
    CLOCK_DRIFT_MS,
};
pub use listener::accept_loop;
pub use registry::SessionRegistryHandle;
pub use session::{ConnectedPeer, PeerSession};
pub use wire::{WireError, WireFrame, MAX_PAYLOAD_BYTES};
