//! Device identity and the trusted-peer store.
//!
//! An Ed25519 keypair generated on first run gives the node a stable
//! `deviceId` (hex SHA-256 of the public key). The trust store is the
//! single gate on who may complete a handshake: only `deviceId`s present
//! in it ever reach a live session (see `clawmesh-transport::handshake`).

mod error;
mod identity;
mod pairing;
mod trust;

pub use error::{IdentityError, TrustStoreError};
pub use identity::{verify, Identity};
pub use pairing::{PairingUri, PairingUriError};
pub use trust::{TrustStore, TrustedPeer};
