//! A registered peer session: enough to address a connected peer without
//! touching its socket directly. Outgoing frames go through `outbound_tx`,
//! consumed by the single task that owns the actual socket write half.

use tokio::sync::mpsc::UnboundedSender;

use crate::wire::WireFrame;

#[derive(Clone)]
pub struct PeerSession {
    pub conn_id: String,
    pub device_id: String,
    pub display_name: Option<String>,
    pub capabilities: Vec<String>,
    /// `true` if this node dialed the peer; `false` if the peer connected
    /// to us.
    pub outbound: bool,
    pub connected_at_ms: i64,
    pub(crate) outbound_tx: UnboundedSender<WireFrame>,
}

/// A snapshot of one connected peer, as returned by `mesh.peers`/`mesh.status`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectedPeer {
    pub device_id: String,
    pub display_name: Option<String>,
    pub outbound: bool,
    pub capabilities: Vec<String>,
    pub connected_at_ms: i64,
}

impl From<&PeerSession> for ConnectedPeer {
    fn from(session: &PeerSession) -> Self {
        ConnectedPeer {
            device_id: session.device_id.clone(),
            display_name: session.display_name.clone(),
            outbound: session.outbound,
            capabilities: session.capabilities.clone(),
            connected_at_ms: session.connected_at_ms,
        }
    }
}
