use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("payload exceeds {} bytes", crate::wire::MAX_PAYLOAD_BYTES)]
    PayloadTooLarge,
    #[error("malformed wire frame: {0}")]
    Malformed(String),
    #[error("websocket error: {0}")]
    Socket(String),
    #[error("connection closed")]
    Closed,
}

/// Why an `invoke` did not resolve to a peer response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    #[error("NOT_CONNECTED")]
    NotConnected,
    #[error("SEND_FAILED")]
    SendFailed,
    #[error("TIMEOUT")]
    Timeout,
    #[error("PEER_DISCONNECTED")]
    PeerDisconnected,
    #[error("remote error {0}: {1}")]
    Remote(String, String),
}

impl RpcError {
    pub fn code(&self) -> &str {
        match self {
            Self::NotConnected => "NOT_CONNECTED",
            Self::SendFailed => "SEND_FAILED",
            Self::Timeout => "TIMEOUT",
            Self::PeerDisconnected => "PEER_DISCONNECTED",
            Self::Remote(code, _) => code,
        }
    }
}
