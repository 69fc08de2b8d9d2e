use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("mdns backend error: {0}")]
    Mdns(String),
    #[error("discovery backend already started")]
    AlreadyStarted,
}
