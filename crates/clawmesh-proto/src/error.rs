use thiserror::Error;

/// Envelope shape or domain is wrong in a way that is never worth retrying.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("malformed command envelope: {0}")]
    Malformed(String),
    #[error("unsupported envelope version {0}")]
    UnsupportedVersion(u32),
    #[error("unsupported envelope kind {0:?}")]
    UnsupportedKind(String),
    #[error("commandId must not be empty")]
    EmptyCommandId,
}

/// Failure resolving the authoritative trust block for a forward.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("forward carries a command envelope that does not validate")]
    InvalidCommandEnvelope,
    #[error("forward-level trust and envelope-level trust disagree")]
    TrustEnvelopeMismatch,
}
