use thiserror::Error;

/// Errors surfaced by identity loading, signing, and verification.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed identity file {path}: {reason}")]
    Malformed { path: String, reason: String },

    #[error("signature verification failed")]
    InvalidSignature,

    #[error("invalid base64 in identity material: {0}")]
    Encoding(String),
}

/// Errors surfaced by the on-disk trusted-peer store.
#[derive(Debug, Error)]
pub enum TrustStoreError {
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed trust store {path}: {reason}")]
    Malformed { path: String, reason: String },

    #[error("could not acquire trust store lock after {attempts} attempts")]
    LockTimeout { attempts: u32 },
}
