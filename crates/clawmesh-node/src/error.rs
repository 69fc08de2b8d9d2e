use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config at {path}: {reason}")]
    Malformed { path: String, reason: String },
    #[error("scanIntervalMs must be >= 5000, got {0}")]
    ScanIntervalTooLow(u64),
}

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
}
