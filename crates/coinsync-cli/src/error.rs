use coinsync_core::{ConfigError, CoreError, StoreError};
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("tool returned an error: {0}")]
    ToolFailed(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::Core(CoreError::Config(_) | CoreError::Validation(_)) => 2,
            Self::ToolFailed(_) => 3,
            Self::Serialization(_) => 4,
            Self::Core(_) | Self::Store(_) | Self::Io(_) => 10,
        }
    }
}
