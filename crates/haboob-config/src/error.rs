//! Configuration error types.

use std::path::PathBuf;

/// Errors from loading, saving, or parsing `config.ron`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file exists but is not valid RON for [`Config`](crate::Config).
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[source] ron::Error),
}

impl ConfigError {
    /// The file the error concerns, if any.
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::Read { path, .. } | Self::Write { path, .. } | Self::Parse { path, .. } => Some(path),
            Self::Serialize(_) => None,
        }
    }
}
