//! Error types for a sync cycle

use std::path::PathBuf;

use aks_sync_cli::CliError;

/// Anything that aborts a sync cycle
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// azcli failed or returned something unparseable
    #[error(transparent)]
    Cli(#[from] CliError),

    /// Kubeconfig could not be created, truncated or read
    #[error("kubeconfig file error at {}: {source}", path.display())]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Kubeconfig is malformed or has no usable current-context
    #[error("invalid kubeconfig at {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
}

impl SyncError {
    pub fn file_system(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileSystem {
            path: path.into(),
            source,
        }
    }

    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;
