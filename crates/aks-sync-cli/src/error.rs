//! Error types for azcli invocations

/// Errors raised while running azcli
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// The binary could not be started at all
    #[error("failed to spawn `{bin}`: {source}")]
    Spawn {
        bin: String,
        #[source]
        source: std::io::Error,
    },

    /// azcli exited with a non-zero status
    #[error("`{command}` failed (exit code {code}): {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    /// stdout was not a JSON array of the expected records
    #[error("`{command}` produced invalid JSON output: {source}")]
    InvalidOutput {
        command: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type alias for azcli operations
pub type Result<T> = std::result::Result<T, CliError>;
