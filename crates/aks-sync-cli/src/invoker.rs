//! Process invoker for azcli

use std::ffi::OsStr;
use std::process::Stdio;

use serde::de::DeserializeOwned;
use tokio::process::Command;
use tokio::sync::watch;
use tracing::debug;

use crate::error::{CliError, Result};

/// Binary name used when no path is configured
pub const DEFAULT_AZCLI_BIN: &str = "azcli";

/// Environment variable azcli writes credentials to
pub const KUBECONFIG_ENV: &str = "KUBECONFIG";

/// Flag appended to every invocation
const FORMAT_ARGS: [&str; 2] = ["--format", "json"];

/// Settings the invoker reads on every call
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CliSettings {
    /// Configured azcli binary, `None` or blank falls back to `azcli`
    pub azcli_path: Option<String>,
}

impl CliSettings {
    pub fn new(azcli_path: Option<String>) -> Self {
        Self { azcli_path }
    }

    /// The binary that will actually be spawned
    pub fn binary(&self) -> &str {
        self.azcli_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_AZCLI_BIN)
    }
}

/// azcli wrapper
///
/// Holds a receiver on the settings store so a changed binary path is picked
/// up by the next invocation without rebuilding the client.
#[derive(Clone, Debug)]
pub struct AzCli {
    settings: watch::Receiver<CliSettings>,
}

impl AzCli {
    pub fn new(settings: watch::Receiver<CliSettings>) -> Self {
        Self { settings }
    }

    /// Create a client pinned to a single binary
    pub fn with_binary(bin: impl Into<String>) -> Self {
        let (_tx, rx) = watch::channel(CliSettings::new(Some(bin.into())));
        Self::new(rx)
    }

    /// Binary path as currently configured
    pub fn binary(&self) -> String {
        self.settings.borrow().binary().to_string()
    }

    /// Run azcli with `args` and parse stdout as a JSON array of `T`.
    ///
    /// `env` entries are layered over the inherited environment. There is no
    /// timeout and no retry.
    pub async fn invoke<T>(&self, args: &[&str], env: &[(&str, &OsStr)]) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let bin = self.binary();
        let command = render_command(&bin, args);
        debug!(%command, "invoking azcli");

        let output = Command::new(&bin)
            .args(args)
            .args(FORMAT_ARGS)
            .envs(env.iter().copied())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| CliError::Spawn {
                bin: bin.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let code = output.status.code().unwrap_or(-1);
            return Err(CliError::CommandFailed {
                command,
                code,
                stderr,
            });
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|source| CliError::InvalidOutput { command, source })
    }
}

fn render_command(bin: &str, args: &[&str]) -> String {
    let mut parts = Vec::with_capacity(args.len() + 3);
    parts.push(bin);
    parts.extend_from_slice(args);
    parts.extend_from_slice(&FORMAT_ARGS);
    parts.join(" ")
}
