//! azcli integration for aks-sync
//!
//! This crate spawns the configured azcli binary, parses its JSON output and
//! exposes subscription listing, cluster listing and credential generation.

mod discovery;
mod error;
mod invoker;

pub use discovery::AzureCli;
pub use error::{CliError, Result};
pub use invoker::{AzCli, CliSettings, DEFAULT_AZCLI_BIN, KUBECONFIG_ENV};

// Re-export types that are used in our public API
pub use aks_sync_types::{RawCluster, Subscription};
