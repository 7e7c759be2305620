//! Cluster reconciliation for aks-sync
//!
//! This crate owns the published catalog, provisions kubeconfig files for
//! discovered clusters and drives the periodic sync loop.

mod catalog;
mod controller;
mod error;
mod provision;

#[cfg(test)]
mod testing;

pub use catalog::Catalog;
pub use controller::{DEFAULT_SYNC_INTERVAL, SyncController, SyncHandle};
pub use error::{Result, SyncError};
pub use provision::Provisioner;

// Re-export types used in our public API
pub use aks_sync_types::{CatalogEntry, ClusterPhase, SyncState};
