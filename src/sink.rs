//! Writes every published catalog to a JSON file

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use aks_sync_engine::Catalog;

/// Mirrors the catalog into a file other tools can read
pub struct CatalogFileSink {
    catalog: Catalog,
    path: PathBuf,
}

impl CatalogFileSink {
    pub fn new(catalog: Catalog, path: PathBuf) -> Self {
        Self { catalog, path }
    }

    /// Write the current catalog.
    ///
    /// Goes through a temp file and a rename so readers never see a partial
    /// document.
    pub async fn write(&self) -> Result<()> {
        let entries = self.catalog.entries();
        let json =
            serde_json::to_string_pretty(&entries).context("Failed to serialize catalog")?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let tmp = tmp_path(&self.path);
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        info!(
            clusters = entries.len(),
            path = %self.path.display(),
            "catalog written"
        );
        Ok(())
    }

    /// Write on every catalog change until cancelled, then once more
    pub async fn run(self, cancel: CancellationToken) {
        let mut changes = self.catalog.subscribe();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    changes.borrow_and_update();
                    if let Err(e) = self.write().await {
                        warn!(error = %format!("{:#}", e), "failed to write catalog");
                    }
                }
            }
        }

        // Final state, normally the cleared catalog after shutdown
        if let Err(e) = self.write().await {
            warn!(error = %format!("{:#}", e), "failed to write catalog");
        }
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
