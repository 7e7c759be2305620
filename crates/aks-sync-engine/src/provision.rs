//! Kubeconfig provisioning for discovered clusters

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use kube::config::Kubeconfig;
use tracing::debug;

use aks_sync_cli::AzureCli;
use aks_sync_types::{CatalogEntry, RawCluster, Subscription};

use crate::error::{Result, SyncError};

/// Creates one kubeconfig per cluster under a fixed storage directory
pub struct Provisioner<C> {
    cli: Arc<C>,
    storage_dir: PathBuf,
}

impl<C: AzureCli> Provisioner<C> {
    pub fn new(cli: Arc<C>, storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            cli,
            storage_dir: storage_dir.into(),
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Deterministic kubeconfig location for a cluster.
    ///
    /// The endpoint must be a single plain file name so the file cannot land
    /// outside the storage directory.
    pub fn kubeconfig_path(&self, cluster: &RawCluster) -> Result<PathBuf> {
        let endpoint = Path::new(&cluster.endpoint);
        let mut components = endpoint.components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.storage_dir.join(endpoint)),
            _ => Err(SyncError::file_system(
                self.storage_dir.join(&cluster.endpoint),
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("cluster endpoint '{}' is not a plain file name", cluster.endpoint),
                ),
            )),
        }
    }

    /// Regenerate the kubeconfig for `cluster` and build its catalog entry.
    ///
    /// The file is truncated before azcli writes to it, every time.
    pub async fn provision(
        &self,
        subscription: &Subscription,
        cluster: &RawCluster,
    ) -> Result<CatalogEntry> {
        let path = self.kubeconfig_path(cluster)?;

        tokio::fs::create_dir_all(&self.storage_dir)
            .await
            .map_err(|e| SyncError::file_system(&self.storage_dir, e))?;
        tokio::fs::File::create(&path)
            .await
            .map_err(|e| SyncError::file_system(&path, e))?;

        self.cli
            .get_credentials(&subscription.subscription_id, cluster, &path)
            .await?;

        let context = read_current_context(&path).await?;
        debug!(
            cluster = %cluster.name,
            context = %context,
            path = %path.display(),
            "provisioned kubeconfig"
        );

        Ok(CatalogEntry::new(subscription, cluster, path, context))
    }
}

/// Read the `current-context` of a kubeconfig file
pub(crate) async fn read_current_context(path: &Path) -> Result<String> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| SyncError::file_system(path, e))?;

    let kubeconfig =
        Kubeconfig::from_yaml(&content).map_err(|e| SyncError::parse(path, e.to_string()))?;

    kubeconfig
        .current_context
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| SyncError::parse(path, "missing current-context"))
}
