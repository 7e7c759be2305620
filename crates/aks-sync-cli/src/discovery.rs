//! Subscription and cluster discovery through azcli

use std::path::Path;

use async_trait::async_trait;

use aks_sync_types::{RawCluster, Subscription};

use crate::error::Result;
use crate::invoker::{AzCli, KUBECONFIG_ENV};

/// Operations the sync loop needs from azcli
#[async_trait]
pub trait AzureCli: Send + Sync {
    /// List every subscription visible to the logged in account
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>>;

    /// List clusters in one subscription, empty when there are none
    async fn list_clusters(&self, subscription_id: &str) -> Result<Vec<RawCluster>>;

    /// Write credentials for `cluster` into the kubeconfig at `kubeconfig_path`
    async fn get_credentials(
        &self,
        subscription_id: &str,
        cluster: &RawCluster,
        kubeconfig_path: &Path,
    ) -> Result<()>;
}

#[async_trait]
impl AzureCli for AzCli {
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        self.invoke(&["subscriptions", "list"], &[]).await
    }

    async fn list_clusters(&self, subscription_id: &str) -> Result<Vec<RawCluster>> {
        self.invoke(
            &["container", "clusters", "list", "--subscription", subscription_id],
            &[],
        )
        .await
    }

    async fn get_credentials(
        &self,
        subscription_id: &str,
        cluster: &RawCluster,
        kubeconfig_path: &Path,
    ) -> Result<()> {
        // Output is uniform JSON like every other command; nothing in it is used
        let _: Vec<serde_json::Value> = self
            .invoke(
                &[
                    "aks",
                    "get-credentials",
                    cluster.name.as_str(),
                    "--zone",
                    cluster.zone.as_str(),
                    "--subscription",
                    subscription_id,
                ],
                &[(KUBECONFIG_ENV, kubeconfig_path.as_os_str())],
            )
            .await?;
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

    /// Fake azcli that answers each command the way the real tool would
    fn fake_azcli(dir: &Path) -> PathBuf {
        let path = dir.join("azcli");
        let script = r#"#!/bin/sh
case "$1 $2" in
  "subscriptions list")
    echo '[{"name":"Sub1","subscriptionId":"s1"},{"name":"Sub2","subscriptionId":"s2"}]'
    ;;
  "container clusters")
    if [ "$5" = "s1" ]; then
      echo '[{"name":"c1","zone":"eastus","endpoint":"c1.example","selfLink":"L1","masterAuth":{"clusterCaCertificate":"Q0E="}}]'
    else
      echo '[]'
    fi
    ;;
  "aks get-credentials")
    printf 'current-context: %s-ctx\n' "$3" > "$KUBECONFIG"
    echo '[]'
    ;;
  *)
    echo "unknown command: $*" >&2
    exit 2
    ;;
esac
"#;
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_list_subscriptions() {
        let dir = tempfile::tempdir().unwrap();
        let cli = AzCli::with_binary(fake_azcli(dir.path()).to_string_lossy().to_string());

        let subs = cli.list_subscriptions().await.unwrap();
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].subscription_id, "s1");
    }

    #[tokio::test]
    async fn test_list_clusters_scoped_to_subscription() {
        let dir = tempfile::tempdir().unwrap();
        let cli = AzCli::with_binary(fake_azcli(dir.path()).to_string_lossy().to_string());

        let clusters = cli.list_clusters("s1").await.unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].self_link, "L1");

        assert!(cli.list_clusters("s2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_credentials_writes_target_file() {
        let dir = tempfile::tempdir().unwrap();
        let cli = AzCli::with_binary(fake_azcli(dir.path()).to_string_lossy().to_string());
        let cluster = cli.list_clusters("s1").await.unwrap().remove(0);
        let target = dir.path().join(&cluster.endpoint);

        cli.get_credentials("s1", &cluster, &target).await.unwrap();

        let written = std::fs::read_to_string(&target).unwrap();
        assert_eq!(written, "current-context: c1-ctx\n");
    }
}
