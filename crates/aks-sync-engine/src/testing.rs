//! Scripted azcli stand-in for engine tests

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use aks_sync_cli::{AzureCli, CliError};
use aks_sync_types::{CatalogEntry, MasterAuth, RawCluster, Subscription};

pub fn cluster(name: &str) -> RawCluster {
    RawCluster {
        name: name.to_string(),
        zone: "eastus".to_string(),
        endpoint: format!("{}.example", name),
        self_link: format!("/subscriptions/s1/clusters/{}", name),
        master_auth: MasterAuth {
            cluster_ca_certificate: "Q0E=".to_string(),
        },
    }
}

pub fn entry(name: &str) -> CatalogEntry {
    CatalogEntry::new(
        &Subscription::new("Sub1", "s1"),
        &cluster(name),
        PathBuf::from(format!("/tmp/{}.example", name)),
        format!("{}-ctx", name),
    )
}

fn failed(command: &str) -> CliError {
    CliError::CommandFailed {
        command: command.to_string(),
        code: 1,
        stderr: "scripted failure".to_string(),
    }
}

#[derive(Default)]
struct Script {
    subscriptions: Vec<Subscription>,
    clusters: HashMap<String, Vec<RawCluster>>,
    fail_subscriptions: bool,
    fail_clusters: HashSet<String>,
    fail_credentials: HashSet<String>,
    /// Kubeconfig body override per cluster name
    kubeconfigs: HashMap<String, String>,
}

/// Fake azcli answering from an editable script
#[derive(Default)]
pub struct FakeCli {
    script: Mutex<Script>,
    subscription_calls: Mutex<usize>,
    cluster_calls: Mutex<Vec<String>>,
    credential_calls: Mutex<Vec<PathBuf>>,
    on_list_subscriptions: Mutex<Option<mpsc::UnboundedSender<tokio::time::Instant>>>,
}

impl FakeCli {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscription(self, subscription: Subscription, clusters: Vec<RawCluster>) -> Self {
        self.add_subscription(subscription, clusters);
        self
    }

    pub fn add_subscription(&self, subscription: Subscription, clusters: Vec<RawCluster>) {
        let mut script = self.script.lock();
        script
            .clusters
            .insert(subscription.subscription_id.clone(), clusters);
        script.subscriptions.push(subscription);
    }

    /// Stop reporting a subscription in the listing
    pub fn remove_subscription(&self, subscription_id: &str) {
        self.script
            .lock()
            .subscriptions
            .retain(|s| s.subscription_id != subscription_id);
    }

    pub fn set_clusters(&self, subscription_id: &str, clusters: Vec<RawCluster>) {
        self.script
            .lock()
            .clusters
            .insert(subscription_id.to_string(), clusters);
    }

    pub fn fail_subscriptions(&self, fail: bool) {
        self.script.lock().fail_subscriptions = fail;
    }

    pub fn fail_clusters_for(&self, subscription_id: &str) {
        self.script
            .lock()
            .fail_clusters
            .insert(subscription_id.to_string());
    }

    pub fn fail_credentials_for(&self, cluster_name: &str) {
        self.script
            .lock()
            .fail_credentials
            .insert(cluster_name.to_string());
    }

    pub fn kubeconfig_for(&self, cluster_name: &str, body: &str) {
        self.script
            .lock()
            .kubeconfigs
            .insert(cluster_name.to_string(), body.to_string());
    }

    /// Report the time of every subscription listing
    pub fn watch_subscription_calls(&self) -> mpsc::UnboundedReceiver<tokio::time::Instant> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.on_list_subscriptions.lock() = Some(tx);
        rx
    }

    pub fn subscription_calls(&self) -> usize {
        *self.subscription_calls.lock()
    }

    pub fn cluster_calls(&self) -> Vec<String> {
        self.cluster_calls.lock().clone()
    }

    pub fn credential_calls(&self) -> Vec<PathBuf> {
        self.credential_calls.lock().clone()
    }
}

#[async_trait]
impl AzureCli for FakeCli {
    async fn list_subscriptions(&self) -> aks_sync_cli::Result<Vec<Subscription>> {
        *self.subscription_calls.lock() += 1;
        if let Some(tx) = self.on_list_subscriptions.lock().as_ref() {
            let _ = tx.send(tokio::time::Instant::now());
        }

        let script = self.script.lock();
        if script.fail_subscriptions {
            return Err(failed("azcli subscriptions list"));
        }
        Ok(script.subscriptions.clone())
    }

    async fn list_clusters(&self, subscription_id: &str) -> aks_sync_cli::Result<Vec<RawCluster>> {
        self.cluster_calls.lock().push(subscription_id.to_string());

        let script = self.script.lock();
        if script.fail_clusters.contains(subscription_id) {
            return Err(failed("azcli container clusters list"));
        }
        Ok(script
            .clusters
            .get(subscription_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_credentials(
        &self,
        _subscription_id: &str,
        cluster: &RawCluster,
        kubeconfig_path: &Path,
    ) -> aks_sync_cli::Result<()> {
        self.credential_calls.lock().push(kubeconfig_path.to_path_buf());

        let body = {
            let script = self.script.lock();
            if script.fail_credentials.contains(&cluster.name) {
                return Err(failed("azcli aks get-credentials"));
            }
            script
                .kubeconfigs
                .get(&cluster.name)
                .cloned()
                .unwrap_or_else(|| kubeconfig_yaml(&cluster.name))
        };

        // Append like the real tool merging into an existing kubeconfig
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(kubeconfig_path)
            .map_err(|e| CliError::Spawn {
                bin: "fake".to_string(),
                source: e,
            })?;
        file.write_all(body.as_bytes()).map_err(|e| CliError::Spawn {
            bin: "fake".to_string(),
            source: e,
        })?;
        Ok(())
    }
}

pub fn kubeconfig_yaml(name: &str) -> String {
    format!(
        r#"apiVersion: v1
kind: Config
clusters:
- name: {name}
  cluster:
    server: https://{name}.example:443
contexts:
- name: {name}-ctx
  context:
    cluster: {name}
    user: clusterUser_{name}
current-context: {name}-ctx
users:
- name: clusterUser_{name}
  user:
    token: redacted
"#
    )
}
