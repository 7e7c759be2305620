//! Periodic sync loop
//!
//! One cycle lists subscriptions, lists clusters per cached subscription,
//! provisions a kubeconfig per cluster and publishes the result as a full
//! replacement of the catalog. Any error clears the catalog instead. The next
//! cycle is always scheduled once the current one has finished, so cycles
//! never overlap.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use aks_sync_cli::{AzureCli, CliSettings};
use aks_sync_types::{CatalogEntry, SyncState, Subscription};

use crate::catalog::Catalog;
use crate::error::Result;
use crate::provision::Provisioner;

/// Delay between the end of one cycle and the start of the next
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(3 * 60);

/// Outcome of a successful reconcile, applied atomically
struct CycleResult {
    entries: Vec<CatalogEntry>,
    subscriptions: Vec<Subscription>,
}

/// Owns the subscription cache and drives sync cycles
pub struct SyncController<C> {
    cli: Arc<C>,
    provisioner: Provisioner<C>,
    catalog: Catalog,

    /// Subscriptions that had clusters on their last probe
    subscriptions: Vec<Subscription>,

    /// Settings feed, a new azcli path invalidates the cache
    settings: Option<watch::Receiver<CliSettings>>,

    state: Arc<watch::Sender<SyncState>>,
    interval: Duration,
}

impl<C: AzureCli + 'static> SyncController<C> {
    pub fn new(cli: Arc<C>, storage_dir: impl Into<PathBuf>, catalog: Catalog) -> Self {
        let (state, _) = watch::channel(SyncState::Idle);
        Self {
            provisioner: Provisioner::new(cli.clone(), storage_dir),
            cli,
            catalog,
            subscriptions: Vec::new(),
            settings: None,
            state: Arc::new(state),
            interval: DEFAULT_SYNC_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Clear the subscription cache whenever the azcli settings change
    pub fn watch_settings(mut self, mut settings: watch::Receiver<CliSettings>) -> Self {
        settings.borrow_and_update();
        self.settings = Some(settings);
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Subscriptions the next cycle will probe
    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }

    pub fn state(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Forget every cached subscription, forcing rediscovery
    pub fn invalidate_cache(&mut self) {
        self.subscriptions.clear();
    }

    /// Run one full cycle and publish or clear the catalog.
    ///
    /// Returns the number of published entries.
    pub async fn run_cycle(&mut self) -> Result<usize> {
        info!("syncing clusters");
        match self.reconcile().await {
            Ok(cycle) => {
                self.set_state(SyncState::Publishing);
                self.subscriptions = cycle.subscriptions;
                let count = cycle.entries.len();
                self.catalog.replace(cycle.entries);
                info!(
                    clusters = count,
                    subscriptions = self.subscriptions.len(),
                    "published cluster catalog"
                );
                Ok(count)
            }
            Err(e) => {
                error!(error = %e, "failed to sync clusters");
                self.catalog.clear();
                Err(e)
            }
        }
    }

    async fn reconcile(&mut self) -> Result<CycleResult> {
        if self.settings_changed() {
            info!("azcli path changed, clearing subscription cache");
            self.invalidate_cache();
        }

        self.set_state(SyncState::Discovering);
        let fresh = self.cli.list_subscriptions().await?;

        // Subscriptions gone from the account leave the cache right away
        self.subscriptions = retain_listed(&self.subscriptions, &fresh);
        if self.subscriptions.is_empty() {
            debug!(count = fresh.len(), "populating subscription cache");
            self.subscriptions = fresh;
        }

        // Iterate a snapshot; survivors are swapped in on success
        let cached = self.subscriptions.clone();
        let mut survivors = Vec::with_capacity(cached.len());
        let mut entries = Vec::new();

        for subscription in cached {
            self.set_state(SyncState::Discovering);
            let clusters = self
                .cli
                .list_clusters(&subscription.subscription_id)
                .await?;

            if clusters.is_empty() {
                info!(
                    subscription = %subscription.name,
                    id = %subscription.subscription_id,
                    "no clusters, dropping subscription from cache"
                );
                // Applied now so a later failure in this cycle keeps the removal
                self.subscriptions
                    .retain(|s| s.subscription_id != subscription.subscription_id);
                continue;
            }

            self.set_state(SyncState::Provisioning);
            for cluster in &clusters {
                entries.push(self.provisioner.provision(&subscription, cluster).await?);
            }
            survivors.push(subscription);
        }

        Ok(CycleResult {
            entries,
            subscriptions: survivors,
        })
    }

    fn settings_changed(&mut self) -> bool {
        let Some(settings) = self.settings.as_mut() else {
            return false;
        };
        if settings.has_changed().unwrap_or(false) {
            settings.borrow_and_update();
            true
        } else {
            false
        }
    }

    fn set_state(&self, state: SyncState) {
        self.state.send_replace(state);
    }

    /// Start the loop on the runtime, the first cycle runs immediately
    pub fn spawn(self) -> SyncHandle {
        let cancel = CancellationToken::new();
        let (wake_tx, wake_rx) = mpsc::channel(1);
        let state = self.state();

        let task = tokio::spawn(self.run(cancel.clone(), wake_rx));

        SyncHandle {
            cancel,
            wake: wake_tx,
            state,
            task: Some(task),
        }
    }

    async fn run(mut self, cancel: CancellationToken, mut wake: mpsc::Receiver<()>) {
        loop {
            // Failures are already logged and the catalog cleared
            let _ = self.run_cycle().await;

            self.set_state(SyncState::Sleeping);
            debug!(interval_secs = self.interval.as_secs(), "next sync scheduled");

            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                _ = tokio::time::sleep(self.interval) => {}

                Some(()) = wake.recv() => {
                    debug!("sync requested");
                }
            }
        }

        self.catalog.clear();
        self.set_state(SyncState::Stopped);
        info!("sync loop stopped");
    }
}

/// Cached subscriptions still present in the fresh listing, with the fresh
/// display names
fn retain_listed(cached: &[Subscription], fresh: &[Subscription]) -> Vec<Subscription> {
    cached
        .iter()
        .filter_map(|sub| {
            fresh
                .iter()
                .find(|f| f.subscription_id == sub.subscription_id)
                .cloned()
        })
        .collect()
}

/// Handle to a running sync loop
///
/// Dropping the handle cancels the pending cycle as well.
pub struct SyncHandle {
    /// Cancels the pending sleep
    cancel: CancellationToken,

    /// Cuts the current sleep short
    wake: mpsc::Sender<()>,

    state: watch::Receiver<SyncState>,

    task: Option<tokio::task::JoinHandle<()>>,
}

impl SyncHandle {
    /// Current loop state
    pub fn state(&self) -> watch::Receiver<SyncState> {
        self.state.clone()
    }

    /// Request a cycle now instead of waiting for the timer.
    ///
    /// Requests made while a cycle is running coalesce into one.
    pub fn sync_now(&self) {
        let _ = self.wake.try_send(());
    }

    /// Cancel the pending cycle and wait for the loop to exit.
    ///
    /// A cycle already in flight is allowed to finish. The catalog is empty
    /// once this returns.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "sync loop task failed");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
