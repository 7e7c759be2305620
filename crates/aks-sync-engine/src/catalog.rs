use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::watch;

use aks_sync_types::CatalogEntry;

#[derive(Default)]
struct Published {
    entries: Vec<CatalogEntry>,
    published_at: Option<DateTime<Utc>>,
}

/// Thread-safe published cluster inventory
///
/// Only ever replaced wholesale. Every replace or clear bumps a generation
/// counter that subscribers are notified of.
#[derive(Clone)]
pub struct Catalog {
    /// Current entries
    inner: Arc<RwLock<Published>>,

    /// Generation notifications
    changes: Arc<watch::Sender<u64>>,
}

impl Catalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(RwLock::new(Published::default())),
            changes: Arc::new(changes),
        }
    }

    /// Replace the whole inventory
    pub fn replace(&self, entries: Vec<CatalogEntry>) {
        {
            let mut inner = self.inner.write();
            inner.entries = entries;
            inner.published_at = Some(Utc::now());
        }
        self.notify();
    }

    /// Drop every entry, the inventory becomes unknown
    pub fn clear(&self) {
        {
            let mut inner = self.inner.write();
            inner.entries.clear();
            inner.published_at = None;
        }
        self.notify();
    }

    /// Get all entries (cloned)
    pub fn entries(&self) -> Vec<CatalogEntry> {
        self.inner.read().entries.clone()
    }

    /// Look up an entry by uid
    pub fn get(&self, uid: &str) -> Option<CatalogEntry> {
        self.inner
            .read()
            .entries
            .iter()
            .find(|e| e.uid() == uid)
            .cloned()
    }

    /// When the current entries were published, `None` after a clear
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        self.inner.read().published_at
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    /// Number of changes published so far
    pub fn generation(&self) -> u64 {
        *self.changes.borrow()
    }

    /// Receive a notification on every replace or clear
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    fn notify(&self) {
        self.changes.send_modify(|generation| *generation += 1);
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}
