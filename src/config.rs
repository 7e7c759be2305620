//! Persisted preferences
//!
//! Preferences live in a TOML file. The azcli path is published to the sync
//! loop through a watch channel so editing it invalidates the subscription
//! cache.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

use aks_sync_cli::CliSettings;
use aks_sync_engine::DEFAULT_SYNC_INTERVAL;

const APP_DIR: &str = "aks-sync";

/// User preferences, every field optional
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    /// azcli binary to run
    pub azcli_path: Option<String>,
    /// Directory kubeconfig files are generated in
    pub storage_dir: Option<PathBuf>,
    /// Seconds between sync cycles
    pub sync_interval_secs: Option<u64>,
    /// Where the published catalog is written
    pub catalog_path: Option<PathBuf>,
}

impl Preferences {
    /// Default preferences file location
    pub fn default_path() -> Option<PathBuf> {
        Some(dirs::config_dir()?.join(APP_DIR).join("preferences.toml"))
    }

    /// Load preferences, a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read preferences from {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Invalid preferences file {}", path.display()))
    }

    /// Save preferences, creating the parent directory if needed
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize preferences")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write preferences to {}", path.display()))
    }

    /// Fields set in `overrides` win over the ones in `self`
    pub fn merged(&self, overrides: &Preferences) -> Preferences {
        Preferences {
            azcli_path: overrides.azcli_path.clone().or_else(|| self.azcli_path.clone()),
            storage_dir: overrides.storage_dir.clone().or_else(|| self.storage_dir.clone()),
            sync_interval_secs: overrides.sync_interval_secs.or(self.sync_interval_secs),
            catalog_path: overrides.catalog_path.clone().or_else(|| self.catalog_path.clone()),
        }
    }

    pub fn cli_settings(&self) -> CliSettings {
        CliSettings::new(self.azcli_path.clone())
    }

    pub fn storage_dir(&self) -> PathBuf {
        self.storage_dir
            .clone()
            .unwrap_or_else(|| data_dir().join("kubeconfigs"))
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.catalog_path
            .clone()
            .unwrap_or_else(|| data_dir().join("catalog.json"))
    }

    pub fn sync_interval(&self) -> Duration {
        self.sync_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_SYNC_INTERVAL)
    }
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
}

/// Preferences file plus the settings feed handed to azcli and the sync loop
pub struct PreferencesStore {
    path: PathBuf,
    /// Values from the command line, never persisted
    overrides: Preferences,
    /// Values as read from disk
    stored: Preferences,
    modified: Option<SystemTime>,
    settings: watch::Sender<CliSettings>,
}

impl PreferencesStore {
    pub fn open(path: PathBuf, overrides: Preferences) -> Result<Self> {
        let stored = Preferences::load(&path)?;
        let modified = modified_time(&path);
        let (settings, _) = watch::channel(stored.merged(&overrides).cli_settings());
        Ok(Self {
            path,
            overrides,
            stored,
            modified,
            settings,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Effective preferences
    pub fn preferences(&self) -> Preferences {
        self.stored.merged(&self.overrides)
    }

    /// Receiver that sees every azcli settings change
    pub fn settings(&self) -> watch::Receiver<CliSettings> {
        self.settings.subscribe()
    }

    /// Persist a new azcli path and notify subscribers
    pub fn set_azcli_path(&mut self, azcli_path: Option<String>) -> Result<()> {
        self.stored.azcli_path = azcli_path.filter(|p| !p.trim().is_empty());
        self.stored.save(&self.path)?;
        self.modified = modified_time(&self.path);
        self.publish();
        Ok(())
    }

    /// Re-read the file if it changed on disk.
    ///
    /// Returns true when the azcli settings changed as a result.
    pub fn reload(&mut self) -> Result<bool> {
        let modified = modified_time(&self.path);
        if modified == self.modified {
            return Ok(false);
        }
        debug!(path = %self.path.display(), "preferences file changed, reloading");

        self.stored = Preferences::load(&self.path)?;
        self.modified = modified;
        Ok(self.publish())
    }

    fn publish(&self) -> bool {
        let next = self.preferences().cli_settings();
        let changed = self.settings.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next.clone();
                true
            }
        });
        if changed {
            info!(azcli = %next.binary(), "azcli path updated");
        }
        changed
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}
