//! Shared types for aks-sync
//!
//! This crate contains the records reported by azcli and the catalog entries
//! published for every discovered cluster.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Provenance tag carried by every published entry
pub const CATALOG_SOURCE: &str = "sync";

/// Number of hex characters kept from the selfLink digest
const UID_LEN: usize = 32;

// ============================================================================
// azcli Records
// ============================================================================

/// Subscription as reported by `azcli subscriptions list`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub name: String,
    pub subscription_id: String,
}

impl Subscription {
    pub fn new(name: impl Into<String>, subscription_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subscription_id: subscription_id.into(),
        }
    }
}

/// Control plane auth material reported alongside a cluster
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterAuth {
    #[serde(default)]
    pub cluster_ca_certificate: String,
}

/// Cluster as reported by `azcli container clusters list`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCluster {
    pub name: String,
    pub zone: String,
    pub endpoint: String,
    /// Opaque unique resource path, the source of the cluster identity
    pub self_link: String,
    #[serde(default)]
    pub master_auth: MasterAuth,
}

impl RawCluster {
    /// Stable catalog identity of this cluster
    pub fn uid(&self) -> String {
        cluster_uid(&self.self_link)
    }
}

/// Derive a stable identifier from a cluster's selfLink.
///
/// Used for identity only; the digest carries no security meaning.
pub fn cluster_uid(self_link: &str) -> String {
    let digest = Sha256::digest(self_link.as_bytes());
    let mut hex = format!("{:x}", digest);
    hex.truncate(UID_LEN);
    hex
}

// ============================================================================
// Catalog Types
// ============================================================================

/// Connectivity phase of a catalog entry.
///
/// Sync only ever publishes entries as disconnected. Moving an entry to a
/// connected state is up to whatever consumes the catalog.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterPhase {
    #[default]
    Disconnected,
}

impl fmt::Display for ClusterPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Labels attached to every published cluster
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterLabels {
    pub zone: String,
    pub subscription_name: String,
    pub subscription_id: String,
}

impl ClusterLabels {
    /// Flatten into the key/value map the inventory sink displays
    pub fn to_map(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("zone".to_string(), self.zone.clone()),
            ("subscriptionName".to_string(), self.subscription_name.clone()),
            ("subscriptionId".to_string(), self.subscription_id.clone()),
        ])
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub uid: String,
    pub name: String,
    pub source: String,
    pub labels: ClusterLabels,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntrySpec {
    pub kubeconfig_path: PathBuf,
    pub kubeconfig_context: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryStatus {
    pub phase: ClusterPhase,
}

/// Published inventory item for one discovered cluster
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub metadata: EntryMetadata,
    pub spec: EntrySpec,
    pub status: EntryStatus,
}

impl CatalogEntry {
    /// Build an entry for a freshly provisioned cluster.
    ///
    /// New entries always start out disconnected.
    pub fn new(
        subscription: &Subscription,
        cluster: &RawCluster,
        kubeconfig_path: PathBuf,
        kubeconfig_context: String,
    ) -> Self {
        Self {
            metadata: EntryMetadata {
                uid: cluster.uid(),
                name: cluster.name.clone(),
                source: CATALOG_SOURCE.to_string(),
                labels: ClusterLabels {
                    zone: cluster.zone.clone(),
                    subscription_name: subscription.name.clone(),
                    subscription_id: subscription.subscription_id.clone(),
                },
            },
            spec: EntrySpec {
                kubeconfig_path,
                kubeconfig_context,
            },
            status: EntryStatus {
                phase: ClusterPhase::Disconnected,
            },
        }
    }

    pub fn uid(&self) -> &str {
        &self.metadata.uid
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

// ============================================================================
// Sync Loop State
// ============================================================================

/// Where the reconciliation loop currently is
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncState {
    #[default]
    Idle,
    Discovering,
    Provisioning,
    Publishing,
    Sleeping,
    Stopped,
}

impl SyncState {
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Discovering => "discovering",
            Self::Provisioning => "provisioning",
            Self::Publishing => "publishing",
            Self::Sleeping => "sleeping",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(self_link: &str) -> RawCluster {
        RawCluster {
            name: "c1".to_string(),
            zone: "eastus".to_string(),
            endpoint: "c1.example".to_string(),
            self_link: self_link.to_string(),
            master_auth: MasterAuth::default(),
        }
    }

    #[test]
    fn test_uid_is_stable() {
        assert_eq!(cluster_uid("L1"), cluster_uid("L1"));
        assert_eq!(cluster("L1").uid(), cluster_uid("L1"));
        assert_eq!(cluster_uid("L1").len(), 32);
    }

    #[test]
    fn test_uid_differs_for_distinct_links() {
        let a = cluster_uid("/subscriptions/s1/clusters/a");
        let b = cluster_uid("/subscriptions/s1/clusters/b");
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_azcli_cluster_record() {
        let json = r#"{
            "name": "c1",
            "zone": "eastus",
            "endpoint": "c1.example",
            "selfLink": "L1",
            "masterAuth": { "clusterCaCertificate": "Q0E=" }
        }"#;
        let parsed: RawCluster = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.self_link, "L1");
        assert_eq!(parsed.master_auth.cluster_ca_certificate, "Q0E=");
    }

    #[test]
    fn test_catalog_entry_shape() {
        let sub = Subscription::new("Sub1", "s1");
        let entry = CatalogEntry::new(
            &sub,
            &cluster("L1"),
            PathBuf::from("/tmp/c1.example"),
            "c1-ctx".to_string(),
        );

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["metadata"]["uid"], cluster_uid("L1"));
        assert_eq!(value["metadata"]["source"], "sync");
        assert_eq!(value["metadata"]["labels"]["subscriptionName"], "Sub1");
        assert_eq!(value["spec"]["kubeconfigContext"], "c1-ctx");
        assert_eq!(value["status"]["phase"], "disconnected");
    }

    #[test]
    fn test_labels_map() {
        let labels = ClusterLabels {
            zone: "eastus".to_string(),
            subscription_name: "Sub1".to_string(),
            subscription_id: "s1".to_string(),
        };
        let map = labels.to_map();
        assert_eq!(map.get("zone").map(String::as_str), Some("eastus"));
        assert_eq!(map.len(), 3);
    }
}
