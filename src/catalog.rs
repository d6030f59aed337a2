//! Catalog editor snapshots and epoch calculations
//!
//! The catalog editor is the on-disk catalog representation the NMA can read
//! while the database is down. Reading it on a set of hosts yields one
//! [`NmaVDatabase`] per host; the hosts tied for the maximum `global` version
//! are the "hosts with latest catalog" and seed the initiator list for later
//! catalog mutations.

use crate::error::{OpError, Result};
use crate::vdb::{NodeState, VNode, Vdb};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Version counters from the catalog editor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogVersions {
    #[serde(default)]
    pub global: u64,
    #[serde(default)]
    pub local: u64,
    #[serde(default)]
    pub session: u64,
    #[serde(default)]
    pub spread: u64,
    #[serde(default)]
    pub transaction: u64,
    #[serde(default)]
    pub two_phase_id: u64,
}

/// One node entry from `GET /catalog/database`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NmaVNode {
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default)]
    pub catalog_path: String,
    #[serde(default)]
    pub subcluster_name: String,
    #[serde(default)]
    pub sandbox_name: String,
    #[serde(default)]
    pub is_control_node: bool,
    #[serde(default)]
    pub control_node: String,
    #[serde(flatten)]
    pub extra: Value,
}

/// Catalog editor snapshot returned by the NMA.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NmaVDatabase {
    pub name: String,
    #[serde(default)]
    pub versions: CatalogVersions,
    #[serde(default)]
    pub nodes: Vec<NmaVNode>,
    #[serde(default)]
    pub communal_storage_location: Option<String>,
    #[serde(flatten)]
    pub extra: Value,
}

impl NmaVDatabase {
    fn node_for_host(&self, host: &str) -> Option<&NmaVNode> {
        self.nodes.iter().find(|n| n.address == host)
    }
}

/// Hosts tied for the maximum `versions.global`, and the primary subset of
/// that tie. Ties retain all hosts; order follows the input map's key order.
pub fn hosts_with_latest_catalog(
    responses: &BTreeMap<String, NmaVDatabase>,
) -> (Vec<String>, Vec<String>) {
    let max_global = responses
        .values()
        .map(|db| db.versions.global)
        .max()
        .unwrap_or(0);
    let mut all = Vec::new();
    let mut primary = Vec::new();
    for (host, db) in responses {
        if db.versions.global != max_global {
            continue;
        }
        all.push(host.clone());
        if db
            .node_for_host(host)
            .map(|n| n.is_primary)
            .unwrap_or(false)
        {
            primary.push(host.clone());
        }
    }
    (all, primary)
}

/// Build a topology snapshot from one catalog editor read. Node state is
/// unknown until the database answers over HTTPS.
pub fn vdb_from_catalog_editor(nma: &NmaVDatabase) -> Vdb {
    let mut vdb = Vdb {
        name: nma.name.clone(),
        communal_storage_location: nma.communal_storage_location.clone().unwrap_or_default(),
        is_eon: nma.communal_storage_location.is_some(),
        ..Vdb::default()
    };
    for n in &nma.nodes {
        let node = VNode {
            name: n.name.clone(),
            address: n.address.clone(),
            state: NodeState::Unknown,
            catalog_path: n.catalog_path.clone(),
            is_primary: n.is_primary,
            subcluster: n.subcluster_name.clone(),
            sandbox: n.sandbox_name.clone(),
            control_node: n.control_node.clone(),
            is_control_node: n.is_control_node,
            ..VNode::default()
        };
        if n.address.is_empty() {
            vdb.unbound_nodes.push(node);
            continue;
        }
        vdb.host_list.push(n.address.clone());
        if !n.sandbox_name.is_empty() && !vdb.all_sandboxes.contains(&n.sandbox_name) {
            vdb.all_sandboxes.push(n.sandbox_name.clone());
        }
        vdb.host_node_map.insert(n.address.clone(), node);
    }
    vdb
}

/// Given `<prefix>/<db>/<node>_catalog/Catalog`, recover `<prefix>`
/// (`/` when the prefix is empty). Non-matching paths yield `None`.
pub fn extract_catalog_prefix(path: &str, db_name: &str, node_name: &str) -> Option<String> {
    let suffix = format!("/{}/{}_catalog/Catalog", db_name, node_name);
    let trimmed = path.trim_end_matches('/');
    let prefix = trimmed.strip_suffix(&suffix)?;
    if prefix.is_empty() {
        Some("/".to_string())
    } else {
        Some(prefix.to_string())
    }
}

/// One node's answer to the last-good-epoch query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochReport {
    pub node_name: String,
    pub last_good_epoch: u64,
    pub ksafety: i32,
}

/// The epoch acknowledged by a strict majority of nodes.
///
/// All reports must agree on ksafety; a strictly-greater-than-N/2 count is
/// required for the winning epoch.
pub fn calculate_last_good_epoch(reports: &[EpochReport]) -> Result<u64> {
    if reports.is_empty() {
        return Err(OpError::Internal(
            "no epoch reports to calculate the last good epoch from".into(),
        ));
    }
    let ksafety = reports[0].ksafety;
    if reports.iter().any(|r| r.ksafety != ksafety) {
        return Err(OpError::InconsistentKSafety);
    }
    let mut counts: BTreeMap<u64, usize> = BTreeMap::new();
    for report in reports {
        *counts.entry(report.last_good_epoch).or_default() += 1;
    }
    let quorum = reports.len() / 2;
    counts
        .into_iter()
        .rev()
        .find(|(_, count)| *count > quorum)
        .map(|(epoch, _)| epoch)
        .ok_or_else(|| {
            OpError::Internal(format!(
                "failed to find majority of nodes agreeing on a last good epoch across {} reports",
                reports.len()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn editor(host: &str, global: u64, primary: bool) -> NmaVDatabase {
        serde_json::from_value(json!({
            "name": "testdb",
            "versions": {"global": global},
            "nodes": [
                {"name": "v_testdb_node0001", "address": host, "is_primary": primary}
            ]
        }))
        .unwrap()
    }

    fn report(node: &str, epoch: u64, ksafety: i32) -> EpochReport {
        EpochReport {
            node_name: node.into(),
            last_good_epoch: epoch,
            ksafety,
        }
    }

    #[test]
    fn latest_catalog_keeps_ties_and_primary_subset() {
        let mut responses = BTreeMap::new();
        responses.insert("10.0.0.1".to_string(), editor("10.0.0.1", 42, true));
        responses.insert("10.0.0.2".to_string(), editor("10.0.0.2", 42, false));
        responses.insert("10.0.0.3".to_string(), editor("10.0.0.3", 40, true));
        let (all, primary) = hosts_with_latest_catalog(&responses);
        assert_eq!(all, vec!["10.0.0.1", "10.0.0.2"]);
        assert_eq!(primary, vec!["10.0.0.1"]);
    }

    #[test]
    fn catalog_prefix_extraction() {
        assert_eq!(
            extract_catalog_prefix("/data/testdb/v_testdb_node0001_catalog/Catalog", "testdb", "v_testdb_node0001"),
            Some("/data".to_string())
        );
        assert_eq!(
            extract_catalog_prefix("/testdb/v_testdb_node0001_catalog/Catalog", "testdb", "v_testdb_node0001"),
            Some("/".to_string())
        );
        assert_eq!(
            extract_catalog_prefix("/data/otherdb/v_testdb_node0001_catalog/Catalog", "testdb", "v_testdb_node0001"),
            None
        );
    }

    #[test]
    fn lge_majority_three_of_five() {
        let reports = vec![
            report("n1", 100, 1),
            report("n2", 100, 1),
            report("n3", 100, 1),
            report("n4", 99, 1),
            report("n5", 98, 1),
        ];
        assert_eq!(calculate_last_good_epoch(&reports).unwrap(), 100);
    }

    #[test]
    fn lge_requires_strict_majority() {
        let reports = vec![
            report("n1", 100, 1),
            report("n2", 100, 1),
            report("n3", 99, 1),
            report("n4", 99, 1),
        ];
        let err = calculate_last_good_epoch(&reports).unwrap_err();
        assert!(err.to_string().contains("failed to find majority"));
    }

    #[test]
    fn lge_rejects_inconsistent_ksafety() {
        let reports = vec![report("n1", 100, 1), report("n2", 100, 0)];
        let err = calculate_last_good_epoch(&reports).unwrap_err();
        assert!(err.to_string().contains("inconsistent ksafety"));
    }

    #[test]
    fn vdb_from_editor_carries_membership() {
        let nma: NmaVDatabase = serde_json::from_value(json!({
            "name": "testdb",
            "versions": {"global": 7},
            "communal_storage_location": "s3://bucket/db",
            "nodes": [
                {"name": "v_testdb_node0001", "address": "10.0.0.1", "is_primary": true,
                 "subcluster_name": "sc1"},
                {"name": "v_testdb_node0002", "address": "", "subcluster_name": "sc1"}
            ]
        }))
        .unwrap();
        let vdb = vdb_from_catalog_editor(&nma);
        assert!(vdb.is_eon);
        assert_eq!(vdb.host_list, vec!["10.0.0.1"]);
        assert_eq!(vdb.unbound_nodes.len(), 1);
        assert!(vdb.is_primary_subcluster("sc1"));
    }
}
