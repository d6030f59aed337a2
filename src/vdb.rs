//! In-memory cluster topology snapshot
//!
//! The coordination database (VDB) is the authoritative picture of nodes,
//! subclusters and sandboxes that operations consult to pick initiators and
//! derive host sets. It is populated either from the running database's
//! `/nodes`, `/cluster` and `/subscriptions` endpoints or from the on-disk
//! catalog editor via the NMA when the database is down.

use crate::error::{OpError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The main cluster is addressed by the empty sandbox name.
pub const MAIN_CLUSTER: &str = "";

/// Database node state as reported over HTTPS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    Up,
    Down,
    Unknown,
    Compute,
}

impl FromStr for NodeState {
    type Err = OpError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "UP" => Ok(NodeState::Up),
            "DOWN" => Ok(NodeState::Down),
            "COMPUTE" => Ok(NodeState::Compute),
            _ => Ok(NodeState::Unknown),
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeState::Up => "UP",
            NodeState::Down => "DOWN",
            NodeState::Unknown => "UNKNOWN",
            NodeState::Compute => "COMPUTE",
        };
        f.write_str(s)
    }
}

/// One logical database process bound to a host.
#[derive(Debug, Clone, PartialEq)]
pub struct VNode {
    /// `v_<db>_nodeNNNN`
    pub name: String,
    pub address: String,
    pub state: NodeState,
    pub catalog_path: String,
    pub depot_path: String,
    pub storage_locations: Vec<String>,
    pub user_storage_locations: Vec<String>,
    pub is_primary: bool,
    pub subcluster: String,
    /// Empty string means the main cluster
    pub sandbox: String,
    pub version: String,
    pub control_node: String,
    pub is_control_node: bool,
}

impl Default for VNode {
    fn default() -> Self {
        VNode {
            name: String::new(),
            address: String::new(),
            state: NodeState::Unknown,
            catalog_path: String::new(),
            depot_path: String::new(),
            storage_locations: Vec::new(),
            user_storage_locations: Vec::new(),
            is_primary: false,
            subcluster: String::new(),
            sandbox: String::new(),
            version: String::new(),
            control_node: String::new(),
            is_control_node: false,
        }
    }
}

/// Subcluster description from `GET /subclusters/{name}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubclusterInfo {
    pub subcluster_name: String,
    pub is_secondary: bool,
    pub is_default: bool,
    /// Shutting down a critical subcluster brings the sandbox/db down
    pub is_critical: bool,
    pub control_set_size: Option<i32>,
    #[serde(default)]
    pub sandbox: String,
    #[serde(flatten)]
    pub extra: Value,
}

/// One entry of the `/nodes` wire response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDetail {
    pub name: String,
    pub address: String,
    pub state: String,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub catalog_path: String,
    #[serde(default)]
    pub depot_path: String,
    #[serde(default)]
    pub data_path: Vec<String>,
    #[serde(default)]
    pub subcluster_name: String,
    #[serde(default)]
    pub sandbox_name: String,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default)]
    pub build_info: String,
    #[serde(default)]
    pub is_control_node: bool,
    #[serde(default)]
    pub control_node: String,
    #[serde(flatten)]
    pub extra: Value,
}

/// Wire shape of `GET /nodes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeListResponse {
    pub node_list: Vec<NodeDetail>,
}

/// A recoverable state in an archive under communal storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestorePoint {
    pub archive: String,
    /// 1-based position within the archive
    pub index: usize,
    pub id: String,
    #[serde(default)]
    pub timestamp: String,
}

/// Snapshot of the coordination database.
///
/// Cloning a `Vdb` yields a deep copy (value semantics on nodes); composers
/// clone before speculative mutation and restore the copy on rollback paths.
#[derive(Debug, Clone, Default)]
pub struct Vdb {
    pub name: String,
    pub is_eon: bool,
    pub communal_storage_location: String,
    pub depot_prefix: String,
    pub data_prefix: String,
    pub catalog_prefix: String,
    pub ipv6: bool,
    pub use_depot: bool,
    /// Hosts in deterministic (user-supplied or discovery) order
    pub host_list: Vec<String>,
    pub host_node_map: BTreeMap<String, VNode>,
    /// Nodes known to the catalog but bound to no address
    pub unbound_nodes: Vec<VNode>,
    pub all_sandboxes: Vec<String>,
}

impl Vdb {
    /// Absorb `/nodes` entries, replacing any prior mapping for those hosts.
    /// Host order follows the wire response.
    pub fn absorb_node_details(&mut self, details: &[NodeDetail]) {
        for detail in details {
            let state = detail.state.parse().unwrap_or(NodeState::Unknown);
            let node = VNode {
                name: detail.name.clone(),
                address: detail.address.clone(),
                state,
                catalog_path: detail.catalog_path.clone(),
                depot_path: detail.depot_path.clone(),
                storage_locations: detail.data_path.clone(),
                user_storage_locations: Vec::new(),
                is_primary: detail.is_primary,
                subcluster: detail.subcluster_name.clone(),
                sandbox: detail.sandbox_name.clone(),
                version: detail.build_info.clone(),
                control_node: detail.control_node.clone(),
                is_control_node: detail.is_control_node,
            };
            if detail.address.is_empty() {
                self.unbound_nodes.push(node);
                continue;
            }
            if !self.host_list.contains(&detail.address) {
                self.host_list.push(detail.address.clone());
            }
            if !detail.sandbox_name.is_empty()
                && !self.all_sandboxes.contains(&detail.sandbox_name)
            {
                self.all_sandboxes.push(detail.sandbox_name.clone());
            }
            self.host_node_map.insert(detail.address.clone(), node);
        }
    }

    /// Overlay sandbox-accurate node state from a sandbox-scoped fetch.
    /// Nodes the sandbox reports replace the main-cluster view, which may
    /// carry stale addresses when sandbox nodes changed IPs.
    pub fn overlay_sandbox_details(&mut self, sandbox: &str, details: &[NodeDetail]) {
        let stale: Vec<String> = self
            .host_node_map
            .iter()
            .filter(|(_, n)| n.sandbox == sandbox)
            .map(|(h, _)| h.clone())
            .collect();
        for host in stale {
            self.host_node_map.remove(&host);
            self.host_list.retain(|h| h != &host);
        }
        self.absorb_node_details(details);
    }

    /// Overlay another snapshot's view of one sandbox, as produced by a
    /// sandbox-scoped fetch.
    pub fn overlay_sandbox_vdb(&mut self, sandbox: &str, sandbox_vdb: &Vdb) {
        let stale: Vec<String> = self
            .host_node_map
            .iter()
            .filter(|(_, n)| n.sandbox == sandbox)
            .map(|(h, _)| h.clone())
            .collect();
        for host in stale {
            self.host_node_map.remove(&host);
            self.host_list.retain(|h| h != &host);
        }
        for host in &sandbox_vdb.host_list {
            let Some(node) = sandbox_vdb.host_node_map.get(host) else {
                continue;
            };
            if !self.host_list.contains(host) {
                self.host_list.push(host.clone());
            }
            self.host_node_map.insert(host.clone(), node.clone());
        }
        if !sandbox.is_empty() && !self.all_sandboxes.contains(&sandbox.to_string()) {
            self.all_sandboxes.push(sandbox.to_string());
        }
    }

    pub fn node_for_host(&self, host: &str) -> Option<&VNode> {
        self.host_node_map.get(host)
    }

    /// Hosts whose node is UP and belongs to the given sandbox, restricted to
    /// the supplied host list and preserving its order.
    pub fn filter_up_host_list_by_sandbox(&self, hosts: &[String], sandbox: &str) -> Vec<String> {
        hosts
            .iter()
            .filter(|h| {
                self.host_node_map
                    .get(*h)
                    .map(|n| n.state == NodeState::Up && n.sandbox == sandbox)
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// All nodes that belong to the given sandbox.
    pub fn filter_sandbox_nodes(&self, sandbox: &str) -> Vec<&VNode> {
        self.host_list
            .iter()
            .filter_map(|h| self.host_node_map.get(h))
            .filter(|n| n.sandbox == sandbox)
            .collect()
    }

    /// Hosts belonging to a subcluster, derived from the host→node mapping.
    /// This is the source of truth regardless of user-provided host lists.
    pub fn hosts_of_subcluster(&self, sc_name: &str) -> Vec<String> {
        self.host_list
            .iter()
            .filter(|h| {
                self.host_node_map
                    .get(*h)
                    .map(|n| n.subcluster == sc_name)
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// Addresses of UP primary nodes, in host-list order.
    pub fn primary_up_nodes(&self) -> Vec<String> {
        self.host_list
            .iter()
            .filter(|h| {
                self.host_node_map
                    .get(*h)
                    .map(|n| n.is_primary && n.state == NodeState::Up)
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// Whether the subcluster holds at least one primary node (Eon).
    pub fn is_primary_subcluster(&self, sc_name: &str) -> bool {
        self.host_node_map
            .values()
            .any(|n| n.subcluster == sc_name && n.is_primary)
    }

    /// Whether any other subcluster still holds primary nodes.
    pub fn has_primary_outside(&self, sc_name: &str) -> bool {
        self.host_node_map
            .values()
            .any(|n| n.subcluster != sc_name && n.is_primary)
    }

    /// First UP host in the sandbox, skipping the given hosts. Deterministic:
    /// host-list order is the tiebreaker.
    pub fn get_sandbox_initiator(&self, sandbox: &str, skip: &[String]) -> Result<String> {
        self.host_list
            .iter()
            .find(|h| {
                !skip.contains(h)
                    && self
                        .host_node_map
                        .get(*h)
                        .map(|n| n.state == NodeState::Up && n.sandbox == sandbox)
                        .unwrap_or(false)
            })
            .cloned()
            .ok_or_else(|| {
                OpError::DbDown(format!(
                    "no UP host found in {}",
                    describe_sandbox(sandbox)
                ))
            })
    }

    /// An UP host in the given sandbox but outside the named subcluster.
    /// Used for promote/demote style operations where the target subcluster
    /// cannot answer for itself.
    pub fn get_initiator_host_in_cluster(&self, sandbox: &str, sc_name: &str) -> Result<String> {
        self.host_list
            .iter()
            .find(|h| {
                self.host_node_map
                    .get(*h)
                    .map(|n| {
                        n.state == NodeState::Up && n.sandbox == sandbox && n.subcluster != sc_name
                    })
                    .unwrap_or(false)
            })
            .cloned()
            .ok_or_else(|| {
                OpError::DbDown(format!(
                    "no UP host outside subcluster {} in {}",
                    sc_name,
                    describe_sandbox(sandbox)
                ))
            })
    }

    /// First user-supplied host that is UP in the target sandbox. A host the
    /// catalog does not know at all is passed through unchanged: in a
    /// containerized environment it is the operator's service hostname.
    pub fn get_initiator_host_for_replication(
        &self,
        sandbox: &str,
        hosts: &[String],
    ) -> Result<String> {
        for host in hosts {
            match self.host_node_map.get(host) {
                Some(node) if node.state == NodeState::Up && node.sandbox == sandbox => {
                    return Ok(host.clone());
                }
                Some(_) => continue,
                None => return Ok(host.clone()),
            }
        }
        Err(OpError::DbDown(format!(
            "none of the provided hosts is UP in {}",
            describe_sandbox(sandbox)
        )))
    }
}

/// First of the user-supplied host list. User order is the tiebreaker and
/// tests rely on it staying deterministic.
pub fn get_initiator(hosts: &[String]) -> Result<String> {
    hosts
        .first()
        .cloned()
        .ok_or_else(|| OpError::Validation("host list is empty".into()))
}

/// First primary UP host not in `skip`.
pub fn get_initiator_host(primary_up: &[String], skip: &[String]) -> Result<String> {
    primary_up
        .iter()
        .find(|h| !skip.contains(h))
        .cloned()
        .ok_or_else(|| OpError::DbDown("no primary UP host available".into()))
}

/// First user host known UP in the target db-group.
pub fn get_initiator_in_cluster(
    target_sandbox: &str,
    hosts: &[String],
    up_hosts_to_sandboxes: &BTreeMap<String, String>,
) -> Result<String> {
    hosts
        .iter()
        .find(|h| {
            up_hosts_to_sandboxes
                .get(*h)
                .map(|sb| sb == target_sandbox)
                .unwrap_or(false)
        })
        .cloned()
        .ok_or_else(|| {
            OpError::DbDown(format!(
                "none of the provided hosts is UP in {}",
                describe_sandbox(target_sandbox)
            ))
        })
}

/// Standard node name for the Nth node of a database (1-based).
pub fn node_name_for(db_name: &str, index: usize) -> String {
    format!("v_{}_node{:04}", db_name.to_lowercase(), index)
}

pub fn describe_sandbox(sandbox: &str) -> String {
    if sandbox.is_empty() {
        "the main cluster".to_string()
    } else {
        format!("sandbox {sandbox}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, addr: &str, state: NodeState, primary: bool, sc: &str, sb: &str) -> VNode {
        VNode {
            name: name.into(),
            address: addr.into(),
            state,
            is_primary: primary,
            subcluster: sc.into(),
            sandbox: sb.into(),
            ..VNode::default()
        }
    }

    fn sample_vdb() -> Vdb {
        let mut vdb = Vdb {
            name: "testdb".into(),
            is_eon: true,
            ..Vdb::default()
        };
        for n in [
            node("v_testdb_node0001", "10.0.0.1", NodeState::Up, true, "sc1", ""),
            node("v_testdb_node0002", "10.0.0.2", NodeState::Down, true, "sc1", ""),
            node("v_testdb_node0003", "10.0.0.3", NodeState::Up, false, "sc2", "sand1"),
            node("v_testdb_node0004", "10.0.0.4", NodeState::Up, false, "sc3", "sand1"),
        ] {
            vdb.host_list.push(n.address.clone());
            vdb.host_node_map.insert(n.address.clone(), n);
        }
        vdb.all_sandboxes.push("sand1".into());
        vdb
    }

    #[test]
    fn filter_up_by_sandbox_checks_state_and_membership() {
        let vdb = sample_vdb();
        let hosts = vdb.host_list.clone();
        assert_eq!(
            vdb.filter_up_host_list_by_sandbox(&hosts, MAIN_CLUSTER),
            vec!["10.0.0.1".to_string()]
        );
        assert_eq!(
            vdb.filter_up_host_list_by_sandbox(&hosts, "sand1"),
            vec!["10.0.0.3".to_string(), "10.0.0.4".to_string()]
        );
        // restriction to the supplied list is honored
        assert!(
            vdb.filter_up_host_list_by_sandbox(&["10.0.0.2".to_string()], MAIN_CLUSTER)
                .is_empty()
        );
    }

    #[test]
    fn subcluster_hosts_derive_from_node_map() {
        let vdb = sample_vdb();
        assert_eq!(
            vdb.hosts_of_subcluster("sc1"),
            vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()]
        );
        assert!(vdb.hosts_of_subcluster("nope").is_empty());
    }

    #[test]
    fn sandbox_initiator_skips_and_is_deterministic() {
        let vdb = sample_vdb();
        assert_eq!(vdb.get_sandbox_initiator("sand1", &[]).unwrap(), "10.0.0.3");
        assert_eq!(
            vdb.get_sandbox_initiator("sand1", &["10.0.0.3".to_string()])
                .unwrap(),
            "10.0.0.4"
        );
        assert!(
            vdb.get_sandbox_initiator("sand1", &["10.0.0.3".into(), "10.0.0.4".into()])
                .is_err()
        );
    }

    #[test]
    fn initiator_in_cluster_excludes_target_subcluster() {
        let vdb = sample_vdb();
        assert_eq!(
            vdb.get_initiator_host_in_cluster("sand1", "sc2").unwrap(),
            "10.0.0.4"
        );
        assert!(vdb.get_initiator_host_in_cluster(MAIN_CLUSTER, "sc1").is_err());
    }

    #[test]
    fn replication_initiator_passes_unknown_host_through() {
        let vdb = sample_vdb();
        // known UP host in the sandbox wins
        assert_eq!(
            vdb.get_initiator_host_for_replication(
                "sand1",
                &["10.0.0.2".to_string(), "10.0.0.3".to_string()]
            )
            .unwrap(),
            "10.0.0.3"
        );
        // operator service hostname is unknown to the catalog
        assert_eq!(
            vdb.get_initiator_host_for_replication("sand1", &["vdb-sandbox-svc".to_string()])
                .unwrap(),
            "vdb-sandbox-svc"
        );
    }

    #[test]
    fn primary_helpers() {
        let vdb = sample_vdb();
        assert_eq!(vdb.primary_up_nodes(), vec!["10.0.0.1".to_string()]);
        assert!(vdb.is_primary_subcluster("sc1"));
        assert!(!vdb.is_primary_subcluster("sc2"));
        assert!(!vdb.has_primary_outside("sc1"));
    }

    #[test]
    fn free_initiator_helpers_are_deterministic() {
        let hosts = vec!["b".to_string(), "a".to_string()];
        assert_eq!(get_initiator(&hosts).unwrap(), "b");
        assert_eq!(
            get_initiator_host(&hosts, &["b".to_string()]).unwrap(),
            "a"
        );
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), "sand1".to_string());
        assert_eq!(get_initiator_in_cluster("sand1", &hosts, &map).unwrap(), "a");
        assert!(get_initiator_in_cluster("sand2", &hosts, &map).is_err());
    }

    #[test]
    fn absorb_and_overlay_node_details() {
        let mut vdb = Vdb::default();
        let details: NodeListResponse = serde_json::from_value(serde_json::json!({
            "node_list": [
                {"name": "v_db_node0001", "address": "10.0.0.1", "state": "UP",
                 "subcluster_name": "sc1", "is_primary": true},
                {"name": "v_db_node0002", "address": "10.0.0.2", "state": "UP",
                 "subcluster_name": "sc2", "sandbox_name": "sand1"}
            ]
        }))
        .unwrap();
        vdb.absorb_node_details(&details.node_list);
        assert_eq!(vdb.host_list, vec!["10.0.0.1", "10.0.0.2"]);
        assert_eq!(vdb.all_sandboxes, vec!["sand1"]);

        // sandbox node moved to a new address; overlay replaces the stale entry
        let sandbox_view = vec![NodeDetail {
            name: "v_db_node0002".into(),
            address: "10.0.0.9".into(),
            state: "UP".into(),
            database: String::new(),
            catalog_path: String::new(),
            depot_path: String::new(),
            data_path: Vec::new(),
            subcluster_name: "sc2".into(),
            sandbox_name: "sand1".into(),
            is_primary: false,
            build_info: String::new(),
            is_control_node: false,
            control_node: String::new(),
            extra: Value::Null,
        }];
        vdb.overlay_sandbox_details("sand1", &sandbox_view);
        assert!(vdb.host_node_map.contains_key("10.0.0.9"));
        assert!(!vdb.host_node_map.contains_key("10.0.0.2"));
    }

    #[test]
    fn node_names_are_zero_padded() {
        assert_eq!(node_name_for("TestDB", 7), "v_testdb_node0007");
        assert_eq!(node_name_for("db", 123), "v_db_node0123");
    }
}
