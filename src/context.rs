//! Shared execution context for one engine run

use crate::catalog::{EpochReport, NmaVDatabase};
use crate::dispatcher::Dispatcher;
use crate::ops::fetch_vdb::ClusterInfo;
use crate::ops::network_profile::NetworkProfile;
use crate::ops::system_tables::{SlowEvent, SystemTable};
use crate::ops::poll_replication_status::ReplicationStatusSummary;
use crate::ops::tls_digest::TlsConfigDigest;
use crate::vdb::{NodeDetail, RestorePoint, Vdb};
use crate::workload::ReplayReportRow;
use std::collections::BTreeMap;

/// Mutable scratch threaded through an ordered instruction list.
///
/// Created once per engine run and owned by it; operation *i+1* sees every
/// mutation operation *i* made. Not reusable across runs.
#[derive(Debug)]
pub struct ExecContext {
    pub dispatcher: Dispatcher,
    /// Topology snapshot pre-seeded for sandbox-aware operations
    pub vdb_for_sandbox_info: Option<Vdb>,
    /// Target sandbox of this run; empty = main cluster
    pub sandbox: String,
    pub unreachable_hosts: Vec<String>,
    pub up_hosts: Vec<String>,
    pub up_hosts_to_sandboxes: BTreeMap<String, String>,
    /// Subcluster name → its UP hosts
    pub up_sc_info: BTreeMap<String, Vec<String>>,
    pub nodes_info: Vec<NodeDetail>,
    /// Nodes of the target subcluster, for subcluster-scoped commands
    pub sc_nodes_info: Vec<NodeDetail>,
    pub compute_hosts: Vec<String>,
    pub hosts_with_latest_catalog: Vec<String>,
    pub primary_hosts_with_latest_catalog: Vec<String>,
    /// Latest catalog editor read
    pub nma_vdatabase: Option<NmaVDatabase>,
    pub default_sc_name: String,
    /// Description of the subcluster a command targets
    pub target_sc_info: Option<crate::vdb::SubclusterInfo>,
    pub restore_points: Vec<RestorePoint>,
    pub db_info: Option<ClusterInfo>,
    pub system_table_list: Vec<SystemTable>,
    pub slow_events: Vec<SlowEvent>,
    pub ignore_main_cluster: bool,
    pub workload_replay_data: Vec<ReplayReportRow>,
    /// Node name → start command fetched from an UP node
    pub startup_commands: BTreeMap<String, Vec<String>>,
    pub network_profiles: BTreeMap<String, NetworkProfile>,
    /// Replication transaction ids seen before starting a new job
    pub existing_transaction_ids: Vec<u64>,
    /// The transaction id discovered for a freshly started replication
    pub new_transaction_id: Option<u64>,
    pub replication_status: Option<ReplicationStatusSummary>,
    pub tls_config_digest: Option<TlsConfigDigest>,
    pub epoch_reports: Vec<EpochReport>,
    pub last_good_epoch: Option<u64>,
}

impl ExecContext {
    pub fn new(dispatcher: Dispatcher) -> Self {
        ExecContext {
            dispatcher,
            vdb_for_sandbox_info: None,
            sandbox: String::new(),
            unreachable_hosts: Vec::new(),
            up_hosts: Vec::new(),
            up_hosts_to_sandboxes: BTreeMap::new(),
            up_sc_info: BTreeMap::new(),
            nodes_info: Vec::new(),
            sc_nodes_info: Vec::new(),
            compute_hosts: Vec::new(),
            hosts_with_latest_catalog: Vec::new(),
            primary_hosts_with_latest_catalog: Vec::new(),
            nma_vdatabase: None,
            default_sc_name: String::new(),
            target_sc_info: None,
            restore_points: Vec::new(),
            db_info: None,
            system_table_list: Vec::new(),
            slow_events: Vec::new(),
            ignore_main_cluster: false,
            workload_replay_data: Vec::new(),
            startup_commands: BTreeMap::new(),
            network_profiles: BTreeMap::new(),
            existing_transaction_ids: Vec::new(),
            new_transaction_id: None,
            replication_status: None,
            tls_config_digest: None,
            epoch_reports: Vec::new(),
            last_good_epoch: None,
        }
    }

    /// UP hosts of the given db-group, in discovery order.
    pub fn up_hosts_in_sandbox(&self, sandbox: &str) -> Vec<String> {
        self.up_hosts
            .iter()
            .filter(|h| {
                self.up_hosts_to_sandboxes
                    .get(*h)
                    .map(|sb| sb == sandbox)
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// One UP host per db-group, main cluster last (shutdown ordering).
    pub fn one_up_host_per_db_group(&self) -> Vec<(String, String)> {
        let mut groups: Vec<(String, String)> = Vec::new();
        for host in &self.up_hosts {
            let Some(sandbox) = self.up_hosts_to_sandboxes.get(host) else {
                continue;
            };
            if !groups.iter().any(|(sb, _)| sb == sandbox) {
                groups.push((sandbox.clone(), host.clone()));
            }
        }
        groups.sort_by_key(|(sb, _)| sb.is_empty());
        groups
    }
}
