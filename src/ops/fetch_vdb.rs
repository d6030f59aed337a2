//! Fetch the coordination database from a running cluster

use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::{OpError, Result};
use crate::op::{ClusterOp, OpBase, fan_out, first_passing};
use crate::vdb::{NodeListResponse, Vdb};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Cluster-wide information from `GET /cluster`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub database_name: String,
    #[serde(default)]
    pub is_eon: bool,
    #[serde(default)]
    pub communal_storage_location: String,
    #[serde(default)]
    pub depot_prefix: String,
    #[serde(default)]
    pub data_prefix: String,
    #[serde(default)]
    pub catalog_prefix: String,
    #[serde(default)]
    pub ipv6: bool,
    #[serde(flatten)]
    pub extra: Value,
}

/// One entry of `GET /subscriptions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    pub node_name: String,
    pub shard_name: String,
    pub subscription_state: String,
    #[serde(default)]
    pub is_primary: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionListResponse {
    pub subscription_list: Vec<SubscriptionInfo>,
}

/// Build a [`Vdb`] snapshot from `/nodes`, `/cluster` and `/subscriptions`.
/// The first host whose `/nodes` passes becomes the source for the other two
/// endpoints. The snapshot lands in `ctx.vdb_for_sandbox_info`; cluster-wide
/// info lands in `ctx.db_info`.
pub struct FetchVdbOp {
    base: OpBase,
    /// Restrict the node view to one sandbox's members
    sandbox: Option<String>,
}

impl FetchVdbOp {
    pub fn new(hosts: Vec<String>) -> Self {
        FetchVdbOp {
            base: OpBase::with_hosts("fetch_vdb", hosts),
            sandbox: None,
        }
    }

    pub fn scoped_to_sandbox(mut self, sandbox: impl Into<String>) -> Self {
        self.sandbox = Some(sandbox.into());
        self
    }
}

#[async_trait]
impl ClusterOp for FetchVdbOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        match &self.sandbox {
            Some(sb) => format!("fetch the catalog snapshot scoped to sandbox {sb}"),
            None => "fetch the catalog snapshot".to_string(),
        }
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        self.base
            .register_for_all(|_| HostRequest::https_get("nodes"));
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;
        let passing = first_passing("fetch_vdb", &results).map_err(|e| {
            if e.is_unauthorized() {
                e
            } else {
                OpError::DbDown(format!("could not fetch /nodes from any host: {e}"))
            }
        })?;
        let nodes: NodeListResponse = passing.json()?;
        let source_host = passing.host.clone();

        let mut vdb = Vdb::default();
        match &self.sandbox {
            Some(sandbox) => {
                let scoped: Vec<_> = nodes
                    .node_list
                    .iter()
                    .filter(|n| &n.sandbox_name == sandbox)
                    .cloned()
                    .collect();
                vdb.absorb_node_details(&scoped);
            }
            None => vdb.absorb_node_details(&nodes.node_list),
        }

        // cluster-wide info from the same source host
        let mut cluster_req = std::collections::HashMap::new();
        cluster_req.insert(source_host.clone(), HostRequest::https_get("cluster"));
        let cluster_results = ctx.dispatcher.fan_out(cluster_req).await;
        let cluster = first_passing("fetch_vdb", &cluster_results)?;
        let info: ClusterInfo = cluster.json()?;
        vdb.name = info.database_name.clone();
        vdb.is_eon = info.is_eon;
        vdb.communal_storage_location = info.communal_storage_location.clone();
        vdb.depot_prefix = info.depot_prefix.clone();
        vdb.data_prefix = info.data_prefix.clone();
        vdb.catalog_prefix = info.catalog_prefix.clone();
        vdb.ipv6 = info.ipv6;
        vdb.use_depot = info.is_eon && !info.depot_prefix.is_empty();

        // subscriptions distinguish primary nodes in Eon mode
        if info.is_eon {
            let mut sub_req = std::collections::HashMap::new();
            sub_req.insert(source_host.clone(), HostRequest::https_get("subscriptions"));
            let sub_results = ctx.dispatcher.fan_out(sub_req).await;
            if let Ok(sub) = first_passing("fetch_vdb", &sub_results) {
                let subs: SubscriptionListResponse = sub.json()?;
                for entry in &subs.subscription_list {
                    if !entry.is_primary {
                        continue;
                    }
                    for node in vdb.host_node_map.values_mut() {
                        if node.name == entry.node_name {
                            node.is_primary = true;
                        }
                    }
                }
            }
        }

        ctx.db_info = Some(info);
        ctx.vdb_for_sandbox_info = Some(vdb);
        Ok(())
    }
}
