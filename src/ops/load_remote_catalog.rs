//! Load catalogs from communal storage during revive

use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::Result;
use crate::op::{ClusterOp, OpBase, ResultHandling, ensure_all_passing, fan_out};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;

/// Inputs for loading one node's catalog from communal storage.
#[derive(Debug, Clone, Serialize)]
pub struct LoadRemoteCatalogRequest {
    pub db_name: String,
    pub node_name: String,
    pub catalog_path: String,
    pub communal_storage_location: String,
    /// Address the node had in the original cluster, in sorted-node order
    pub old_address: String,
    /// Restore point to load from, when reviving to one
    pub restore_point_id: Option<String>,
}

/// `POST /catalog/load-remote` on every new host. The old-host pairing is
/// fixed by the revive planner and must be preserved here.
pub struct LoadRemoteCatalogOp {
    base: OpBase,
    requests: HashMap<String, LoadRemoteCatalogRequest>,
}

impl LoadRemoteCatalogOp {
    pub fn new(requests: HashMap<String, LoadRemoteCatalogRequest>) -> Self {
        let hosts = requests.keys().cloned().collect();
        LoadRemoteCatalogOp {
            base: OpBase::with_hosts("load_remote_catalog", hosts),
            requests,
        }
    }
}

#[async_trait]
impl ClusterOp for LoadRemoteCatalogOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        format!(
            "load remote catalogs onto {} host(s)",
            self.base.hosts.len()
        )
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        for (host, request) in &self.requests {
            if !self.base.hosts.contains(host) {
                continue;
            }
            self.base.register(
                host.clone(),
                HostRequest::nma_post("catalog/load-remote", serde_json::to_value(request)?),
            );
        }
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;
        ensure_all_passing("load_remote_catalog", &results, ResultHandling::default())
    }
}
