//! Flush the catalog to communal storage (Eon)

use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::Result;
use crate::op::{ClusterOp, OpBase, fan_out, first_passing};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct SyncCatalogResponse {
    #[serde(default)]
    new_truncation_catalog_version: String,
}

/// `POST /cluster/catalog/sync` against candidate initiators; the first
/// passing response wins, remaining failures are aggregated.
pub struct SyncCatalogOp {
    base: OpBase,
}

impl SyncCatalogOp {
    pub fn new(initiators: Vec<String>) -> Self {
        SyncCatalogOp {
            base: OpBase::with_hosts("sync_catalog", initiators),
        }
    }
}

#[async_trait]
impl ClusterOp for SyncCatalogOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        "sync the catalog to communal storage".to_string()
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        self.base
            .register_for_all(|_| HostRequest::https_post("cluster/catalog/sync", json!({})));
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;
        let passing = first_passing("sync_catalog", &results)?;
        let response: SyncCatalogResponse = passing.json()?;
        debug!(
            "sync_catalog: new truncation catalog version {:?}",
            response.new_truncation_catalog_version
        );
        Ok(())
    }
}
