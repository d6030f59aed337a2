//! Drop a subcluster name from the catalog

use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::Result;
use crate::op::{ClusterOp, OpBase, fan_out, first_passing};
use async_trait::async_trait;
use serde_json::json;

/// `POST /subclusters/{name}/drop` on one initiator per involved db-group.
/// Node removal must already have emptied the subcluster.
pub struct DropSubclusterOp {
    base: OpBase,
    sc_name: String,
}

impl DropSubclusterOp {
    pub fn new(initiators: Vec<String>, sc_name: impl Into<String>) -> Self {
        DropSubclusterOp {
            base: OpBase::with_hosts("drop_subcluster", initiators),
            sc_name: sc_name.into(),
        }
    }
}

#[async_trait]
impl ClusterOp for DropSubclusterOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        format!("drop subcluster {} from the catalog", self.sc_name)
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        let endpoint = format!("subclusters/{}/drop", self.sc_name);
        self.base
            .register_for_all(|_| HostRequest::https_post(endpoint.clone(), json!({})));
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;
        first_passing("drop_subcluster", &results)?;
        Ok(())
    }
}
