//! Return a sandboxed subcluster to the main cluster

use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::Result;
use crate::op::{ClusterOp, OpBase, fan_out, first_passing};
use async_trait::async_trait;
use serde_json::json;

/// `POST /subclusters/{name}/unsandbox` on one UP initiator of the sandbox's
/// db-group. The composer stops the subcluster's nodes first and wipes their
/// sandbox catalogs afterwards.
pub struct UnsandboxSubclusterOp {
    base: OpBase,
    sc_name: String,
}

impl UnsandboxSubclusterOp {
    pub fn new(initiators: Vec<String>, sc_name: impl Into<String>) -> Self {
        UnsandboxSubclusterOp {
            base: OpBase::with_hosts("unsandbox_subcluster", initiators),
            sc_name: sc_name.into(),
        }
    }
}

#[async_trait]
impl ClusterOp for UnsandboxSubclusterOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        format!("unsandbox subcluster {}", self.sc_name)
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        let endpoint = format!("subclusters/{}/unsandbox", self.sc_name);
        self.base
            .register_for_all(|_| HostRequest::https_post(endpoint.clone(), json!({})));
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;
        first_passing("unsandbox_subcluster", &results)?;
        Ok(())
    }
}
