//! Clone an existing subcluster's layout into a new one

use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::Result;
use crate::op::{ClusterOp, OpBase, fan_out, first_passing};
use async_trait::async_trait;
use serde_json::json;

/// `POST /subclusters/{source}/clone` on one UP initiator; the new
/// subcluster inherits the source's type and control settings.
pub struct CloneSubclusterOp {
    base: OpBase,
    source_sc_name: String,
    target_sc_name: String,
}

impl CloneSubclusterOp {
    pub fn new(
        initiators: Vec<String>,
        source_sc_name: impl Into<String>,
        target_sc_name: impl Into<String>,
    ) -> Self {
        CloneSubclusterOp {
            base: OpBase::with_hosts("clone_subcluster", initiators),
            source_sc_name: source_sc_name.into(),
            target_sc_name: target_sc_name.into(),
        }
    }
}

#[async_trait]
impl ClusterOp for CloneSubclusterOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        format!(
            "clone subcluster {} into {}",
            self.source_sc_name, self.target_sc_name
        )
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        let endpoint = format!("subclusters/{}/clone", self.source_sc_name);
        let body = json!({ "target_sc_name": self.target_sc_name });
        self.base
            .register_for_all(|_| HostRequest::https_post(endpoint.clone(), body.clone()));
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;
        first_passing("clone_subcluster", &results)?;
        Ok(())
    }
}
