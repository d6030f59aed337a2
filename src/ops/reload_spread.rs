//! Reload the spread configuration after membership changes

use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::Result;
use crate::op::{ClusterOp, OpBase, fan_out, first_passing};
use async_trait::async_trait;
use serde_json::json;

/// `POST /config/spread/reload` on one initiator per db-group. Globally
/// scoped like cert rotation and subcluster drops.
pub struct ReloadSpreadOp {
    base: OpBase,
}

impl ReloadSpreadOp {
    pub fn new(initiators: Vec<String>) -> Self {
        ReloadSpreadOp {
            base: OpBase::with_hosts("reload_spread", initiators),
        }
    }
}

#[async_trait]
impl ClusterOp for ReloadSpreadOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        "reload the spread configuration".to_string()
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        self.base
            .register_for_all(|_| HostRequest::https_post("config/spread/reload", json!({})));
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;
        first_passing("reload_spread", &results)?;
        Ok(())
    }
}
