//! Mark the database design k-safe

use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::Result;
use crate::op::{ClusterOp, OpBase, fan_out, first_passing};
use async_trait::async_trait;
use serde_json::json;

/// `PUT /cluster/k-safety` on one initiator. Composers only schedule this
/// when the host count clears the k-safety threshold.
pub struct MarkDesignKsafeOp {
    base: OpBase,
    k_value: u32,
}

impl MarkDesignKsafeOp {
    pub fn new(initiators: Vec<String>, k_value: u32) -> Self {
        MarkDesignKsafeOp {
            base: OpBase::with_hosts("mark_design_ksafe", initiators),
            k_value,
        }
    }
}

#[async_trait]
impl ClusterOp for MarkDesignKsafeOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        format!("mark the database design k-safe at {}", self.k_value)
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        let body = json!({ "k": self.k_value });
        self.base
            .register_for_all(|_| HostRequest::https_put("cluster/k-safety", body.clone()));
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;
        first_passing("mark_design_ksafe", &results)?;
        Ok(())
    }
}
