//! Shut down node management agents

use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::Result;
use crate::op::{ClusterOp, OpBase, ResultHandling, ensure_all_passing, fan_out};
use async_trait::async_trait;
use serde_json::json;

/// `POST /shutdown` against the NMA on every host, used before an NMA cert
/// rotation so the agent restarts with fresh material. EOF is the normal
/// answer of a process killing itself.
pub struct ShutdownNmaOp {
    base: OpBase,
}

impl ShutdownNmaOp {
    pub fn new(hosts: Vec<String>) -> Self {
        ShutdownNmaOp {
            base: OpBase::with_hosts("shutdown_nma", hosts),
        }
    }
}

#[async_trait]
impl ClusterOp for ShutdownNmaOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        format!("shut down the NMA on {} host(s)", self.base.hosts.len())
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        self.base
            .register_for_all(|_| HostRequest::nma_post("shutdown", json!({})));
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;
        ensure_all_passing(
            "shutdown_nma",
            &results,
            ResultHandling {
                allow_eof: true,
                ..ResultHandling::default()
            },
        )
    }
}
