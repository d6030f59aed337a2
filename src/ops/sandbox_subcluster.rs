//! Carve a subcluster into a sandbox

use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::Result;
use crate::op::{ClusterOp, OpBase, fan_out, first_passing};
use async_trait::async_trait;
use serde_json::json;

/// `POST /subclusters/{name}/sandbox` on one UP initiator of the main
/// cluster. The target subcluster's nodes re-register under the sandbox.
pub struct SandboxSubclusterOp {
    base: OpBase,
    sc_name: String,
    sandbox_name: String,
    save_restore_point: bool,
}

impl SandboxSubclusterOp {
    pub fn new(
        initiators: Vec<String>,
        sc_name: impl Into<String>,
        sandbox_name: impl Into<String>,
    ) -> Self {
        SandboxSubclusterOp {
            base: OpBase::with_hosts("sandbox_subcluster", initiators),
            sc_name: sc_name.into(),
            sandbox_name: sandbox_name.into(),
            save_restore_point: false,
        }
    }

    pub fn saving_restore_point(mut self) -> Self {
        self.save_restore_point = true;
        self
    }
}

#[async_trait]
impl ClusterOp for SandboxSubclusterOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        format!(
            "sandbox subcluster {} as {}",
            self.sc_name, self.sandbox_name
        )
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        let endpoint = format!("subclusters/{}/sandbox", self.sc_name);
        let body = json!({
            "sandbox": self.sandbox_name,
            "save_restore_point": self.save_restore_point,
        });
        self.base
            .register_for_all(|_| HostRequest::https_post(endpoint.clone(), body.clone()));
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;
        first_passing("sandbox_subcluster", &results)?;
        Ok(())
    }
}
