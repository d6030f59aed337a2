//! Create depot storage locations (Eon)

use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::Result;
use crate::op::{ClusterOp, OpBase, fan_out, first_passing};
use async_trait::async_trait;
use serde_json::json;

/// `POST /startup/depot` on one initiator; the database creates the depot
/// location on every node.
pub struct CreateDepotOp {
    base: OpBase,
    depot_path: String,
    depot_size: Option<String>,
}

impl CreateDepotOp {
    pub fn new(initiators: Vec<String>, depot_path: impl Into<String>, depot_size: Option<String>) -> Self {
        CreateDepotOp {
            base: OpBase::with_hosts("create_depot", initiators),
            depot_path: depot_path.into(),
            depot_size,
        }
    }
}

#[async_trait]
impl ClusterOp for CreateDepotOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        format!("create the depot under {}", self.depot_path)
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        let body = json!({
            "depot_path": self.depot_path,
            "depot_size": self.depot_size,
        });
        self.base
            .register_for_all(|_| HostRequest::https_post("startup/depot", body.clone()));
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;
        first_passing("create_depot", &results)?;
        Ok(())
    }
}
