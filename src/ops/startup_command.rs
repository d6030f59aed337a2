//! Fetch node start commands from an UP node

use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::Result;
use crate::op::{ClusterOp, OpBase, fan_out, first_passing};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
struct StartupCommandResponse {
    #[serde(flatten)]
    startup_commands: BTreeMap<String, Vec<String>>,
}

/// `GET /startup/commands` from candidate UP hosts; the first passing
/// response fills `ctx.startup_commands` (node name → argv).
pub struct GetStartupCommandsOp {
    base: OpBase,
}

impl GetStartupCommandsOp {
    pub fn new(up_hosts: Vec<String>) -> Self {
        GetStartupCommandsOp {
            base: OpBase::with_hosts("get_startup_commands", up_hosts),
        }
    }
}

#[async_trait]
impl ClusterOp for GetStartupCommandsOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        "fetch node start commands from an UP node".to_string()
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        self.base
            .register_for_all(|_| HostRequest::https_get("startup/commands"));
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;
        let passing = first_passing("get_startup_commands", &results)?;
        let response: StartupCommandResponse = passing.json()?;
        ctx.startup_commands.extend(response.startup_commands);
        Ok(())
    }
}
