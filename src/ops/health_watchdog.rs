//! Health watchdog controls exposed by the NMA

use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::Result;
use crate::op::{ClusterOp, OpBase, ResultHandling, ensure_all_passing, fan_out};
use async_trait::async_trait;
use serde_json::Value;

/// Which watchdog endpoint to hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogAction {
    Get,
    Set,
    CancelQuery,
}

impl WatchdogAction {
    fn endpoint(self) -> &'static str {
        match self {
            WatchdogAction::Get => "health-watchdog/get",
            WatchdogAction::Set => "health-watchdog/set",
            WatchdogAction::CancelQuery => "health-watchdog/cancel-query",
        }
    }
}

/// `POST /health-watchdog/{get,set,cancel-query}` on every target host with
/// a caller-provided payload.
pub struct HealthWatchdogOp {
    base: OpBase,
    action: WatchdogAction,
    payload: Value,
}

impl HealthWatchdogOp {
    pub fn new(hosts: Vec<String>, action: WatchdogAction, payload: Value) -> Self {
        HealthWatchdogOp {
            base: OpBase::with_hosts("health_watchdog", hosts),
            action,
            payload,
        }
    }
}

#[async_trait]
impl ClusterOp for HealthWatchdogOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        format!("health watchdog {:?} on {} host(s)", self.action, self.base.hosts.len())
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        let endpoint = self.action.endpoint();
        let payload = self.payload.clone();
        self.base
            .register_for_all(move |_| HostRequest::nma_post(endpoint, payload.clone()));
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;
        ensure_all_passing("health_watchdog", &results, ResultHandling::default())
    }
}
