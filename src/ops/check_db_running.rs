//! Verify no database process answers on a set of hosts

use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::{OpError, Result};
use crate::op::{ClusterOp, OpBase, fan_out};
use async_trait::async_trait;
use tracing::debug;

/// Why the caller needs the database to be down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbDownReason {
    CreateDb,
    ReviveDb,
    StopDbConfirmation,
}

/// Probe `/nodes` on every host; any answering host means a database is
/// still running there, which fails create/revive preconditions (or proves
/// an incomplete shutdown).
pub struct CheckDbRunningOp {
    base: OpBase,
    reason: DbDownReason,
}

impl CheckDbRunningOp {
    pub fn new(hosts: Vec<String>, reason: DbDownReason) -> Self {
        CheckDbRunningOp {
            base: OpBase::with_hosts("check_db_running", hosts),
            reason,
        }
    }
}

#[async_trait]
impl ClusterOp for CheckDbRunningOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        format!(
            "verify no database is running on {} host(s)",
            self.base.hosts.len()
        )
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        self.base
            .register_for_all(|_| HostRequest::https_get("nodes"));
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;
        let mut running: Vec<String> = results
            .values()
            .filter(|r| r.is_passing())
            .map(|r| r.host.clone())
            .collect();
        running.sort();
        if running.is_empty() {
            debug!("check_db_running: no database answered, as required");
            return Ok(());
        }
        let hint = match self.reason {
            DbDownReason::CreateDb => "stop the database before creating a new one",
            DbDownReason::ReviveDb => "stop the database before reviving",
            DbDownReason::StopDbConfirmation => "the shutdown did not complete",
        };
        Err(OpError::Validation(format!(
            "a database is still running on [{}]: {hint}",
            running.join(", ")
        )))
    }
}
