//! Collect per-node last-good-epoch reports

use crate::catalog::{EpochReport, calculate_last_good_epoch};
use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::{OpError, Result};
use crate::op::{ClusterOp, OpBase, fan_out};
use async_trait::async_trait;
use serde_json::json;

/// `POST /epoch` on every host; finalize computes the majority epoch and
/// stores it in `ctx.last_good_epoch`. Majority and ksafety-consistency
/// failures are hard stops.
pub struct GetLastGoodEpochOp {
    base: OpBase,
    db_name: String,
}

impl GetLastGoodEpochOp {
    pub fn new(hosts: Vec<String>, db_name: impl Into<String>) -> Self {
        GetLastGoodEpochOp {
            base: OpBase::with_hosts("get_last_good_epoch", hosts),
            db_name: db_name.into(),
        }
    }
}

#[async_trait]
impl ClusterOp for GetLastGoodEpochOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        format!(
            "collect last-good-epoch reports from {} host(s)",
            self.base.hosts.len()
        )
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        let body = json!({ "db_name": self.db_name });
        self.base
            .register_for_all(|_| HostRequest::nma_post("epoch", body.clone()));
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;
        let mut causes = Vec::new();
        for result in results.values() {
            if result.is_unauthorized() {
                return Err(OpError::Unauthorized {
                    host: result.host.clone(),
                });
            }
            if !result.is_passing() {
                causes.push(format!("{}: {}", result.host, result.as_error()));
                continue;
            }
            let report: EpochReport = result.json()?;
            ctx.epoch_reports.push(report);
        }
        if !causes.is_empty() {
            causes.sort();
            return Err(OpError::joined("get_last_good_epoch", causes));
        }
        Ok(())
    }

    async fn finalize(&mut self, ctx: &mut ExecContext) -> Result<()> {
        if ctx.epoch_reports.is_empty() {
            return Ok(());
        }
        ctx.last_good_epoch = Some(calculate_last_good_epoch(&ctx.epoch_reports)?);
        Ok(())
    }
}
