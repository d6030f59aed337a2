//! Workload capture and replay operations

use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::Result;
use crate::op::{ClusterOp, OpBase, fan_out, first_passing};
use crate::workload::scheduler::{ReplayOptions, replay_sessions};
use crate::workload::WorkloadQuery;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Deserialize)]
struct CaptureResponse {
    #[serde(default)]
    workload_queries: Vec<WorkloadQuery>,
}

/// `POST /workload-replay/capture` on one UP host; the captured queries are
/// returned for the caller to persist as CSV.
pub struct WorkloadCaptureOp {
    base: OpBase,
    start_timestamp: String,
    end_timestamp: String,
    pub captured: Vec<WorkloadQuery>,
}

impl WorkloadCaptureOp {
    pub fn new(
        up_hosts: Vec<String>,
        start_timestamp: impl Into<String>,
        end_timestamp: impl Into<String>,
    ) -> Self {
        WorkloadCaptureOp {
            base: OpBase::with_hosts("workload_capture", up_hosts),
            start_timestamp: start_timestamp.into(),
            end_timestamp: end_timestamp.into(),
            captured: Vec::new(),
        }
    }
}

#[async_trait]
impl ClusterOp for WorkloadCaptureOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        format!(
            "capture workload between {} and {}",
            self.start_timestamp, self.end_timestamp
        )
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        let body = json!({
            "start_timestamp": self.start_timestamp,
            "end_timestamp": self.end_timestamp,
        });
        self.base
            .register_for_all(|_| HostRequest::nma_post("workload-replay/capture", body.clone()));
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;
        let passing = first_passing("workload_capture", &results)?;
        let response: CaptureResponse = passing.json()?;
        self.captured = response.workload_queries;
        Ok(())
    }
}

/// Drive the replay scheduler as one engine operation. The aggregated report
/// rows land in `ctx.workload_replay_data`.
pub struct WorkloadReplayOp {
    base: OpBase,
    queries: Vec<WorkloadQuery>,
    options: ReplayOptions,
    cancel: CancellationToken,
}

impl WorkloadReplayOp {
    pub fn new(
        replay_hosts: Vec<String>,
        queries: Vec<WorkloadQuery>,
        options: ReplayOptions,
        cancel: CancellationToken,
    ) -> Self {
        WorkloadReplayOp {
            base: OpBase::with_hosts("workload_replay", replay_hosts),
            queries,
            options,
            cancel,
        }
    }
}

#[async_trait]
impl ClusterOp for WorkloadReplayOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        format!(
            "replay {} captured queries on {} host(s)",
            self.queries.len(),
            self.base.hosts.len()
        )
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        if self.queries.is_empty() {
            self.base.skip_execute = true;
        }
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let report = replay_sessions(
            &ctx.dispatcher,
            &self.base.hosts,
            std::mem::take(&mut self.queries),
            &self.options,
            self.cancel.clone(),
        )
        .await?;
        ctx.workload_replay_data = report;
        Ok(())
    }
}
