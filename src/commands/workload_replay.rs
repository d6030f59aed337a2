//! Capture a workload and replay it elsewhere

use super::DatabaseOptions;
use crate::error::{OpError, Result};
use crate::op::ClusterOp;
use crate::ops::get_up_nodes::GetUpNodesOp;
use crate::ops::workload_replay::WorkloadReplayOp;
use crate::util::parse_workload_time;
use crate::workload::scheduler::ReplayOptions;
use crate::workload::{ReplayReportRow, read_workload_csv, write_replay_report};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use typed_builder::TypedBuilder;

#[derive(Debug, Clone, TypedBuilder)]
pub struct WorkloadReplayOptions {
    pub base: DatabaseOptions,
    /// Captured workload CSV
    pub workload_file: PathBuf,
    /// Where to write the aggregated report; skipped when unset
    #[builder(default, setter(strip_option))]
    pub report_file: Option<PathBuf>,
    /// Skip the relative-timing sleeps, keep the ordering
    #[builder(default)]
    pub quick_replay: bool,
}

impl WorkloadReplayOptions {
    pub fn validate(&self) -> Result<()> {
        self.base.validate_base_options("workload_replay")?;
        if self.workload_file.as_os_str().is_empty() {
            return Err(OpError::Validation(
                "workload_replay requires a workload file".into(),
            ));
        }
        Ok(())
    }
}

/// Validate a capture window: both bounds parse and start precedes end.
pub fn validate_capture_timestamps(start: &str, end: &str) -> Result<()> {
    let start_ts = parse_workload_time(start)?;
    let end_ts = parse_workload_time(end)?;
    if start_ts >= end_ts {
        return Err(OpError::Validation(format!(
            "capture start {start:?} must precede end {end:?}"
        )));
    }
    Ok(())
}

/// Replay the captured workload against UP hosts of the target database and
/// return one report row per original query. `cancel` aborts in-flight
/// sessions at their next suspension point.
pub async fn workload_replay(
    options: &mut WorkloadReplayOptions,
    cancel: CancellationToken,
) -> Result<Vec<ReplayReportRow>> {
    options.validate()?;
    let hosts = options.base.analyze()?;
    let queries = read_workload_csv(&options.workload_file)?;
    let engine = options.base.engine();

    let mut discovery: Vec<Box<dyn ClusterOp>> = vec![Box::new(GetUpNodesOp::new(hosts))];
    let ctx = engine
        .run(&mut discovery)
        .await
        .map_err(|e| e.in_op("workload_replay"))?;
    let replay_hosts = ctx.up_hosts.clone();
    if replay_hosts.is_empty() {
        return Err(OpError::DbDown("no UP host to replay the workload on".into()));
    }

    let mut instructions: Vec<Box<dyn ClusterOp>> = vec![Box::new(WorkloadReplayOp::new(
        replay_hosts,
        queries,
        ReplayOptions {
            quick_replay: options.quick_replay,
        },
        cancel,
    ))];
    let ctx = engine
        .run(&mut instructions)
        .await
        .map_err(|e| e.in_op("workload_replay"))?;

    if let Some(report_file) = &options.report_file {
        write_replay_report(report_file, &ctx.workload_replay_data)?;
    }
    Ok(ctx.workload_replay_data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_window_must_be_ordered() {
        assert!(
            validate_capture_timestamps(
                "2024-03-01T10:00:00.000000+00:00",
                "2024-03-01T11:00:00.000000+00:00"
            )
            .is_ok()
        );
        assert!(
            validate_capture_timestamps(
                "2024-03-01T11:00:00.000000+00:00",
                "2024-03-01T10:00:00.000000+00:00"
            )
            .is_err()
        );
        assert!(validate_capture_timestamps("yesterday", "today").is_err());
    }
}
