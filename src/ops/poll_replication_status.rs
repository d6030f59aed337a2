//! Replication status queries and transaction-id discovery

use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::{OpError, Result};
use crate::op::{ClusterOp, OpBase, fan_out, first_passing};
use crate::poller::{PollingOp, drive_polling};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;

/// One row of `POST /replicate/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationStatusRow {
    pub transaction_id: u64,
    pub node_name: String,
    pub op_name: String,
    pub status: String,
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub end_time: String,
    #[serde(default)]
    pub sent_bytes: u64,
    #[serde(default)]
    pub total_bytes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplicationStatusResponse {
    pub replication_status_list: Vec<ReplicationStatusRow>,
}

/// Merged view of one replication job: earliest op's timing plus the
/// currently running op's progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationStatusSummary {
    pub transaction_id: u64,
    pub status: String,
    pub op_name: String,
    pub start_time: String,
    pub end_time: String,
    pub sent_bytes: u64,
    pub total_bytes: u64,
}

fn op_order(op_name: &str) -> u8 {
    match op_name {
        "load_snapshot_prep" => 0,
        "data_transfer" => 1,
        "load_snapshot" => 2,
        _ => 3,
    }
}

/// Sort rows by (start_time, node_name, op order) and merge the first row's
/// timing info with the last row's status and progress.
pub fn summarize_status_rows(rows: &[ReplicationStatusRow]) -> Option<ReplicationStatusSummary> {
    let mut sorted: Vec<&ReplicationStatusRow> = rows.iter().collect();
    sorted.sort_by(|a, b| {
        a.start_time
            .cmp(&b.start_time)
            .then_with(|| a.node_name.cmp(&b.node_name))
            .then_with(|| op_order(&a.op_name).cmp(&op_order(&b.op_name)))
    });
    let first = sorted.first()?;
    let current = sorted.last()?;
    Some(ReplicationStatusSummary {
        transaction_id: current.transaction_id,
        status: current.status.clone(),
        op_name: current.op_name.clone(),
        start_time: first.start_time.clone(),
        end_time: current.end_time.clone(),
        sent_bytes: current.sent_bytes,
        total_bytes: current.total_bytes,
    })
}

/// Poll the target's `/replicate/status` until exactly one transaction id
/// not present before the job started shows up. More than one new id means
/// concurrent replicate jobs and is ambiguous, a hard failure.
pub struct PollReplicationTransactionOp {
    base: OpBase,
    db_name: String,
    existing_ids: HashSet<u64>,
    timeout_seconds: i64,
    discovered: Option<u64>,
    ambiguous: Vec<u64>,
}

impl PollReplicationTransactionOp {
    pub fn new(target_up_hosts: Vec<String>, db_name: impl Into<String>, existing_ids: Vec<u64>) -> Self {
        PollReplicationTransactionOp {
            base: OpBase::with_hosts("poll_replication_transaction", target_up_hosts),
            db_name: db_name.into(),
            existing_ids: existing_ids.into_iter().collect(),
            timeout_seconds: 300,
            discovered: None,
            ambiguous: Vec::new(),
        }
    }
}

#[async_trait]
impl ClusterOp for PollReplicationTransactionOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        "discover the transaction id of a new replication job".to_string()
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let name = self.base.name;
        drive_polling(name, self, ctx).await?;
        ctx.new_transaction_id = self.discovered;
        Ok(())
    }
}

#[async_trait]
impl PollingOp for PollReplicationTransactionOp {
    fn polling_timeout(&self) -> i64 {
        self.timeout_seconds
    }

    async fn run_execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let body = json!({ "db_name": self.db_name });
        self.base
            .register_for_all(|_| HostRequest::nma_post("replicate/status", body.clone()));
        let results = fan_out(&mut self.base, ctx).await;
        let Ok(passing) = first_passing("poll_replication_transaction", &results) else {
            return Ok(());
        };
        let response: ReplicationStatusResponse = passing.json()?;
        let new_ids: HashSet<u64> = response
            .replication_status_list
            .iter()
            .map(|r| r.transaction_id)
            .filter(|id| !self.existing_ids.contains(id))
            .collect();
        match new_ids.len() {
            0 => {}
            1 => self.discovered = new_ids.into_iter().next(),
            _ => {
                let mut ids: Vec<u64> = new_ids.into_iter().collect();
                ids.sort_unstable();
                self.ambiguous = ids;
            }
        }
        Ok(())
    }

    fn should_stop_polling(&mut self) -> Result<bool> {
        if !self.ambiguous.is_empty() {
            return Err(OpError::Internal(format!(
                "found {} new transaction ids {:?}; concurrent replicate jobs are ambiguous",
                self.ambiguous.len(),
                self.ambiguous
            )));
        }
        Ok(self.discovered.is_some())
    }
}

/// One-shot `POST /replicate/status` for a known transaction id, summarized
/// for the caller.
pub struct ReplicationStatusOp {
    base: OpBase,
    db_name: String,
    transaction_id: u64,
    pub summary: Option<ReplicationStatusSummary>,
}

impl ReplicationStatusOp {
    pub fn new(target_up_hosts: Vec<String>, db_name: impl Into<String>, transaction_id: u64) -> Self {
        ReplicationStatusOp {
            base: OpBase::with_hosts("replication_status", target_up_hosts),
            db_name: db_name.into(),
            transaction_id,
            summary: None,
        }
    }
}

#[async_trait]
impl ClusterOp for ReplicationStatusOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        format!(
            "query replication status of transaction {}",
            self.transaction_id
        )
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        let body = json!({
            "db_name": self.db_name,
            "transaction_id": self.transaction_id,
        });
        self.base
            .register_for_all(|_| HostRequest::nma_post("replicate/status", body.clone()));
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;
        let passing = first_passing("replication_status", &results)?;
        let response: ReplicationStatusResponse = passing.json()?;
        let rows: Vec<ReplicationStatusRow> = response
            .replication_status_list
            .into_iter()
            .filter(|r| r.transaction_id == self.transaction_id)
            .collect();
        if rows.is_empty() {
            return Err(OpError::NotFound {
                identifier: format!("replication transaction {}", self.transaction_id),
                host: passing.host.clone(),
            });
        }
        self.summary = summarize_status_rows(&rows);
        ctx.replication_status = self.summary.clone();
        Ok(())
    }
}

/// One-shot listing of the transaction ids the target currently knows,
/// taken before starting a job so the new id can be told apart.
pub struct SnapshotReplicationIdsOp {
    base: OpBase,
    db_name: String,
}

impl SnapshotReplicationIdsOp {
    pub fn new(target_up_hosts: Vec<String>, db_name: impl Into<String>) -> Self {
        SnapshotReplicationIdsOp {
            base: OpBase::with_hosts("snapshot_replication_ids", target_up_hosts),
            db_name: db_name.into(),
        }
    }
}

#[async_trait]
impl ClusterOp for SnapshotReplicationIdsOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        "snapshot pre-existing replication transaction ids".to_string()
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        let body = json!({ "db_name": self.db_name });
        self.base
            .register_for_all(|_| HostRequest::nma_post("replicate/status", body.clone()));
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;
        let passing = first_passing("snapshot_replication_ids", &results)?;
        let response: ReplicationStatusResponse = passing.json()?;
        let mut ids: Vec<u64> = response
            .replication_status_list
            .iter()
            .map(|r| r.transaction_id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ctx.existing_transaction_ids = ids;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(op: &str, start: &str, status: &str, sent: u64) -> ReplicationStatusRow {
        ReplicationStatusRow {
            transaction_id: 77,
            node_name: "v_db_node0001".into(),
            op_name: op.into(),
            status: status.into(),
            start_time: start.into(),
            end_time: String::new(),
            sent_bytes: sent,
            total_bytes: 1000,
        }
    }

    #[test]
    fn summary_merges_first_timing_with_current_status() {
        let rows = vec![
            row("data_transfer", "2024-01-01 00:01:00", "started", 500),
            row("load_snapshot_prep", "2024-01-01 00:00:00", "completed", 0),
        ];
        let summary = summarize_status_rows(&rows).unwrap();
        assert_eq!(summary.start_time, "2024-01-01 00:00:00");
        assert_eq!(summary.op_name, "data_transfer");
        assert_eq!(summary.status, "started");
        assert_eq!(summary.sent_bytes, 500);
    }

    #[test]
    fn op_order_breaks_equal_start_ties() {
        let rows = vec![
            row("load_snapshot", "t0", "started", 0),
            row("load_snapshot_prep", "t0", "completed", 0),
            row("data_transfer", "t0", "completed", 0),
        ];
        let summary = summarize_status_rows(&rows).unwrap();
        assert_eq!(summary.op_name, "load_snapshot");
    }
}
