//! Replicate a database towards a target cluster

use super::{DatabaseOptions, fetch};
use crate::error::{OpError, Result};
use crate::op::ClusterOp;
use crate::ops::get_up_nodes::GetUpNodesOp;
use crate::ops::poll_replication_status::{
    PollReplicationTransactionOp, ReplicationStatusOp, ReplicationStatusSummary,
    SnapshotReplicationIdsOp,
};
use crate::ops::replication_start::{ReplicationStartOp, ReplicationStartRequest};
use typed_builder::TypedBuilder;

#[derive(Debug, Clone, TypedBuilder)]
pub struct ReplicateStartOptions {
    /// Source database options; its hosts are the source fleet
    pub base: DatabaseOptions,
    pub target_hosts: Vec<String>,
    #[builder(setter(into))]
    pub target_db_name: String,
    #[builder(default, setter(into, strip_option))]
    pub target_username: Option<String>,
    #[builder(default, setter(into, strip_option))]
    pub target_password: Option<String>,
    /// Source db-group to replicate from; empty = main cluster
    #[builder(default, setter(into))]
    pub sandbox: String,
    #[builder(default, setter(into, strip_option))]
    pub table_or_schema_name: Option<String>,
}

impl ReplicateStartOptions {
    pub fn validate(&self) -> Result<()> {
        self.base.validate_base_options("replicate_start")?;
        if self.target_hosts.is_empty() {
            return Err(OpError::Validation(
                "replicate_start requires at least one target host".into(),
            ));
        }
        if self.target_db_name.is_empty() {
            return Err(OpError::Validation(
                "replicate_start requires a target database name".into(),
            ));
        }
        Ok(())
    }
}

/// Start replication from one UP source host and poll the target until the
/// job's transaction id appears. Returns that id for later status queries.
pub async fn replicate_start(options: &mut ReplicateStartOptions) -> Result<u64> {
    options.validate()?;
    let hosts = options.base.analyze()?;

    let vdb = fetch::fetch_vdb(&options.base, &hosts)
        .await
        .map_err(|e| e.in_op("replicate_start"))?;
    let source_initiator = vdb.get_initiator_host_for_replication(&options.sandbox, &hosts)?;

    let engine = options.base.engine();

    // snapshot the target's known transaction ids before starting
    let mut snapshot: Vec<Box<dyn ClusterOp>> = vec![
        Box::new(GetUpNodesOp::new(options.target_hosts.clone())),
        Box::new(SnapshotReplicationIdsOp::new(
            options.target_hosts.clone(),
            options.target_db_name.clone(),
        )),
    ];
    let ctx = engine
        .run(&mut snapshot)
        .await
        .map_err(|e| e.in_op("replicate_start"))?;
    let existing_ids = ctx.existing_transaction_ids.clone();

    let mut instructions: Vec<Box<dyn ClusterOp>> = vec![
        Box::new(ReplicationStartOp::new(
            vec![source_initiator],
            ReplicationStartRequest {
                db_name: options.base.db_name.clone(),
                target_hosts: options.target_hosts.clone(),
                target_db_name: options.target_db_name.clone(),
                target_username: options.target_username.clone(),
                target_password: options.target_password.clone(),
                source_tls_config: None,
                table_or_schema_name: options.table_or_schema_name.clone(),
            },
        )),
        Box::new(PollReplicationTransactionOp::new(
            options.target_hosts.clone(),
            options.target_db_name.clone(),
            existing_ids,
        )),
    ];
    let ctx = engine
        .run(&mut instructions)
        .await
        .map_err(|e| e.in_op("replicate_start"))?;
    ctx.new_transaction_id.ok_or_else(|| {
        OpError::Internal("replication started but no new transaction id was discovered".into())
    })
}

#[derive(Debug, Clone, TypedBuilder)]
pub struct ReplicateStatusOptions {
    /// Target database options; its hosts answer the status queries
    pub base: DatabaseOptions,
    pub transaction_id: u64,
}

/// Query the merged status of one replication job on the target.
pub async fn replicate_status(
    options: &mut ReplicateStatusOptions,
) -> Result<ReplicationStatusSummary> {
    options.base.validate_base_options("replicate_status")?;
    let hosts = options.base.analyze()?;

    let mut instructions: Vec<Box<dyn ClusterOp>> = vec![Box::new(ReplicationStatusOp::new(
        hosts,
        options.base.db_name.clone(),
        options.transaction_id,
    ))];
    let ctx = options
        .base
        .engine()
        .run(&mut instructions)
        .await
        .map_err(|e| e.in_op("replicate_status"))?;
    ctx.replication_status.ok_or_else(|| {
        OpError::Internal("replication status query returned no summary".into())
    })
}
