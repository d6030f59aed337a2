//! Stop a database, one db-group or all of them

use super::DatabaseOptions;
use crate::error::{OpError, Result};
use crate::op::ClusterOp;
use crate::ops::check_db_running::{CheckDbRunningOp, DbDownReason};
use crate::ops::check_sessions::CheckSessionsOp;
use crate::ops::get_up_nodes::GetUpNodesOp;
use crate::ops::shutdown_cluster::ShutdownClusterOp;
use crate::ops::sync_catalog::SyncCatalogOp;
use crate::vdb::MAIN_CLUSTER;
use tracing::info;
use typed_builder::TypedBuilder;

#[derive(Debug, Clone, TypedBuilder)]
pub struct StopDbOptions {
    pub base: DatabaseOptions,
    /// Stop only this sandbox's db-group
    #[builder(default, setter(into, strip_option))]
    pub sandbox: Option<String>,
    /// Stop only the main cluster
    #[builder(default)]
    pub main_cluster_only: bool,
    /// Fail with the session list when clients are still connected
    #[builder(default)]
    pub check_user_conn: bool,
    /// Sync the catalog before shutting down (Eon)
    #[builder(default)]
    pub if_sync_catalog: bool,
    /// Seconds the database may drain clients before going down
    #[builder(default, setter(strip_option))]
    pub drain_seconds: Option<u64>,
}

impl StopDbOptions {
    pub fn validate(&self) -> Result<()> {
        self.base.validate_base_options("stop_db")?;
        if self.sandbox.is_some() && self.main_cluster_only {
            return Err(OpError::Validation(
                "--sandbox and --main-cluster-only cannot be combined".into(),
            ));
        }
        Ok(())
    }
}

/// Stop the database. Targeting: a named sandbox stops just that db-group,
/// `main_cluster_only` just the main cluster, neither stops one initiator
/// per sandbox plus the main cluster, main cluster contacted last.
pub async fn stop_db(options: &mut StopDbOptions) -> Result<()> {
    options.validate()?;
    let hosts = options.base.analyze()?;
    let engine = options.base.engine();

    // classify UP hosts by db-group first
    let mut discovery: Vec<Box<dyn ClusterOp>> = vec![Box::new(
        GetUpNodesOp::new(hosts.clone()).full_scan().allowing_db_down(),
    )];
    let ctx = engine.run(&mut discovery).await.map_err(|e| e.in_op("stop_db"))?;

    let initiators: Vec<String> = if let Some(sandbox) = &options.sandbox {
        let in_sandbox = ctx.up_hosts_in_sandbox(sandbox);
        match in_sandbox.first() {
            Some(host) => vec![host.clone()],
            None => {
                info!("stop_db: no UP host in sandbox {sandbox}; the db-group looks down already");
                Vec::new()
            }
        }
    } else if options.main_cluster_only {
        ctx.up_hosts_in_sandbox(MAIN_CLUSTER)
            .first()
            .cloned()
            .into_iter()
            .collect()
    } else {
        ctx.one_up_host_per_db_group()
            .into_iter()
            .map(|(_, host)| host)
            .collect()
    };

    if !initiators.is_empty() {
        let mut instructions: Vec<Box<dyn ClusterOp>> = Vec::new();
        if options.check_user_conn {
            instructions.push(Box::new(CheckSessionsOp::new(vec![
                initiators[0].clone(),
            ])));
        }
        if options.if_sync_catalog {
            instructions.push(Box::new(SyncCatalogOp::new(vec![initiators[0].clone()])));
        }
        instructions.push(Box::new(ShutdownClusterOp::new(
            initiators,
            options.drain_seconds,
        )));
        engine
            .run(&mut instructions)
            .await
            .map_err(|e| e.in_op("stop_db"))?;
    }

    // confirm nothing answers anymore
    let mut confirmation: Vec<Box<dyn ClusterOp>> = vec![Box::new(CheckDbRunningOp::new(
        scoped_hosts(options, &hosts, &ctx),
        DbDownReason::StopDbConfirmation,
    ))];
    engine
        .run(&mut confirmation)
        .await
        .map_err(|e| e.in_op("stop_db"))?;
    Ok(())
}

/// The hosts whose shutdown we must confirm, respecting the targeting rules.
fn scoped_hosts(
    options: &StopDbOptions,
    hosts: &[String],
    ctx: &crate::context::ExecContext,
) -> Vec<String> {
    if let Some(sandbox) = &options.sandbox {
        let scoped = ctx.up_hosts_in_sandbox(sandbox);
        if scoped.is_empty() { hosts.to_vec() } else { scoped }
    } else if options.main_cluster_only {
        let scoped = ctx.up_hosts_in_sandbox(MAIN_CLUSTER);
        if scoped.is_empty() { hosts.to_vec() } else { scoped }
    } else {
        hosts.to_vec()
    }
}
