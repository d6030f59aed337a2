//! Topology snapshot fetch shared by the composers

use super::DatabaseOptions;
use crate::error::{OpError, Result};
use crate::op::ClusterOp;
use crate::ops::fetch_vdb::FetchVdbOp;
use crate::vdb::Vdb;
use tracing::warn;

/// Fetch the coordination database from whichever host answers.
pub async fn fetch_vdb(options: &DatabaseOptions, hosts: &[String]) -> Result<Vdb> {
    let engine = options.engine();
    let mut instructions: Vec<Box<dyn ClusterOp>> =
        vec![Box::new(FetchVdbOp::new(hosts.to_vec()))];
    let ctx = engine.run(&mut instructions).await?;
    ctx.vdb_for_sandbox_info
        .ok_or_else(|| OpError::Internal("fetch left no topology snapshot behind".into()))
}

/// Deep fetch: main-cluster view first, then one sandbox-scoped fetch per
/// discovered sandbox, overlaying sandbox-accurate node state. This yields
/// correct addresses when the main cluster is UP but sandbox nodes changed
/// IPs.
pub async fn fetch_vdb_deep(options: &DatabaseOptions, hosts: &[String]) -> Result<Vdb> {
    let mut vdb = fetch_vdb(options, hosts).await?;
    let engine = options.engine();
    for sandbox in vdb.all_sandboxes.clone() {
        let sandbox_hosts: Vec<String> = vdb
            .filter_sandbox_nodes(&sandbox)
            .iter()
            .map(|n| n.address.clone())
            .collect();
        if sandbox_hosts.is_empty() {
            continue;
        }
        let mut instructions: Vec<Box<dyn ClusterOp>> = vec![Box::new(
            FetchVdbOp::new(sandbox_hosts).scoped_to_sandbox(sandbox.clone()),
        )];
        match engine.run(&mut instructions).await {
            Ok(ctx) => {
                if let Some(sandbox_vdb) = ctx.vdb_for_sandbox_info {
                    vdb.overlay_sandbox_vdb(&sandbox, &sandbox_vdb);
                }
            }
            Err(e) => {
                // the main-cluster view stays authoritative for this sandbox
                warn!("deep fetch: sandbox {sandbox} did not answer: {e}");
            }
        }
    }
    Ok(vdb)
}
