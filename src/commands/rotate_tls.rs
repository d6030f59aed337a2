//! Certificate rotation workflows

use super::DatabaseOptions;
use crate::dispatcher::TlsOptions;
use crate::error::{OpError, Result};
use crate::op::ClusterOp;
use crate::ops::get_up_nodes::GetUpNodesOp;
use crate::ops::nma_health::{NmaHealthOp, PollNmaHealthOp};
use crate::ops::nma_shutdown::ShutdownNmaOp;
use crate::ops::rotate_https_certs::{RotateCertsRequest, RotateHttpsCertsOp};
use crate::ops::tls_digest::{TlsConfigDigest, TlsDigestOp};
use typed_builder::TypedBuilder;

#[derive(Debug, Clone, TypedBuilder)]
pub struct RotateHttpsCertsOptions {
    pub base: DatabaseOptions,
    pub certs: RotateCertsRequest,
}

/// Rotate the HTTPS service certificates: one rotate call per db-group
/// initiator, then verify every host reports an identical TLS config digest.
/// The returned digest is only published when all hosts agree.
pub async fn rotate_https_certs(
    options: &mut RotateHttpsCertsOptions,
) -> Result<TlsConfigDigest> {
    options.base.validate_base_options("rotate_https_certs")?;
    let hosts = options.base.analyze()?;
    let engine = options.base.engine();

    let mut discovery: Vec<Box<dyn ClusterOp>> =
        vec![Box::new(GetUpNodesOp::new(hosts.clone()).full_scan())];
    let ctx = engine
        .run(&mut discovery)
        .await
        .map_err(|e| e.in_op("rotate_https_certs"))?;

    // globally scoped: one initiator per sandbox plus the main cluster
    let initiators: Vec<String> = ctx
        .one_up_host_per_db_group()
        .into_iter()
        .map(|(_, host)| host)
        .collect();
    if initiators.is_empty() {
        return Err(OpError::DbDown(
            "no UP host found to rotate certificates through".into(),
        ));
    }
    let up_hosts = ctx.up_hosts.clone();

    let mut instructions: Vec<Box<dyn ClusterOp>> = vec![
        Box::new(RotateHttpsCertsOp::new(initiators, options.certs.clone())),
        Box::new(TlsDigestOp::new(up_hosts)),
    ];
    let ctx = engine
        .run(&mut instructions)
        .await
        .map_err(|e| e.in_op("rotate_https_certs"))?;
    ctx.tls_config_digest
        .ok_or_else(|| OpError::Internal("certificate rotation left no digest behind".into()))
}

#[derive(Debug, Clone, TypedBuilder)]
pub struct RotateNmaCertsOptions {
    pub base: DatabaseOptions,
    /// Client-side material matching the NMA's new certificates
    pub new_tls: TlsOptions,
    /// Kill the agents so they restart and pick the new certificates up
    #[builder(default)]
    pub kill_nma: bool,
}

/// Rotate NMA certificates. A successful health poll through the new
/// certificates is the signal that the rotation took effect.
pub async fn rotate_nma_certs(options: &mut RotateNmaCertsOptions) -> Result<()> {
    options.base.validate_base_options("rotate_nma_certs")?;
    let hosts = options.base.analyze()?;
    let engine = options.base.engine();

    let mut instructions: Vec<Box<dyn ClusterOp>> = Vec::new();
    if options.kill_nma {
        instructions.push(Box::new(NmaHealthOp::new(hosts.clone())));
        instructions.push(Box::new(ShutdownNmaOp::new(hosts.clone())));
    }
    instructions.push(Box::new(
        PollNmaHealthOp::new(hosts).with_new_tls(options.new_tls.clone()),
    ));
    engine
        .run(&mut instructions)
        .await
        .map_err(|e| e.in_op("rotate_nma_certs"))?;
    Ok(())
}
