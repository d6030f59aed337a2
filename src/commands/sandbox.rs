//! Sandbox a subcluster

use super::{DatabaseOptions, subcluster_precheck};
use crate::error::{OpError, Result};
use crate::op::ClusterOp;
use crate::ops::find_subcluster::FindSubclusterOp;
use crate::ops::poll_node_state::PollNodeStateOp;
use crate::ops::sandbox_subcluster::SandboxSubclusterOp;
use crate::vdb::MAIN_CLUSTER;
use typed_builder::TypedBuilder;

#[derive(Debug, Clone, TypedBuilder)]
pub struct SandboxSubclusterOptions {
    pub base: DatabaseOptions,
    #[builder(setter(into))]
    pub sc_name: String,
    #[builder(setter(into))]
    pub sandbox_name: String,
    #[builder(default)]
    pub save_restore_point: bool,
}

impl SandboxSubclusterOptions {
    pub fn validate(&self) -> Result<()> {
        self.base.validate_base_options("sandbox_subcluster")?;
        if self.sc_name.is_empty() {
            return Err(OpError::Validation(
                "must specify a subcluster name to sandbox".into(),
            ));
        }
        if self.sandbox_name.is_empty() {
            return Err(OpError::Validation("must specify a sandbox name".into()));
        }
        Ok(())
    }
}

/// Carve the subcluster out into its own sandbox and wait for its nodes to
/// come back up under the new db-group.
pub async fn sandbox_subcluster(options: &mut SandboxSubclusterOptions) -> Result<()> {
    options.validate()?;
    let hosts = options.base.analyze()?;

    let ctx = subcluster_precheck(
        &options.base,
        &hosts,
        FindSubclusterOp::new(hosts.clone(), options.sc_name.clone()),
    )
    .await
    .map_err(|e| e.in_op("sandbox_subcluster"))?;

    if let Some(info) = &ctx.target_sc_info {
        if !info.sandbox.is_empty() {
            return Err(OpError::Validation(format!(
                "subcluster {} is already in sandbox {}",
                options.sc_name, info.sandbox
            )));
        }
    }
    let sc_hosts: Vec<String> = ctx
        .up_sc_info
        .get(&options.sc_name)
        .cloned()
        .unwrap_or_default();
    if sc_hosts.is_empty() {
        return Err(OpError::DbDown(format!(
            "subcluster {} has no UP host to sandbox",
            options.sc_name
        )));
    }
    // the sandbox request goes through a main-cluster host outside the target
    let initiator = ctx
        .up_hosts_in_sandbox(MAIN_CLUSTER)
        .into_iter()
        .find(|h| !sc_hosts.contains(h))
        .ok_or_else(|| {
            OpError::DbDown(format!(
                "no UP main-cluster host outside subcluster {}",
                options.sc_name
            ))
        })?;

    let mut sandbox_op = SandboxSubclusterOp::new(
        vec![initiator],
        options.sc_name.clone(),
        options.sandbox_name.clone(),
    );
    if options.save_restore_point {
        sandbox_op = sandbox_op.saving_restore_point();
    }
    let mut instructions: Vec<Box<dyn ClusterOp>> = vec![
        Box::new(sandbox_op),
        Box::new(PollNodeStateOp::wait_for_up(sc_hosts)),
    ];
    options
        .base
        .engine()
        .run(&mut instructions)
        .await
        .map_err(|e| e.in_op("sandbox_subcluster"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(sc: &str, sandbox: &str) -> SandboxSubclusterOptions {
        SandboxSubclusterOptions::builder()
            .base(
                DatabaseOptions::builder()
                    .db_name("testdb")
                    .raw_hosts(vec!["10.0.0.1".to_string()])
                    .build(),
            )
            .sc_name(sc)
            .sandbox_name(sandbox)
            .build()
    }

    #[test]
    fn names_are_required() {
        assert!(options("", "sand1").validate().is_err());
        assert!(options("sc1", "").validate().is_err());
        assert!(options("sc1", "sand1").validate().is_ok());
    }
}
