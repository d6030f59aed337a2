//! Return a sandboxed subcluster to the main cluster

use super::{DatabaseOptions, fetch, re_ip, subcluster_precheck};
use crate::error::{OpError, Result};
use crate::op::ClusterOp;
use crate::ops::delete_directories::DeleteCatalogDirsOp;
use crate::ops::find_subcluster::FindSubclusterOp;
use crate::ops::poll_node_state::PollNodeStateOp;
use crate::ops::shutdown_cluster::StopNodeOp;
use crate::ops::start_node::StartNodeOp;
use crate::ops::startup_command::GetStartupCommandsOp;
use crate::ops::unsandbox_subcluster::UnsandboxSubclusterOp;
use crate::vdb::{MAIN_CLUSTER, NodeState};
use std::collections::{BTreeMap, HashMap};
use tracing::info;
use typed_builder::TypedBuilder;

#[derive(Debug, Clone, TypedBuilder)]
pub struct UnsandboxSubclusterOptions {
    pub base: DatabaseOptions,
    #[builder(setter(into))]
    pub sc_name: String,
    /// Leave the unsandboxed nodes down instead of restarting them
    #[builder(default)]
    pub skip_restart: bool,
}

impl UnsandboxSubclusterOptions {
    pub fn validate(&self) -> Result<()> {
        self.base.validate_base_options("unsandbox_subcluster")?;
        if self.sc_name.is_empty() {
            return Err(OpError::Validation(
                "must specify a subcluster name to unsandbox".into(),
            ));
        }
        Ok(())
    }
}

/// Unsandbox the subcluster: reconcile stale addresses in both db-groups,
/// stop the subcluster's UP nodes, detach it from the sandbox, wipe the
/// sandbox catalogs and restart the nodes into the main cluster.
pub async fn unsandbox_subcluster(options: &mut UnsandboxSubclusterOptions) -> Result<()> {
    options.validate()?;
    let hosts = options.base.analyze()?;

    let vdb = fetch::fetch_vdb_deep(&options.base, &hosts)
        .await
        .map_err(|e| e.in_op("unsandbox_subcluster"))?;

    subcluster_precheck(
        &options.base,
        &hosts,
        FindSubclusterOp::new(hosts.clone(), options.sc_name.clone()).ignoring_not_found(),
    )
    .await
    .map_err(|e| e.in_op("unsandbox_subcluster"))?;

    // the node map is the source of truth for membership
    let sandbox = vdb
        .host_node_map
        .values()
        .find(|n| n.subcluster == options.sc_name)
        .map(|n| n.sandbox.clone())
        .unwrap_or_default();
    if sandbox.is_empty() {
        return Err(OpError::SubclusterNotSandboxed {
            sc_name: options.sc_name.clone(),
        });
    }

    let live_addresses: BTreeMap<String, String> = vdb
        .host_node_map
        .values()
        .map(|n| (n.name.clone(), n.address.clone()))
        .collect();

    let main_initiator = vdb.get_sandbox_initiator(MAIN_CLUSTER, &[])?;
    let sandbox_initiator = vdb.get_sandbox_initiator(&sandbox, &[]).ok();

    // stale catalog IPs break the unsandbox handshake in both groups
    re_ip::re_ip(&options.base, &main_initiator, &live_addresses, true)
        .await
        .map_err(|e| e.in_op("unsandbox_subcluster"))?;
    if let Some(initiator) = &sandbox_initiator {
        re_ip::re_ip(&options.base, initiator, &live_addresses, true)
            .await
            .map_err(|e| e.in_op("unsandbox_subcluster"))?;
    }

    let sc_hosts = vdb.hosts_of_subcluster(&options.sc_name);
    let sc_up_nodes: Vec<String> = sc_hosts
        .iter()
        .filter_map(|h| vdb.host_node_map.get(h))
        .filter(|n| n.state == NodeState::Up)
        .map(|n| n.name.clone())
        .collect();
    let catalog_paths: HashMap<String, String> = sc_hosts
        .iter()
        .filter_map(|h| {
            vdb.host_node_map
                .get(h)
                .map(|n| (h.clone(), n.catalog_path.clone()))
        })
        .collect();

    let mut instructions: Vec<Box<dyn ClusterOp>> = Vec::new();
    if let Some(initiator) = sandbox_initiator {
        if !sc_up_nodes.is_empty() {
            instructions.push(Box::new(StopNodeOp::new(initiator.clone(), sc_up_nodes)));
            instructions.push(Box::new(PollNodeStateOp::wait_for_subcluster_down(
                initiator,
                options.sc_name.clone(),
            )));
        }
    } else {
        info!(
            "unsandbox_subcluster: no UP host in sandbox {sandbox}; nothing to stop"
        );
    }
    instructions.push(Box::new(UnsandboxSubclusterOp::new(
        vec![main_initiator.clone()],
        options.sc_name.clone(),
    )));
    instructions.push(Box::new(DeleteCatalogDirsOp::new(catalog_paths)));
    if !options.skip_restart {
        let node_names: HashMap<String, String> = sc_hosts
            .iter()
            .filter_map(|h| {
                vdb.host_node_map
                    .get(h)
                    .map(|n| (h.clone(), n.name.clone()))
            })
            .collect();
        instructions.push(Box::new(GetStartupCommandsOp::new(vec![main_initiator])));
        instructions.push(Box::new(StartNodeOp::new(node_names)));
        instructions.push(Box::new(PollNodeStateOp::wait_for_up(sc_hosts)));
    }

    options
        .base
        .engine()
        .run(&mut instructions)
        .await
        .map_err(|e| e.in_op("unsandbox_subcluster"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subcluster_name_is_required() {
        let opts = UnsandboxSubclusterOptions::builder()
            .base(
                DatabaseOptions::builder()
                    .db_name("testdb")
                    .raw_hosts(vec!["10.0.0.1".to_string()])
                    .build(),
            )
            .sc_name("")
            .build();
        assert!(opts.validate().is_err());
    }
}
