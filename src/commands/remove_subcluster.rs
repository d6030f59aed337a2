//! Remove a subcluster: detach its nodes, clean up, drop the name

use super::{DatabaseOptions, fetch, subcluster_precheck};
use crate::error::{OpError, Result};
use crate::op::ClusterOp;
use crate::ops::create_node::DropNodeOp;
use crate::ops::delete_directories::DeleteCatalogDirsOp;
use crate::ops::drop_subcluster::DropSubclusterOp;
use crate::ops::find_subcluster::FindSubclusterOp;
use crate::ops::poll_node_state::PollNodeStateOp;
use crate::ops::shutdown_cluster::StopNodeOp;
use crate::vdb::{MAIN_CLUSTER, NodeState};
use std::collections::HashMap;
use typed_builder::TypedBuilder;

#[derive(Debug, Clone, TypedBuilder)]
pub struct RemoveSubclusterOptions {
    pub base: DatabaseOptions,
    #[builder(setter(into))]
    pub sc_name: String,
}

impl RemoveSubclusterOptions {
    pub fn validate(&self) -> Result<()> {
        self.base.validate_base_options("remove_subcluster")?;
        if self.sc_name.is_empty() {
            return Err(OpError::Validation(
                "must specify a subcluster name to remove".into(),
            ));
        }
        Ok(())
    }
}

/// Remove the subcluster. The default subcluster is rejected; in Eon mode
/// removing the only primary subcluster is forbidden. When the target lives
/// in a sandbox the drop goes through one initiator per involved db-group.
pub async fn remove_subcluster(options: &mut RemoveSubclusterOptions) -> Result<()> {
    options.validate()?;
    let hosts = options.base.analyze()?;

    let vdb = fetch::fetch_vdb_deep(&options.base, &hosts)
        .await
        .map_err(|e| e.in_op("remove_subcluster"))?;

    if vdb.is_eon && vdb.is_primary_subcluster(&options.sc_name) && !vdb.has_primary_outside(&options.sc_name) {
        return Err(OpError::Validation(format!(
            "cannot remove {}: it is the only primary subcluster",
            options.sc_name
        )));
    }

    subcluster_precheck(
        &options.base,
        &hosts,
        FindSubclusterOp::new(hosts.clone(), options.sc_name.clone()).rejecting_default(),
    )
    .await
    .map_err(|e| e.in_op("remove_subcluster"))?;

    let sc_hosts = vdb.hosts_of_subcluster(&options.sc_name);
    if sc_hosts.is_empty() {
        return Err(OpError::NotFound {
            identifier: format!("subcluster {}", options.sc_name),
            host: hosts.first().cloned().unwrap_or_default(),
        });
    }
    let sandbox = vdb
        .host_node_map
        .get(&sc_hosts[0])
        .map(|n| n.sandbox.clone())
        .unwrap_or_default();

    // an initiator in the target's own db-group, outside the subcluster
    let group_initiator = vdb.get_initiator_host_in_cluster(&sandbox, &options.sc_name)?;
    let sc_node_names: Vec<String> = sc_hosts
        .iter()
        .filter_map(|h| vdb.host_node_map.get(h))
        .map(|n| n.name.clone())
        .collect();
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
    if !sc_up_nodes.is_empty() {
        instructions.push(Box::new(StopNodeOp::new(
            group_initiator.clone(),
            sc_up_nodes,
        )));
        instructions.push(Box::new(PollNodeStateOp::wait_for_subcluster_down(
            group_initiator.clone(),
            options.sc_name.clone(),
        )));
    }
    instructions.push(Box::new(DropNodeOp::new(
        group_initiator.clone(),
        sc_node_names,
    )));
    instructions.push(Box::new(DeleteCatalogDirsOp::new(catalog_paths)));

    // the drop is globally scoped: one initiator per involved db-group
    let mut drop_initiators = vec![group_initiator];
    if !sandbox.is_empty() {
        if let Ok(main_initiator) = vdb.get_sandbox_initiator(MAIN_CLUSTER, &[]) {
            drop_initiators.push(main_initiator);
        }
    }
    instructions.push(Box::new(DropSubclusterOp::new(
        drop_initiators,
        options.sc_name.clone(),
    )));

    options
        .base
        .engine()
        .run(&mut instructions)
        .await
        .map_err(|e| e.in_op("remove_subcluster"))?;
    Ok(())
}
