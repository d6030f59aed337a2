//! Reconcile stale catalog addresses

use super::{DatabaseOptions, fetch};
use crate::error::Result;
use crate::op::ClusterOp;
use crate::ops::network_profile::NetworkProfileOp;
use crate::ops::re_ip::{ReIpOp, ReIpPair};
use std::collections::BTreeMap;
use tracing::info;

/// Rewrite catalog addresses that no longer match where the nodes actually
/// run. Used whenever pods were replaced under a subcluster: sandbox and
/// unsandbox across restarts, removing a subcluster whose pods moved, online
/// upgrades.
///
/// Fetches the current catalog view through `primary_up_host`, diffs it
/// against `new_addresses` (node name → address), collects the mismatches,
/// refreshes network profiles on the new addresses and applies one re-IP per
/// stale node. Returns how many nodes were rewritten.
pub async fn re_ip(
    options: &DatabaseOptions,
    primary_up_host: &str,
    new_addresses: &BTreeMap<String, String>,
    reload_spread: bool,
) -> Result<usize> {
    let vdb = fetch::fetch_vdb(options, &[primary_up_host.to_string()]).await?;

    let mut pairs: Vec<ReIpPair> = vdb
        .host_node_map
        .values()
        .filter_map(|node| {
            new_addresses
                .get(&node.name)
                .filter(|address| **address != node.address)
                .map(|address| ReIpPair {
                    node_name: node.name.clone(),
                    new_address: address.clone(),
                })
        })
        .collect();
    pairs.sort_by(|a, b| a.node_name.cmp(&b.node_name));

    if pairs.is_empty() {
        info!("re_ip: catalog addresses already match");
        return Ok(0);
    }

    let new_hosts: Vec<String> = pairs.iter().map(|p| p.new_address.clone()).collect();
    let count = pairs.len();
    let mut instructions: Vec<Box<dyn ClusterOp>> = vec![
        Box::new(NetworkProfileOp::new(new_hosts)),
        Box::new(ReIpOp::new(primary_up_host.to_string(), pairs, reload_spread)),
    ];
    options
        .engine()
        .run(&mut instructions)
        .await
        .map_err(|e| e.in_op("re_ip"))?;
    Ok(count)
}
