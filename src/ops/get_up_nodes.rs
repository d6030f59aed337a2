//! Discover UP hosts classified by sandbox and subcluster

use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::{OpError, Result};
use crate::op::{ClusterOp, OpBase, fan_out};
use crate::vdb::{NodeListResponse, NodeState};
use async_trait::async_trait;
use tracing::{debug, info};

/// Query `/nodes` to learn which hosts are UP and which db-group each one
/// answers to. Fills `up_hosts`, `up_hosts_to_sandboxes`, `up_sc_info`,
/// `compute_hosts` and `nodes_info` on the context.
///
/// Commands that must see every db-group's view (e.g. stopping a subcluster
/// whose sandbox the contacted host cannot see) request a full scan; the
/// default accepts the first passing response.
pub struct GetUpNodesOp {
    base: OpBase,
    full_scan: bool,
    /// When set, the database being entirely down is an allowed outcome
    allow_db_down: bool,
    /// Subcluster whose nodes should land in `sc_nodes_info`
    target_sc: Option<String>,
}

impl GetUpNodesOp {
    pub fn new(hosts: Vec<String>) -> Self {
        GetUpNodesOp {
            base: OpBase::with_hosts("get_up_nodes", hosts),
            full_scan: false,
            allow_db_down: false,
            target_sc: None,
        }
    }

    pub fn full_scan(mut self) -> Self {
        self.full_scan = true;
        self
    }

    pub fn allowing_db_down(mut self) -> Self {
        self.allow_db_down = true;
        self
    }

    pub fn with_target_subcluster(mut self, sc_name: impl Into<String>) -> Self {
        self.target_sc = Some(sc_name.into());
        self
    }

    fn absorb(&self, ctx: &mut ExecContext, response: &NodeListResponse) {
        for node in &response.node_list {
            let state: NodeState = node.state.parse().unwrap_or(NodeState::Unknown);
            match state {
                NodeState::Up => {
                    if !ctx.up_hosts.contains(&node.address) {
                        ctx.up_hosts.push(node.address.clone());
                    }
                    ctx.up_hosts_to_sandboxes
                        .insert(node.address.clone(), node.sandbox_name.clone());
                    let entry = ctx
                        .up_sc_info
                        .entry(node.subcluster_name.clone())
                        .or_default();
                    if !entry.contains(&node.address) {
                        entry.push(node.address.clone());
                    }
                }
                NodeState::Compute => {
                    if !ctx.compute_hosts.contains(&node.address) {
                        ctx.compute_hosts.push(node.address.clone());
                    }
                }
                _ => {}
            }
            if let Some(target) = &self.target_sc {
                if &node.subcluster_name == target
                    && !ctx.sc_nodes_info.iter().any(|n| n.name == node.name)
                {
                    ctx.sc_nodes_info.push(node.clone());
                }
            }
            if !ctx.nodes_info.iter().any(|n| n.name == node.name) {
                ctx.nodes_info.push(node.clone());
            }
        }
    }
}

#[async_trait]
impl ClusterOp for GetUpNodesOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        format!("collect UP nodes from {} host(s)", self.base.hosts.len())
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        self.base
            .register_for_all(|_| HostRequest::https_get("nodes"));
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;
        let mut hosts: Vec<&String> = results.keys().collect();
        hosts.sort();

        let mut any_passed = false;
        for host in hosts {
            let result = &results[host];
            if result.is_unauthorized() {
                return Err(OpError::Unauthorized {
                    host: result.host.clone(),
                });
            }
            if !result.is_passing() {
                debug!("get_up_nodes: no answer from {}", result.host);
                continue;
            }
            let response: NodeListResponse = result.json()?;
            self.absorb(ctx, &response);
            any_passed = true;
            if !self.full_scan {
                break;
            }
        }

        if !any_passed {
            if self.allow_db_down {
                info!("get_up_nodes: no host answered; the database looks down");
                return Ok(());
            }
            return Err(OpError::DbDown(
                "could not reach /nodes on any host".into(),
            ));
        }
        Ok(())
    }
}
