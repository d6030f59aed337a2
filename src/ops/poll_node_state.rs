//! Wait for nodes to come up or go down

use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::Result;
use crate::op::{ClusterOp, OpBase, fan_out};
use crate::poller::{
    PollingOp, STARTUP_POLLING_TIMEOUT_SECONDS, STOP_POLLING_TIMEOUT_SECONDS, drive_polling,
};
use crate::vdb::{NodeListResponse, NodeState};
use async_trait::async_trait;
use std::collections::HashSet;
use tracing::debug;

/// What the poller waits for.
#[derive(Debug, Clone)]
pub enum NodeStateTarget {
    /// Every polled host reports its own node UP
    Up,
    /// No node of the subcluster is still UP, judged from a checker host
    DownForSubcluster { sc_name: String },
}

/// Poll `/nodes` until the target state holds or the budget runs out.
///
/// Waiting for UP asks each host about itself: a 412 means the node has not
/// joined yet and simply keeps the poller going. Waiting for DOWN asks an UP
/// host of the same db-group about the subcluster's nodes.
pub struct PollNodeStateOp {
    base: OpBase,
    target: NodeStateTarget,
    timeout_seconds: i64,
    pending: HashSet<String>,
    satisfied: bool,
}

impl PollNodeStateOp {
    pub fn wait_for_up(hosts: Vec<String>) -> Self {
        let pending = hosts.iter().cloned().collect();
        PollNodeStateOp {
            base: OpBase::with_hosts("poll_node_state", hosts),
            target: NodeStateTarget::Up,
            timeout_seconds: STARTUP_POLLING_TIMEOUT_SECONDS,
            pending,
            satisfied: false,
        }
    }

    pub fn wait_for_subcluster_down(checker_host: String, sc_name: impl Into<String>) -> Self {
        PollNodeStateOp {
            base: OpBase::with_hosts("poll_node_state", vec![checker_host]),
            target: NodeStateTarget::DownForSubcluster {
                sc_name: sc_name.into(),
            },
            timeout_seconds: STOP_POLLING_TIMEOUT_SECONDS,
            pending: HashSet::new(),
            satisfied: false,
        }
    }

    pub fn with_timeout(mut self, seconds: i64) -> Self {
        self.timeout_seconds = seconds;
        self
    }
}

#[async_trait]
impl ClusterOp for PollNodeStateOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        match &self.target {
            NodeStateTarget::Up => {
                format!("wait for {} node(s) to come up", self.base.hosts.len())
            }
            NodeStateTarget::DownForSubcluster { sc_name } => {
                format!("wait for subcluster {sc_name} to go down")
            }
        }
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        if self.base.hosts.is_empty() {
            self.base.skip_execute = true;
        }
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let name = self.base.name;
        drive_polling(name, self, ctx).await
    }
}

#[async_trait]
impl PollingOp for PollNodeStateOp {
    fn polling_timeout(&self) -> i64 {
        self.timeout_seconds
    }

    async fn run_execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        match self.target.clone() {
            NodeStateTarget::Up => {
                for host in self.pending.clone() {
                    self.base.register(host, HostRequest::https_get("nodes"));
                }
                let results = fan_out(&mut self.base, ctx).await;
                for result in results.values() {
                    if !result.is_passing() {
                        continue;
                    }
                    let Ok(response) = result.json::<NodeListResponse>() else {
                        continue;
                    };
                    let own_node_up = response.node_list.iter().any(|n| {
                        n.address == result.host
                            && n.state.parse::<NodeState>().unwrap_or(NodeState::Unknown)
                                == NodeState::Up
                    });
                    if own_node_up {
                        debug!("poll_node_state: {} is UP", result.host);
                        self.pending.remove(&result.host);
                    }
                }
                self.satisfied = self.pending.is_empty();
            }
            NodeStateTarget::DownForSubcluster { sc_name } => {
                self.base
                    .register_for_all(|_| HostRequest::https_get("nodes"));
                let results = fan_out(&mut self.base, ctx).await;
                let mut any_answer = false;
                let mut still_up = false;
                for result in results.values() {
                    if !result.is_passing() {
                        continue;
                    }
                    let Ok(response) = result.json::<NodeListResponse>() else {
                        continue;
                    };
                    any_answer = true;
                    still_up |= response.node_list.iter().any(|n| {
                        n.subcluster_name == sc_name
                            && n.state.parse::<NodeState>().unwrap_or(NodeState::Unknown)
                                == NodeState::Up
                    });
                }
                self.satisfied = any_answer && !still_up;
            }
        }
        Ok(())
    }

    fn should_stop_polling(&mut self) -> Result<bool> {
        Ok(self.satisfied)
    }
}
