//! Start database processes through the NMA

use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::{OpError, Result};
use crate::op::{ClusterOp, OpBase, ResultHandling, ensure_all_passing, fan_out};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;

/// `POST /vertica-process/start` on each target host. Start commands come
/// from `ctx.startup_commands` (fetched from an UP node) unless the caller
/// supplies them, as when starting the very first node of a new database.
pub struct StartNodeOp {
    base: OpBase,
    /// host → node name, used to look commands up on the context
    node_names: HashMap<String, String>,
    explicit_commands: HashMap<String, Vec<String>>,
}

impl StartNodeOp {
    pub fn new(node_names: HashMap<String, String>) -> Self {
        let hosts = node_names.keys().cloned().collect();
        StartNodeOp {
            base: OpBase::with_hosts("start_node", hosts),
            node_names,
            explicit_commands: HashMap::new(),
        }
    }

    /// Start a bootstrap node whose catalog was just written; no UP node
    /// exists yet to ask for a start command.
    pub fn for_bootstrap(host: String, node_name: String, catalog_path: String) -> Self {
        let command = vec![
            "/opt/vertica/bin/vertica".to_string(),
            "-D".to_string(),
            catalog_path,
        ];
        let mut node_names = HashMap::new();
        node_names.insert(host.clone(), node_name);
        let mut explicit_commands = HashMap::new();
        explicit_commands.insert(host.clone(), command);
        StartNodeOp {
            base: OpBase::with_hosts("start_node", vec![host]),
            node_names,
            explicit_commands,
        }
    }
}

#[async_trait]
impl ClusterOp for StartNodeOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        format!("start database processes on {} host(s)", self.base.hosts.len())
    }

    async fn prepare(&mut self, ctx: &mut ExecContext) -> Result<()> {
        for host in self.base.hosts.clone() {
            let node_name = self.node_names.get(&host).cloned().ok_or_else(|| {
                OpError::Internal(format!("start_node: no node name for host {host}"))
            })?;
            let command = match self.explicit_commands.get(&host) {
                Some(cmd) => cmd.clone(),
                None => ctx
                    .startup_commands
                    .get(&node_name)
                    .cloned()
                    .ok_or_else(|| {
                        OpError::Internal(format!(
                            "start_node: no startup command known for node {node_name}"
                        ))
                    })?,
            };
            self.base.register(
                host,
                HostRequest::nma_post(
                    "vertica-process/start",
                    json!({ "start_command": command }),
                ),
            );
        }
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;
        ensure_all_passing("start_node", &results, ResultHandling::default())
    }
}
