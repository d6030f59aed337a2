//! Shut down a database or one of its db-groups

use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::{OpError, Result};
use crate::op::{ClusterOp, OpBase, fan_out};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct ShutdownResponse {
    #[serde(default)]
    detail: String,
}

/// Accepted response grammar of `POST /cluster/shutdown`.
///
/// `Shutdown: moveout complete` comes from enterprise mode,
/// `Shutdown: sync complete` from Eon without draining, and
/// `Set subcluster (<name>) to draining state …` when a drain timeout was
/// given. `context deadline exceeded` means the moveout ran past the drain
/// budget; the hint points at the NMA kill endpoint, never called here.
pub fn interpret_shutdown_detail(detail: &str) -> Result<()> {
    let detail = detail.trim();
    if detail.contains("context deadline exceeded") {
        return Err(OpError::Internal(
            "the shutdown timed out draining; use the NMA endpoint \
             /vertica-process/signal?signal_type=kill to force it down"
                .into(),
        ));
    }
    if detail.starts_with("Shutdown: moveout complete")
        || detail.starts_with("Shutdown: sync complete")
        || detail.starts_with("Set subcluster (")
    {
        return Ok(());
    }
    Err(OpError::Parse(format!(
        "unexpected shutdown response: {detail:?}"
    )))
}

/// Send the shutdown to one UP host per targeted db-group. EOF is expected:
/// the server goes away mid-response.
pub struct ShutdownClusterOp {
    base: OpBase,
    /// Seconds the database may spend draining clients; None = no drain
    drain_seconds: Option<u64>,
}

impl ShutdownClusterOp {
    pub fn new(initiators: Vec<String>, drain_seconds: Option<u64>) -> Self {
        ShutdownClusterOp {
            base: OpBase::with_hosts("shutdown_cluster", initiators),
            drain_seconds,
        }
    }
}

#[async_trait]
impl ClusterOp for ShutdownClusterOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        format!(
            "shut down the database via {} initiator(s)",
            self.base.hosts.len()
        )
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        let drain = self.drain_seconds;
        self.base.register_for_all(|_| {
            let mut request = HostRequest::https_post("cluster/shutdown", json!({}));
            if let Some(seconds) = drain {
                request = request.with_query("timeout", seconds.to_string());
            }
            request
        });
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;
        let mut causes = Vec::new();
        for result in results.values() {
            if result.is_unauthorized() {
                return Err(OpError::Unauthorized {
                    host: result.host.clone(),
                });
            }
            if result.is_eof() {
                debug!(
                    "shutdown_cluster: {} closed the connection while going down",
                    result.host
                );
                continue;
            }
            if !result.is_passing() {
                causes.push(format!("{}: {}", result.host, result.as_error()));
                continue;
            }
            let response: ShutdownResponse = result.json().unwrap_or(ShutdownResponse {
                detail: result.body.clone(),
            });
            match interpret_shutdown_detail(&response.detail) {
                Ok(()) => info!("shutdown_cluster: {} acknowledged: {}", result.host, response.detail),
                Err(e) => causes.push(format!("{}: {}", result.host, e)),
            }
        }
        if causes.is_empty() {
            Ok(())
        } else {
            causes.sort();
            Err(OpError::joined("shutdown_cluster", causes))
        }
    }
}

/// Stop individual nodes without taking their db-group down:
/// `POST /nodes/{name}/shutdown` per node, through one UP initiator of the
/// same db-group.
pub struct StopNodeOp {
    base: OpBase,
    node_names: Vec<String>,
}

impl StopNodeOp {
    pub fn new(initiator: String, node_names: Vec<String>) -> Self {
        StopNodeOp {
            base: OpBase::with_hosts("stop_node", vec![initiator]),
            node_names,
        }
    }
}

#[async_trait]
impl ClusterOp for StopNodeOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        format!("stop {} node(s)", self.node_names.len())
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        if self.node_names.is_empty() {
            self.base.skip_execute = true;
        }
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let initiator = self
            .base
            .hosts
            .first()
            .cloned()
            .ok_or_else(|| OpError::Internal("stop_node: no initiator host".into()))?;
        for node_name in &self.node_names {
            let mut request = std::collections::HashMap::new();
            request.insert(
                initiator.clone(),
                HostRequest::https_post(format!("nodes/{node_name}/shutdown"), json!({})),
            );
            let results = ctx.dispatcher.fan_out(request).await;
            let result = results
                .get(&initiator)
                .ok_or_else(|| OpError::Internal("stop_node: request vanished".into()))?;
            if !result.is_passing() && !result.is_eof() {
                return Err(result.as_error().in_op("stop_node"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_grammar() {
        assert!(interpret_shutdown_detail("Shutdown: moveout complete").is_ok());
        assert!(interpret_shutdown_detail("Shutdown: sync complete").is_ok());
        assert!(
            interpret_shutdown_detail("Set subcluster (sc1) to draining state before shutdown")
                .is_ok()
        );
        let hint = interpret_shutdown_detail("Error: context deadline exceeded").unwrap_err();
        assert!(hint.to_string().contains("signal_type=kill"));
        assert!(interpret_shutdown_detail("something else").is_err());
    }
}
