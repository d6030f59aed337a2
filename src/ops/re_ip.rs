//! Rewrite node addresses in the catalog

use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::{OpError, Result};
use crate::op::{ClusterOp, OpBase};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use tracing::info;

/// One node whose catalog address went stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReIpPair {
    pub node_name: String,
    pub new_address: String,
}

/// `PUT /nodes/{node_name}/ip` on one primary UP host, once per stale node.
/// The node keeps its identity; only the address changes.
pub struct ReIpOp {
    base: OpBase,
    pairs: Vec<ReIpPair>,
    reload_spread: bool,
}

impl ReIpOp {
    pub fn new(initiator: String, pairs: Vec<ReIpPair>, reload_spread: bool) -> Self {
        ReIpOp {
            base: OpBase::with_hosts("re_ip", vec![initiator]),
            pairs,
            reload_spread,
        }
    }
}

#[async_trait]
impl ClusterOp for ReIpOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        format!("re-ip {} node(s)", self.pairs.len())
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        if self.pairs.is_empty() {
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
            .ok_or_else(|| OpError::Internal("re_ip: no initiator host".into()))?;

        // one catalog edit per stale node, through the same initiator
        for pair in &self.pairs {
            let mut request = HashMap::new();
            request.insert(
                initiator.clone(),
                HostRequest::https_put(
                    format!("nodes/{}/ip", pair.node_name),
                    json!({ "host": pair.new_address }),
                ),
            );
            let results = ctx.dispatcher.fan_out(request).await;
            let result = results.get(&initiator).ok_or_else(|| {
                OpError::Internal("re_ip: request vanished".into())
            })?;
            if !result.is_passing() {
                return Err(result.as_error().in_op("re_ip"));
            }
            info!("re_ip: {} now at {}", pair.node_name, pair.new_address);
        }

        if self.reload_spread {
            let mut request = HashMap::new();
            request.insert(
                initiator.clone(),
                HostRequest::https_post("config/spread/reload", json!({})),
            );
            let results = ctx.dispatcher.fan_out(request).await;
            let result = results.get(&initiator).ok_or_else(|| {
                OpError::Internal("re_ip: spread reload request vanished".into())
            })?;
            if !result.is_passing() {
                return Err(result.as_error().in_op("re_ip"));
            }
        }
        Ok(())
    }
}
