//! Add nodes to a running database

use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::Result;
use crate::op::{ClusterOp, OpBase, fan_out, first_passing};
use async_trait::async_trait;
use serde::Serialize;

/// Body of `POST /nodes` sent to one UP initiator.
#[derive(Debug, Clone, Serialize)]
pub struct CreateNodeRequest {
    pub db_name: String,
    pub hosts: Vec<String>,
    pub catalog_prefix: String,
    pub data_prefix: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subcluster: Option<String>,
}

/// Register new nodes in the catalog. Catalog-mutating: exactly one
/// initiator per db-group; the caller passes the candidate initiators.
pub struct CreateNodeOp {
    base: OpBase,
    request: CreateNodeRequest,
}

impl CreateNodeOp {
    pub fn new(initiators: Vec<String>, request: CreateNodeRequest) -> Self {
        CreateNodeOp {
            base: OpBase::with_hosts("create_node", initiators),
            request,
        }
    }
}

#[async_trait]
impl ClusterOp for CreateNodeOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        format!(
            "add {} node(s) to database {}",
            self.request.hosts.len(),
            self.request.db_name
        )
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        let body = serde_json::to_value(&self.request)?;
        self.base
            .register_for_all(|_| HostRequest::https_post("nodes", body.clone()));
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;
        first_passing("create_node", &results)?;
        Ok(())
    }
}

/// Detach nodes from the catalog: `POST /nodes/{name}/drop` per node through
/// one UP initiator. Used while emptying a subcluster before dropping it.
pub struct DropNodeOp {
    base: OpBase,
    node_names: Vec<String>,
}

impl DropNodeOp {
    pub fn new(initiator: String, node_names: Vec<String>) -> Self {
        DropNodeOp {
            base: OpBase::with_hosts("drop_node", vec![initiator]),
            node_names,
        }
    }
}

#[async_trait]
impl ClusterOp for DropNodeOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        format!("drop {} node(s) from the catalog", self.node_names.len())
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
            .ok_or_else(|| crate::error::OpError::Internal("drop_node: no initiator host".into()))?;
        for node_name in &self.node_names {
            let mut request = std::collections::HashMap::new();
            request.insert(
                initiator.clone(),
                HostRequest::https_post(format!("nodes/{node_name}/drop"), serde_json::json!({})),
            );
            let results = ctx.dispatcher.fan_out(request).await;
            let result = results
                .get(&initiator)
                .ok_or_else(|| crate::error::OpError::Internal("drop_node: request vanished".into()))?;
            if !result.is_passing() {
                return Err(result.as_error().in_op("drop_node"));
            }
        }
        Ok(())
    }
}
