//! Kick off database replication towards a target cluster

use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::Result;
use crate::op::{ClusterOp, OpBase, fan_out, first_passing};
use async_trait::async_trait;
use serde::Serialize;

/// Parameters of `POST /replicate/start`, sent from one UP source host.
#[derive(Debug, Clone, Serialize)]
pub struct ReplicationStartRequest {
    pub db_name: String,
    pub target_hosts: Vec<String>,
    pub target_db_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_tls_config: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_or_schema_name: Option<String>,
}

pub struct ReplicationStartOp {
    base: OpBase,
    request: ReplicationStartRequest,
}

impl ReplicationStartOp {
    pub fn new(source_initiators: Vec<String>, request: ReplicationStartRequest) -> Self {
        ReplicationStartOp {
            base: OpBase::with_hosts("replication_start", source_initiators),
            request,
        }
    }
}

#[async_trait]
impl ClusterOp for ReplicationStartOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        format!(
            "start replication towards {}",
            self.request.target_db_name
        )
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        let body = serde_json::to_value(&self.request)?;
        self.base
            .register_for_all(|_| HostRequest::nma_post("replicate/start", body.clone()));
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;
        first_passing("replication_start", &results)?;
        Ok(())
    }
}
