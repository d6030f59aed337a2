//! Rotate the certificates of the database HTTPS service

use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::{OpError, Result};
use crate::op::{ClusterOp, OpBase, fan_out};
use async_trait::async_trait;
use serde::Serialize;

/// New certificate material for the rotation.
#[derive(Debug, Clone, Serialize)]
pub struct RotateCertsRequest {
    pub key_secret_name: String,
    pub cert_secret_name: String,
    pub ca_cert_secret_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_mode: Option<String>,
}

/// `POST /vertica/tls/rotate-certs`, globally scoped: exactly one initiator
/// per sandbox plus one in the main cluster, and all of them must succeed.
pub struct RotateHttpsCertsOp {
    base: OpBase,
    request: RotateCertsRequest,
}

impl RotateHttpsCertsOp {
    pub fn new(db_group_initiators: Vec<String>, request: RotateCertsRequest) -> Self {
        RotateHttpsCertsOp {
            base: OpBase::with_hosts("rotate_https_certs", db_group_initiators),
            request,
        }
    }
}

#[async_trait]
impl ClusterOp for RotateHttpsCertsOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        format!(
            "rotate HTTPS certificates via {} db-group initiator(s)",
            self.base.hosts.len()
        )
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        let body = serde_json::to_value(&self.request)?;
        self.base
            .register_for_all(|_| HostRequest::nma_post("vertica/tls/rotate-certs", body.clone()));
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
            if !result.is_passing() {
                causes.push(format!("{}: {}", result.host, result.as_error()));
            }
        }
        if causes.is_empty() {
            Ok(())
        } else {
            causes.sort();
            Err(OpError::joined("rotate_https_certs", causes))
        }
    }
}
