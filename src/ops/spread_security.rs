//! Configure spread channel encryption

use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::{OpError, Result};
use crate::op::{ClusterOp, OpBase, fan_out};
use async_trait::async_trait;
use serde_json::json;

/// `POST /catalog/spread-security` on the bootstrap host, setting the spread
/// encryption key before any other node starts.
pub struct SetSpreadSecurityOp {
    base: OpBase,
    catalog_path: String,
}

impl SetSpreadSecurityOp {
    pub fn new(bootstrap_host: String, catalog_path: String) -> Self {
        SetSpreadSecurityOp {
            base: OpBase::with_hosts("set_spread_security", vec![bootstrap_host]),
            catalog_path,
        }
    }
}

#[async_trait]
impl ClusterOp for SetSpreadSecurityOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        "set the spread encryption key".to_string()
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        let body = json!({
            "catalog_path": self.catalog_path,
            "spread_security_details": "vertica",
        });
        self.base
            .register_for_all(|_| HostRequest::nma_post("catalog/spread-security", body.clone()));
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;
        let result = results.values().next().ok_or_else(|| {
            OpError::Internal("set_spread_security dispatched no request".into())
        })?;
        if result.is_passing() {
            Ok(())
        } else {
            Err(result.as_error().in_op("set_spread_security"))
        }
    }
}
