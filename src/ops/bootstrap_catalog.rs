//! Bootstrap the first catalog of a new database

use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::{OpError, Result};
use crate::op::{ClusterOp, OpBase, fan_out};
use async_trait::async_trait;
use serde::Serialize;

/// Parameters of the initial catalog.
#[derive(Debug, Clone, Serialize)]
pub struct BootstrapCatalogRequest {
    pub db_name: String,
    pub catalog_path: String,
    pub storage_locations: Vec<String>,
    pub node_name: String,
    pub communal_storage_location: String,
    pub ipv6: bool,
    pub spread_encryption_enabled: bool,
}

/// `POST /catalog/bootstrap` on the bootstrap host, the first host in the
/// user's input order. Single-initiator by construction.
pub struct BootstrapCatalogOp {
    base: OpBase,
    request: BootstrapCatalogRequest,
}

impl BootstrapCatalogOp {
    pub fn new(bootstrap_host: String, request: BootstrapCatalogRequest) -> Self {
        BootstrapCatalogOp {
            base: OpBase::with_hosts("bootstrap_catalog", vec![bootstrap_host]),
            request,
        }
    }
}

#[async_trait]
impl ClusterOp for BootstrapCatalogOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        format!(
            "bootstrap the catalog of {} on {}",
            self.request.db_name,
            self.base.hosts.first().map(String::as_str).unwrap_or("?")
        )
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        let body = serde_json::to_value(&self.request)?;
        self.base
            .register_for_all(|_| HostRequest::nma_post("catalog/bootstrap", body.clone()));
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;
        let result = results
            .values()
            .next()
            .ok_or_else(|| OpError::Internal("bootstrap_catalog dispatched no request".into()))?;
        if result.is_passing() {
            Ok(())
        } else {
            Err(result.as_error().in_op("bootstrap_catalog"))
        }
    }
}
