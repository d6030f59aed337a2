//! Remove catalog directories after unsandbox or node removal

use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::Result;
use crate::op::{ClusterOp, OpBase, ResultHandling, ensure_all_passing, fan_out};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;

/// `POST /directories/delete` with the catalog path of each affected node.
/// A node restarted after unsandboxing must not find its old sandbox catalog.
pub struct DeleteCatalogDirsOp {
    base: OpBase,
    catalog_paths: HashMap<String, String>,
}

impl DeleteCatalogDirsOp {
    pub fn new(catalog_paths: HashMap<String, String>) -> Self {
        let hosts = catalog_paths.keys().cloned().collect();
        DeleteCatalogDirsOp {
            base: OpBase::with_hosts("delete_catalog_dirs", hosts),
            catalog_paths,
        }
    }
}

#[async_trait]
impl ClusterOp for DeleteCatalogDirsOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        format!(
            "delete catalog directories on {} host(s)",
            self.base.hosts.len()
        )
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        for (host, catalog_path) in &self.catalog_paths {
            if !self.base.hosts.contains(host) {
                continue;
            }
            self.base.register(
                host.clone(),
                HostRequest::nma_post(
                    "directories/delete",
                    json!({ "directories": [catalog_path], "sandbox": false }),
                ),
            );
        }
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;
        ensure_all_passing("delete_catalog_dirs", &results, ResultHandling::default())
    }
}
