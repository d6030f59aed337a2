//! Read the on-disk catalog editor through the NMA

use crate::catalog::{NmaVDatabase, hosts_with_latest_catalog};
use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::{OpError, Result};
use crate::op::{ClusterOp, OpBase, fan_out};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// `GET /catalog/database?catalog_path=…` on a set of hosts. The hosts tied
/// for the maximum `versions.global` become `hosts_with_latest_catalog`; the
/// primary subset seeds the initiator list for later catalog mutations. The
/// winning snapshot lands in `ctx.nma_vdatabase`.
pub struct ReadCatalogEditorOp {
    base: OpBase,
    catalog_paths: HashMap<String, String>,
    /// Secondary nodes may have no catalog yet right after a revive
    ignore_missing_catalog: bool,
}

impl ReadCatalogEditorOp {
    pub fn new(catalog_paths: HashMap<String, String>) -> Self {
        let hosts = catalog_paths.keys().cloned().collect();
        ReadCatalogEditorOp {
            base: OpBase::with_hosts("read_catalog_editor", hosts),
            catalog_paths,
            ignore_missing_catalog: false,
        }
    }

    /// "empty/not-exist" answers are dropped instead of failing the op,
    /// used when starting a database right after revive.
    pub fn ignoring_missing_catalog(mut self) -> Self {
        self.ignore_missing_catalog = true;
        self
    }
}

#[async_trait]
impl ClusterOp for ReadCatalogEditorOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        format!(
            "read the catalog editor on {} host(s)",
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
                HostRequest::nma_get("catalog/database")
                    .with_query("catalog_path", catalog_path.clone()),
            );
        }
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;
        let mut editors: BTreeMap<String, NmaVDatabase> = BTreeMap::new();
        let mut causes = Vec::new();
        for result in results.values() {
            if result.is_unauthorized() {
                return Err(OpError::Unauthorized {
                    host: result.host.clone(),
                });
            }
            if !result.is_passing() {
                let detail = result.error_detail();
                let missing = detail.contains("empty") || detail.contains("not exist");
                if self.ignore_missing_catalog && missing {
                    debug!(
                        "read_catalog_editor: no catalog on {} yet, ignoring",
                        result.host
                    );
                    continue;
                }
                causes.push(format!("{}: {}", result.host, result.as_error()));
                continue;
            }
            editors.insert(result.host.clone(), result.json()?);
        }
        if !causes.is_empty() {
            causes.sort();
            return Err(OpError::joined("read_catalog_editor", causes));
        }
        if editors.is_empty() {
            return Err(OpError::Internal(
                "read_catalog_editor: no host returned a catalog".into(),
            ));
        }

        let (all, primary) = hosts_with_latest_catalog(&editors);
        let best_host = all.first().cloned().ok_or_else(|| {
            OpError::Internal("read_catalog_editor: no latest-catalog host".into())
        })?;
        ctx.nma_vdatabase = editors.remove(&best_host);
        ctx.hosts_with_latest_catalog = all;
        ctx.primary_hosts_with_latest_catalog = primary;
        Ok(())
    }
}
