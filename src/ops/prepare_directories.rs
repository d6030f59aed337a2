//! Prepare catalog, depot and data directories via the NMA

use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::Result;
use crate::op::{ClusterOp, OpBase, ResultHandling, ensure_all_passing, fan_out};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use tracing::warn;

/// Directory layout for one host.
#[derive(Debug, Clone, Serialize)]
pub struct HostDirectories {
    pub catalog_path: String,
    pub depot_path: String,
    pub storage_locations: Vec<String>,
    pub user_storage_locations: Vec<String>,
}

#[derive(Debug, Serialize)]
struct PrepareDirectoriesBody {
    catalog_path: String,
    depot_path: String,
    storage_locations: Vec<String>,
    user_storage_locations: Vec<String>,
    force_cleanup: bool,
    for_revive: bool,
    ignore_parent: bool,
}

/// `POST /directories/prepare` on every host. `force_cleanup` only removes
/// non-user directories; user storage location failures are warned about but
/// never fail a revive.
pub struct PrepareDirectoriesOp {
    base: OpBase,
    layouts: HashMap<String, HostDirectories>,
    force_cleanup: bool,
    for_revive: bool,
}

impl PrepareDirectoriesOp {
    pub fn new(layouts: HashMap<String, HostDirectories>, force_cleanup: bool) -> Self {
        let hosts = layouts.keys().cloned().collect();
        PrepareDirectoriesOp {
            base: OpBase::with_hosts("prepare_directories", hosts),
            layouts,
            force_cleanup,
            for_revive: false,
        }
    }

    pub fn for_revive(mut self) -> Self {
        self.for_revive = true;
        self
    }
}

#[async_trait]
impl ClusterOp for PrepareDirectoriesOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        format!(
            "prepare database directories on {} host(s)",
            self.base.hosts.len()
        )
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        for (host, layout) in &self.layouts {
            if !self.base.hosts.contains(host) {
                continue;
            }
            let user_storage_locations = layout.user_storage_locations.clone();
            if self.for_revive && !user_storage_locations.is_empty() {
                warn!(
                    "prepare_directories: user storage locations on {host} are created \
                     best-effort during revive"
                );
            }
            let body = PrepareDirectoriesBody {
                catalog_path: layout.catalog_path.clone(),
                depot_path: layout.depot_path.clone(),
                storage_locations: layout.storage_locations.clone(),
                user_storage_locations,
                force_cleanup: self.force_cleanup,
                for_revive: self.for_revive,
                ignore_parent: false,
            };
            self.base.register(
                host.clone(),
                HostRequest::nma_post("directories/prepare", serde_json::to_value(&body)?),
            );
        }
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;
        ensure_all_passing("prepare_directories", &results, ResultHandling::default())
    }
}
