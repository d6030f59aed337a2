//! Transfer database configuration from the bootstrap node to workers

use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::{OpError, Result};
use crate::op::{ClusterOp, OpBase, ResultHandling, ensure_all_passing};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

const CONFIG_TYPES: [&str; 2] = ["vertica", "spread"];

#[derive(Debug, Deserialize)]
struct ConfigContent {
    content: String,
}

/// Read `config/vertica` and `config/spread` from the source host and write
/// both onto every worker. Workers cannot join spread without them.
pub struct StageConfigFilesOp {
    base: OpBase,
    source_host: String,
    catalog_path: String,
}

impl StageConfigFilesOp {
    pub fn new(source_host: String, workers: Vec<String>, catalog_path: String) -> Self {
        StageConfigFilesOp {
            base: OpBase::with_hosts("stage_config_files", workers),
            source_host,
            catalog_path,
        }
    }
}

#[async_trait]
impl ClusterOp for StageConfigFilesOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        format!(
            "stage configuration from {} onto {} worker(s)",
            self.source_host,
            self.base.hosts.len()
        )
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        if self.base.hosts.is_empty() {
            self.base.skip_execute = true;
        }
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        for config_type in CONFIG_TYPES {
            // read from the source
            let mut read_req = HashMap::new();
            read_req.insert(
                self.source_host.clone(),
                HostRequest::nma_get("vertica/config")
                    .with_query("config_type", config_type)
                    .with_query("catalog_path", self.catalog_path.clone()),
            );
            let read_results = ctx.dispatcher.fan_out(read_req).await;
            let source = read_results.get(&self.source_host).ok_or_else(|| {
                OpError::Internal("stage_config_files: source request vanished".into())
            })?;
            if !source.is_passing() {
                return Err(source.as_error().in_op("stage_config_files"));
            }
            let config: ConfigContent = source.json()?;

            // write onto every worker
            let body = json!({
                "config_type": config_type,
                "catalog_path": self.catalog_path,
                "content": config.content,
            });
            let mut write_reqs = HashMap::new();
            for worker in &self.base.hosts {
                write_reqs.insert(
                    worker.clone(),
                    HostRequest::nma_post("vertica/config", body.clone()),
                );
            }
            let write_results = ctx.dispatcher.fan_out(write_reqs).await;
            ensure_all_passing(
                "stage_config_files",
                &write_results,
                ResultHandling::default(),
            )?;
        }
        Ok(())
    }
}
