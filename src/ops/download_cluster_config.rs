//! Download the cluster description file from communal storage

use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::{OpError, Result};
use crate::op::{ClusterOp, OpBase, ResultHandling, ensure_all_passing, fan_out};
use crate::util::{cluster_config_path, parse_db_time};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct DownloadResponse {
    #[serde(default)]
    cluster_lease_expiration: String,
    /// Parsed view of the description file's node list
    #[serde(default)]
    vdatabase: Option<crate::catalog::NmaVDatabase>,
}

/// `POST /files/download` on every new host, pulling
/// `<communal>/metadata/<db>/cluster_config.json` down for revive. The
/// description file carries the cluster lease: a lease expiring in the
/// future means another cluster may still own the communal location.
pub struct DownloadClusterConfigOp {
    base: OpBase,
    db_name: String,
    communal_storage_location: String,
    sandbox: String,
    ignore_cluster_lease: bool,
}

impl DownloadClusterConfigOp {
    pub fn new(
        hosts: Vec<String>,
        db_name: impl Into<String>,
        communal_storage_location: impl Into<String>,
    ) -> Self {
        DownloadClusterConfigOp {
            base: OpBase::with_hosts("download_cluster_config", hosts),
            db_name: db_name.into(),
            communal_storage_location: communal_storage_location.into(),
            sandbox: String::new(),
            ignore_cluster_lease: false,
        }
    }

    pub fn ignoring_cluster_lease(mut self) -> Self {
        self.ignore_cluster_lease = true;
        self
    }
}

#[async_trait]
impl ClusterOp for DownloadClusterConfigOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        format!(
            "download the description file of {} to {} host(s)",
            self.db_name,
            self.base.hosts.len()
        )
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        let source = cluster_config_path(
            &self.communal_storage_location,
            &self.db_name,
            &self.sandbox,
        );
        let body = json!({ "source_file_path": source });
        self.base
            .register_for_all(|_| HostRequest::nma_post("files/download", body.clone()));
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;
        ensure_all_passing("download_cluster_config", &results, ResultHandling::default())?;

        // every host downloaded the same file; one copy suffices
        let Some(result) = results.values().find(|r| r.is_passing()) else {
            return Ok(());
        };
        let response: DownloadResponse = result.json()?;
        if let Some(vdatabase) = response.vdatabase {
            ctx.nma_vdatabase = Some(vdatabase);
        }
        if self.ignore_cluster_lease || response.cluster_lease_expiration.is_empty() {
            return Ok(());
        }
        let expiry = parse_db_time(&response.cluster_lease_expiration)?;
        if expiry > Utc::now() {
            return Err(OpError::ClusterLeaseNotExpired {
                expiry: response.cluster_lease_expiration,
            });
        }
        Ok(())
    }
}
