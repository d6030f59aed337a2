//! Enumerate and save restore points in communal storage

use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::{OpError, Result};
use crate::op::{ClusterOp, OpBase, fan_out, first_passing};
use crate::vdb::RestorePoint;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct RestorePointList {
    restore_points: Vec<RestorePoint>,
}

/// `POST /restore-points/list` on candidate hosts; the matching points land
/// in `ctx.restore_points` for the revive planner to resolve.
pub struct ShowRestorePointsOp {
    base: OpBase,
    db_name: String,
    communal_storage_location: String,
    archive: Option<String>,
}

impl ShowRestorePointsOp {
    pub fn new(
        hosts: Vec<String>,
        db_name: impl Into<String>,
        communal_storage_location: impl Into<String>,
    ) -> Self {
        ShowRestorePointsOp {
            base: OpBase::with_hosts("show_restore_points", hosts),
            db_name: db_name.into(),
            communal_storage_location: communal_storage_location.into(),
            archive: None,
        }
    }

    pub fn filtered_by_archive(mut self, archive: impl Into<String>) -> Self {
        self.archive = Some(archive.into());
        self
    }
}

#[async_trait]
impl ClusterOp for ShowRestorePointsOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        format!("list restore points of {}", self.db_name)
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        let body = json!({
            "db_name": self.db_name,
            "communal_location": self.communal_storage_location,
            "archive": self.archive,
        });
        self.base
            .register_for_all(|_| HostRequest::nma_post("restore-points/list", body.clone()));
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;
        let passing = first_passing("show_restore_points", &results)?;
        let response: RestorePointList = passing.json()?;
        ctx.restore_points = response.restore_points;
        Ok(())
    }
}

/// `POST /restore-points/save` on one initiator, creating a named restore
/// point in an archive.
pub struct SaveRestorePointOp {
    base: OpBase,
    db_name: String,
    archive: String,
    sandbox: Option<String>,
}

impl SaveRestorePointOp {
    pub fn new(initiators: Vec<String>, db_name: impl Into<String>, archive: impl Into<String>) -> Self {
        SaveRestorePointOp {
            base: OpBase::with_hosts("save_restore_point", initiators),
            db_name: db_name.into(),
            archive: archive.into(),
            sandbox: None,
        }
    }

    pub fn in_sandbox(mut self, sandbox: impl Into<String>) -> Self {
        self.sandbox = Some(sandbox.into());
        self
    }
}

#[async_trait]
impl ClusterOp for SaveRestorePointOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        format!("save a restore point to archive {}", self.archive)
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        if self.archive.is_empty() {
            return Err(OpError::Validation(
                "archive name cannot be empty when saving a restore point".into(),
            ));
        }
        let body = json!({
            "db_name": self.db_name,
            "archive": self.archive,
            "sandbox": self.sandbox,
        });
        self.base
            .register_for_all(|_| HostRequest::nma_post("restore-points/save", body.clone()));
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;
        first_passing("save_restore_point", &results)?;
        Ok(())
    }
}
