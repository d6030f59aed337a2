//! Cross-host database version check

use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::{OpError, Result};
use crate::op::{ClusterOp, OpBase, fan_out};
use crate::version::DbVersion;
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct VersionResponse {
    vertica_version: String,
}

/// Verify every host runs a co-operating database version.
///
/// By default major versions must match; `same_version_required` tightens
/// this to full string equality (used before joining nodes to a cluster).
pub struct VersionCheckOp {
    base: OpBase,
    same_version_required: bool,
}

impl VersionCheckOp {
    pub fn new(hosts: Vec<String>) -> Self {
        VersionCheckOp {
            base: OpBase::with_hosts("version_check", hosts),
            same_version_required: false,
        }
    }

    pub fn require_equal_versions(mut self) -> Self {
        self.same_version_required = true;
        self
    }
}

#[async_trait]
impl ClusterOp for VersionCheckOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        format!(
            "check database versions on {} host(s)",
            self.base.hosts.len()
        )
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        self.base
            .register_for_all(|_| HostRequest::nma_get("vertica/version"));
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;
        let mut parsed: Vec<(String, DbVersion)> = Vec::new();
        for result in results.values() {
            if !result.is_passing() {
                return Err(result.as_error().in_op("version_check"));
            }
            let response: VersionResponse = result.json()?;
            parsed.push((
                result.host.clone(),
                DbVersion::parse(&response.vertica_version)?,
            ));
        }
        parsed.sort_by(|a, b| a.0.cmp(&b.0));

        let Some((first_host, first_version)) = parsed.first().cloned() else {
            return Ok(());
        };
        for (host, version) in &parsed[1..] {
            let mismatch = if self.same_version_required {
                version != &first_version
            } else {
                !version.is_compatible_with(&first_version)
            };
            if mismatch {
                return Err(OpError::Validation(format!(
                    "version mismatch: host {} runs {:?} but host {} runs {:?}",
                    first_host, first_version.raw, host, version.raw
                )));
            }
        }
        Ok(())
    }
}
