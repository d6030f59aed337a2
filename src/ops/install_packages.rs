//! Install default packages after database creation

use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::Result;
use crate::op::{ClusterOp, OpBase, fan_out, first_passing};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct PackageStatus {
    package_name: String,
    install_status: String,
}

#[derive(Debug, Deserialize)]
struct InstallPackagesResponse {
    #[serde(default)]
    packages: Vec<PackageStatus>,
}

/// `POST /packages` on one initiator. `force_reinstall` refreshes packages
/// already present.
pub struct InstallPackagesOp {
    base: OpBase,
    force_reinstall: bool,
}

impl InstallPackagesOp {
    pub fn new(initiators: Vec<String>, force_reinstall: bool) -> Self {
        InstallPackagesOp {
            base: OpBase::with_hosts("install_packages", initiators),
            force_reinstall,
        }
    }
}

#[async_trait]
impl ClusterOp for InstallPackagesOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        "install default packages".to_string()
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        let body = json!({ "force_install": self.force_reinstall });
        self.base
            .register_for_all(|_| HostRequest::https_post("packages", body.clone()));
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;
        let passing = first_passing("install_packages", &results)?;
        let response: InstallPackagesResponse = passing.json()?;
        for package in &response.packages {
            debug!(
                "install_packages: {} → {}",
                package.package_name, package.install_status
            );
        }
        Ok(())
    }
}
