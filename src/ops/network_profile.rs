//! Collect network profiles used for spread configuration

use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::{OpError, Result};
use crate::op::{ClusterOp, OpBase, fan_out};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Network identity of one host as the NMA reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkProfile {
    pub address: String,
    #[serde(default)]
    pub subnet: String,
    #[serde(default)]
    pub netmask: String,
    #[serde(default)]
    pub broadcast: String,
}

/// `GET /network-profiles` on every target host; the profiles feed catalog
/// bootstrap, node creation and re-IP.
pub struct NetworkProfileOp {
    base: OpBase,
}

impl NetworkProfileOp {
    pub fn new(hosts: Vec<String>) -> Self {
        NetworkProfileOp {
            base: OpBase::with_hosts("network_profile", hosts),
        }
    }
}

#[async_trait]
impl ClusterOp for NetworkProfileOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        format!(
            "collect network profiles from {} host(s)",
            self.base.hosts.len()
        )
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        self.base
            .register_for_all(|_| HostRequest::nma_get("network-profiles"));
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;
        let mut causes = Vec::new();
        for result in results.values() {
            if result.is_unauthorized() {
                return Err(OpError::Unauthorized {
                    host: result.host.clone(),
                });
            }
            if !result.is_passing() {
                causes.push(format!("{}: {}", result.host, result.as_error()));
                continue;
            }
            let profile: NetworkProfile = result.json()?;
            ctx.network_profiles.insert(result.host.clone(), profile);
        }
        if causes.is_empty() {
            Ok(())
        } else {
            causes.sort();
            Err(OpError::joined("network_profile", causes))
        }
    }
}
