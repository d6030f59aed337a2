//! Verify the TLS configuration digest is identical cluster-wide

use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::{OpError, Result};
use crate::op::{ClusterOp, OpBase, fan_out};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Digest of one host's TLS configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfigDigest {
    pub digest: String,
    #[serde(default)]
    pub is_bootstrap: bool,
}

/// `POST /vertica/tls_digest` on every host after a cert rotation. All hosts
/// must return the same digest; on a mismatch the caller's digest holder is
/// left untouched so stale config caches cannot be published.
pub struct TlsDigestOp {
    base: OpBase,
}

impl TlsDigestOp {
    pub fn new(hosts: Vec<String>) -> Self {
        TlsDigestOp {
            base: OpBase::with_hosts("tls_digest", hosts),
        }
    }
}

#[async_trait]
impl ClusterOp for TlsDigestOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        format!(
            "compare TLS config digests across {} host(s)",
            self.base.hosts.len()
        )
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        self.base
            .register_for_all(|_| HostRequest::nma_post("vertica/tls_digest", json!({})));
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;
        let mut digests: Vec<(String, TlsConfigDigest)> = Vec::new();
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
            digests.push((result.host.clone(), result.json()?));
        }
        if !causes.is_empty() {
            causes.sort();
            return Err(OpError::joined("tls_digest", causes));
        }
        digests.sort_by(|a, b| a.0.cmp(&b.0));

        let Some((first_host, first_digest)) = digests.first().cloned() else {
            return Err(OpError::Internal("tls_digest: no host answered".into()));
        };
        for (host, digest) in &digests[1..] {
            if digest.digest != first_digest.digest {
                return Err(OpError::Internal(format!(
                    "TLS config digest mismatch: {} reports {:?} but {} reports {:?}",
                    first_host, first_digest.digest, host, digest.digest
                )));
            }
        }
        // all hosts agree; publish the digest to the caller's holder
        ctx.tls_config_digest = Some(first_digest);
        Ok(())
    }
}
