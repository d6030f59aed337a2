//! TLS authentication rules for the database user

use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::Result;
use crate::op::{ClusterOp, OpBase, fan_out, first_passing};
use async_trait::async_trait;
use serde_json::json;

/// Default address mask for the auth rule; IPv4 and IPv6 differ.
pub fn default_auth_host_mask(ipv6: bool) -> &'static str {
    if ipv6 { "::/0" } else { "0.0.0.0/0" }
}

/// Create a TLS authentication rule and grant it to the database user:
/// `POST /tls/authentication` then `POST /tls/authentication/{name}/grant`.
/// Catalog-mutating, single initiator.
pub struct CreateTlsAuthOp {
    base: OpBase,
    auth_name: String,
    user: String,
    ipv6: bool,
}

impl CreateTlsAuthOp {
    pub fn new(initiators: Vec<String>, auth_name: impl Into<String>, user: impl Into<String>, ipv6: bool) -> Self {
        CreateTlsAuthOp {
            base: OpBase::with_hosts("create_tls_auth", initiators),
            auth_name: auth_name.into(),
            user: user.into(),
            ipv6,
        }
    }
}

#[async_trait]
impl ClusterOp for CreateTlsAuthOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        format!("create TLS auth rule {} for {}", self.auth_name, self.user)
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        let body = json!({
            "auth_name": self.auth_name,
            "method": "tls",
            "host_mask": default_auth_host_mask(self.ipv6),
        });
        self.base
            .register_for_all(|_| HostRequest::https_post("tls/authentication", body.clone()));
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;
        let passing = first_passing("create_tls_auth", &results)?;

        // grant the rule to the user through the same initiator
        let grant_body = json!({ "user": self.user });
        let mut grant_req = std::collections::HashMap::new();
        grant_req.insert(
            passing.host.clone(),
            HostRequest::https_post(
                format!("tls/authentication/{}/grant", self.auth_name),
                grant_body,
            ),
        );
        let grant_results = ctx.dispatcher.fan_out(grant_req).await;
        first_passing("create_tls_auth", &grant_results)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_mask_differs_by_family() {
        assert_eq!(default_auth_host_mask(false), "0.0.0.0/0");
        assert_eq!(default_auth_host_mask(true), "::/0");
    }
}
