//! Locate a subcluster and validate it against the command's preconditions

use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::{OpError, Result};
use crate::op::{ClusterOp, OpBase, fan_out, first_passing};
use crate::vdb::SubclusterInfo;
use async_trait::async_trait;
use tracing::{debug, warn};

/// `GET /subclusters/{name}` on candidate hosts. The found description lands
/// in `ctx.target_sc_info` (and `ctx.default_sc_name` when it is the default
/// subcluster).
///
/// Some prechecks look for a subcluster that may legitimately be missing in
/// the contacted db-group; `ignore_not_found` suppresses just that case.
pub struct FindSubclusterOp {
    base: OpBase,
    sc_name: String,
    ignore_not_found: bool,
    /// Stopping a critical subcluster takes the whole db-group down
    reject_critical: bool,
    /// The default subcluster cannot be removed
    reject_default: bool,
}

impl FindSubclusterOp {
    pub fn new(hosts: Vec<String>, sc_name: impl Into<String>) -> Self {
        FindSubclusterOp {
            base: OpBase::with_hosts("find_subcluster", hosts),
            sc_name: sc_name.into(),
            ignore_not_found: false,
            reject_critical: false,
            reject_default: false,
        }
    }

    pub fn ignoring_not_found(mut self) -> Self {
        self.ignore_not_found = true;
        self
    }

    pub fn rejecting_critical(mut self) -> Self {
        self.reject_critical = true;
        self
    }

    pub fn rejecting_default(mut self) -> Self {
        self.reject_default = true;
        self
    }
}

#[async_trait]
impl ClusterOp for FindSubclusterOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        format!("look up subcluster {}", self.sc_name)
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        let endpoint = format!("subclusters/{}", self.sc_name);
        self.base
            .register_for_all(|_| HostRequest::https_get(endpoint.clone()));
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;

        let all_not_found = !results.is_empty()
            && results.values().all(|r| r.is_not_found());
        if all_not_found {
            if self.ignore_not_found {
                warn!(
                    "find_subcluster: subcluster {} not known to the contacted db-group",
                    self.sc_name
                );
                return Ok(());
            }
            let host = results.keys().next().cloned().unwrap_or_default();
            return Err(OpError::NotFound {
                identifier: format!("subcluster {}", self.sc_name),
                host,
            });
        }

        let passing = first_passing("find_subcluster", &results)?;
        let info: SubclusterInfo = passing.json()?;
        debug!(
            "find_subcluster: {} (default={}, critical={}, sandbox={:?})",
            info.subcluster_name, info.is_default, info.is_critical, info.sandbox
        );

        if self.reject_critical && info.is_critical {
            return Err(OpError::Validation(format!(
                "subcluster {} is critical, shutting the subcluster down will cause \
                 the whole database/sandbox shutdown",
                self.sc_name
            )));
        }
        if self.reject_default && info.is_default {
            return Err(OpError::RemoveDefaultSubcluster {
                sc_name: self.sc_name.clone(),
            });
        }
        if info.is_default {
            ctx.default_sc_name = info.subcluster_name.clone();
        }
        ctx.target_sc_info = Some(info);
        Ok(())
    }
}
