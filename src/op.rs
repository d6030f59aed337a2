//! The cluster operation contract
//!
//! An operation is a named unit that fans a typed request out to a set of
//! hosts, validates the per-host responses and commits aggregated state to
//! the shared [`ExecContext`]. Operations are built by workflow composers and
//! consumed exactly once by the engine. Structural shapes: per-host fanout,
//! single-initiator, poller, composite.

use crate::context::ExecContext;
use crate::dispatcher::{HostRequest, HostResult, TlsOptions};
use crate::error::{OpError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

/// Common capability holder embedded by every operation.
#[derive(Debug, Default)]
pub struct OpBase {
    pub name: &'static str,
    /// Effective host set, possibly shrunk by the engine's filters
    pub hosts: Vec<String>,
    /// Set during prepare when runtime findings make the op a no-op
    pub skip_execute: bool,
    /// Health probes opt in to dropping hosts already known unreachable
    pub skip_unreachable: bool,
    requests: HashMap<String, HostRequest>,
}

impl OpBase {
    pub fn new(name: &'static str) -> Self {
        OpBase {
            name,
            ..OpBase::default()
        }
    }

    pub fn with_hosts(name: &'static str, hosts: Vec<String>) -> Self {
        OpBase {
            name,
            hosts,
            ..OpBase::default()
        }
    }

    /// Register the request to send to one host.
    pub fn register(&mut self, host: impl Into<String>, request: HostRequest) {
        self.requests.insert(host.into(), request);
    }

    /// Register one request per effective host.
    pub fn register_for_all(&mut self, make: impl Fn(&str) -> HostRequest) {
        for host in self.hosts.clone() {
            let request = make(&host);
            self.requests.insert(host, request);
        }
    }

    pub fn take_requests(&mut self) -> HashMap<String, HostRequest> {
        std::mem::take(&mut self.requests)
    }

    pub fn drop_hosts(&mut self, gone: &[String]) {
        self.hosts.retain(|h| !gone.contains(h));
        self.requests.retain(|h, _| !gone.contains(h));
    }
}

/// A unit of work executed by the engine.
#[async_trait]
pub trait ClusterOp: Send {
    fn base(&self) -> &OpBase;
    fn base_mut(&mut self) -> &mut OpBase;

    /// Stable name used in logs and errors.
    fn name(&self) -> &'static str {
        self.base().name
    }

    fn description(&self) -> String;

    /// Drop hosts the run has already found unreachable, when the op opts in.
    fn filter_unreachable_hosts(&mut self, ctx: &ExecContext) {
        if self.base().skip_unreachable {
            let unreachable = ctx.unreachable_hosts.clone();
            self.base_mut().drop_hosts(&unreachable);
        }
    }

    /// Shrink the host set to the run's target sandbox. Operation-specific;
    /// the default keeps the host set untouched.
    fn filter_hosts_by_sandbox(&mut self, _ctx: &ExecContext) {}

    /// Certificate material applied right before execute. Most operations
    /// inherit the run's dispatcher and have nothing to do here.
    fn apply_tls_options(&mut self, _tls: &TlsOptions) -> Result<()> {
        Ok(())
    }

    /// Pick the effective host set, build per-host request bodies and
    /// register them. May set `skip_execute`.
    async fn prepare(&mut self, ctx: &mut ExecContext) -> Result<()>;

    /// Dispatch registered requests and process per-host results.
    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()>;

    /// Release resources; commit aggregated state to the context. Called
    /// even when execute fails.
    async fn finalize(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        Ok(())
    }

    fn skip_execute(&self) -> bool {
        self.base().skip_execute
    }
}

/// How an operation treats non-passing per-host results.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultHandling {
    /// 5xx responses are dropped instead of joined (e.g. scrutinize)
    pub ignore_internal_errors: bool,
    /// EOF is expected and benign (shutdown ops)
    pub allow_eof: bool,
    /// 412 marks an exception host instead of failing the op
    pub allow_precondition_failed: bool,
}

/// Dispatch the registered requests and record transport failures as
/// unreachable hosts on the context.
pub async fn fan_out(base: &mut OpBase, ctx: &mut ExecContext) -> HashMap<String, HostResult> {
    let requests = base.take_requests();
    debug!("{}: dispatching to {} host(s)", base.name, requests.len());
    let results = ctx.dispatcher.fan_out(requests).await;
    for result in results.values() {
        if result.is_transport_failure()
            && !result.is_eof()
            && !ctx.unreachable_hosts.contains(&result.host)
        {
            ctx.unreachable_hosts.push(result.host.clone());
        }
    }
    results
}

/// Per-host fanout write pattern: every host must pass or the failures are
/// joined into one aggregated error. A 401 on any host aborts immediately.
pub fn ensure_all_passing(
    op: &'static str,
    results: &HashMap<String, HostResult>,
    handling: ResultHandling,
) -> Result<()> {
    let mut causes = Vec::new();
    for result in results.values() {
        if result.is_passing() {
            continue;
        }
        if result.is_unauthorized() {
            return Err(OpError::Unauthorized {
                host: result.host.clone(),
            });
        }
        if handling.allow_eof && result.is_eof() {
            continue;
        }
        if handling.ignore_internal_errors && result.is_internal_error() {
            debug!(
                "{op}: ignoring internal error from {}: {}",
                result.host,
                result.error_detail()
            );
            continue;
        }
        if handling.allow_precondition_failed && result.is_precondition_failed() {
            debug!("{op}: host {} not yet joined", result.host);
            continue;
        }
        causes.push(format!("{}: {}", result.host, result.as_error()));
    }
    if causes.is_empty() {
        Ok(())
    } else {
        causes.sort();
        Err(OpError::joined(op, causes))
    }
}

/// Cluster state query pattern: accept the first passing response; when none
/// passes, join the errors. A 401 still aborts immediately.
pub fn first_passing<'a>(
    op: &'static str,
    results: &'a HashMap<String, HostResult>,
) -> Result<&'a HostResult> {
    let mut causes = Vec::new();
    for result in results.values() {
        if result.is_passing() {
            return Ok(result);
        }
        if result.is_unauthorized() {
            return Err(OpError::Unauthorized {
                host: result.host.clone(),
            });
        }
        causes.push(format!("{}: {}", result.host, result.as_error()));
    }
    causes.sort();
    Err(OpError::joined(op, causes))
}
