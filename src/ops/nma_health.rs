//! NMA health probes

use crate::context::ExecContext;
use crate::dispatcher::{Dispatcher, HostRequest, TlsOptions};
use crate::error::{OpError, Result};
use crate::op::{ClusterOp, OpBase, ResultHandling, ensure_all_passing, fan_out};
use crate::poller::{PollingOp, STARTUP_POLLING_TIMEOUT_SECONDS, drive_polling};
use async_trait::async_trait;
use tracing::warn;

/// Probe the node management agent on every host.
///
/// In strict mode every probed host must respond. Health checks that open a
/// command may instead downgrade to skip-unreachable mode: hosts that fail
/// the probe are recorded on the context and later operations drop them.
pub struct NmaHealthOp {
    base: OpBase,
    strict: bool,
}

impl NmaHealthOp {
    pub fn new(hosts: Vec<String>) -> Self {
        NmaHealthOp {
            base: OpBase::with_hosts("nma_health", hosts),
            strict: true,
        }
    }

    /// Unreachable hosts become warnings instead of failures.
    pub fn skipping_unreachable(hosts: Vec<String>) -> Self {
        NmaHealthOp {
            base: OpBase::with_hosts("nma_health", hosts),
            strict: false,
        }
    }
}

#[async_trait]
impl ClusterOp for NmaHealthOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        format!("probe the NMA on {} host(s)", self.base.hosts.len())
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        self.base
            .register_for_all(|_| HostRequest::nma_get("health"));
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;
        if self.strict {
            ensure_all_passing("nma_health", &results, ResultHandling::default())
        } else {
            for result in results.values() {
                if !result.is_passing() {
                    warn!(
                        "nma_health: skipping unreachable host {}: {}",
                        result.host,
                        result.as_error()
                    );
                }
            }
            Ok(())
        }
    }
}

/// Poll NMA health until every host answers, optionally through a dispatcher
/// built from fresh certificates. A passing round through the new TLS
/// material is the signal that an NMA cert rotation took effect.
pub struct PollNmaHealthOp {
    base: OpBase,
    timeout_seconds: i64,
    new_tls: Option<TlsOptions>,
    own_dispatcher: Option<Dispatcher>,
    all_passing: bool,
}

impl PollNmaHealthOp {
    pub fn new(hosts: Vec<String>) -> Self {
        PollNmaHealthOp {
            base: OpBase::with_hosts("poll_nma_health", hosts),
            timeout_seconds: STARTUP_POLLING_TIMEOUT_SECONDS,
            new_tls: None,
            own_dispatcher: None,
            all_passing: false,
        }
    }

    /// Probe with certificates that differ from the run's own.
    pub fn with_new_tls(mut self, tls: TlsOptions) -> Self {
        self.new_tls = Some(tls);
        self
    }

    pub fn with_timeout(mut self, seconds: i64) -> Self {
        self.timeout_seconds = seconds;
        self
    }
}

#[async_trait]
impl ClusterOp for PollNmaHealthOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        format!("wait for the NMA on {} host(s)", self.base.hosts.len())
    }

    async fn prepare(&mut self, ctx: &mut ExecContext) -> Result<()> {
        if self.base.hosts.is_empty() {
            return Err(OpError::Validation(
                "poll_nma_health requires at least one host".into(),
            ));
        }
        // probing through fresh certificates needs its own client, with the
        // run's connection settings otherwise unchanged
        if let Some(new_tls) = &self.new_tls {
            self.own_dispatcher = Some(Dispatcher::new(
                ctx.dispatcher.config().clone(),
                new_tls,
            )?);
        }
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let name = self.base.name;
        drive_polling(name, self, ctx).await
    }
}

#[async_trait]
impl PollingOp for PollNmaHealthOp {
    fn polling_timeout(&self) -> i64 {
        self.timeout_seconds
    }

    async fn run_execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        self.base
            .register_for_all(|_| HostRequest::nma_get("health"));
        let requests = self.base.take_requests();
        let dispatcher = self.own_dispatcher.as_ref().unwrap_or(&ctx.dispatcher);
        let results = dispatcher.fan_out(requests).await;
        self.all_passing = results.values().all(|r| r.is_passing());
        Ok(())
    }

    fn should_stop_polling(&mut self) -> Result<bool> {
        Ok(self.all_passing)
    }
}
