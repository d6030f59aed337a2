//! Sequential engine over an ordered instruction list

use crate::context::ExecContext;
use crate::dispatcher::{Dispatcher, DispatcherConfig, TlsOptions};
use crate::error::Result;
use crate::op::ClusterOp;
use crate::vdb::Vdb;
use tracing::{debug, info, warn};

/// Executes an ordered list of operations, threading one [`ExecContext`]
/// through. Execution over instructions is strictly sequential; fan-out
/// concurrency lives inside each operation.
pub struct ClusterOpEngine {
    config: DispatcherConfig,
    tls: TlsOptions,
}

impl ClusterOpEngine {
    pub fn new(config: DispatcherConfig, tls: TlsOptions) -> Self {
        ClusterOpEngine { config, tls }
    }

    /// Run the instructions against a fresh context.
    pub async fn run(&self, instructions: &mut [Box<dyn ClusterOp>]) -> Result<ExecContext> {
        self.run_with(instructions, None, "").await
    }

    /// Run with the context pre-seeded for sandbox-aware operations.
    pub async fn run_in_sandbox(
        &self,
        instructions: &mut [Box<dyn ClusterOp>],
        vdb_for_sandbox_info: Vdb,
        sandbox: &str,
    ) -> Result<ExecContext> {
        self.run_with(instructions, Some(vdb_for_sandbox_info), sandbox)
            .await
    }

    async fn run_with(
        &self,
        instructions: &mut [Box<dyn ClusterOp>],
        vdb_for_sandbox_info: Option<Vdb>,
        sandbox: &str,
    ) -> Result<ExecContext> {
        let dispatcher = Dispatcher::new(self.config.clone(), &self.tls)?;
        let mut ctx = ExecContext::new(dispatcher);
        ctx.sandbox = sandbox.to_string();
        ctx.vdb_for_sandbox_info = vdb_for_sandbox_info;

        for op in instructions.iter_mut() {
            info!("[{}] {}", op.name(), op.description());

            op.filter_unreachable_hosts(&ctx);
            op.filter_hosts_by_sandbox(&ctx);

            if let Err(cause) = op.prepare(&mut ctx).await {
                return Err(cause.in_op(format!("prepare {} failed", op.name())));
            }

            if !op.skip_execute() {
                if let Err(cause) = op.apply_tls_options(&self.tls) {
                    return Err(cause.in_op(op.name()));
                }
                let executed = op.execute(&mut ctx).await;
                // finalize runs even when execute fails
                let finalized = op.finalize(&mut ctx).await;
                executed?;
                finalized?;
            } else {
                debug!("[{}] execute skipped", op.name());
                op.finalize(&mut ctx).await?;
            }
        }

        if !ctx.unreachable_hosts.is_empty() {
            warn!(
                "hosts unreachable during this run: {}",
                ctx.unreachable_hosts.join(", ")
            );
        }
        Ok(ctx)
    }
}

impl std::fmt::Debug for ClusterOpEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterOpEngine")
            .field("scheme", &self.config.scheme)
            .field("https_port", &self.config.https_port)
            .field("nma_port", &self.config.nma_port)
            .finish()
    }
}
