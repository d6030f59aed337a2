//! Polling driver for operations that wait on cluster state
//!
//! A poller repeatedly evaluates a predicate until it turns true or a time
//! budget runs out. No coroutines; blocking sleeps between ticks suffice.

use crate::context::ExecContext;
use crate::error::{OpError, Result};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::debug;

/// Sleep between polling ticks.
pub const POLLING_INTERVAL: Duration = Duration::from_secs(3);
/// Budget for nodes coming up after a start.
pub const STARTUP_POLLING_TIMEOUT_SECONDS: i64 = 300;
/// Budget for nodes going down after a stop.
pub const STOP_POLLING_TIMEOUT_SECONDS: i64 = 300;
/// Budget for a database shutdown to be confirmed.
pub const STOP_DB_TIMEOUT_SECONDS: i64 = 300;
/// Scrutinize-style collection polls forever.
pub const UNBOUNDED_POLLING: i64 = -1;

/// Implemented by any operation that needs to wait.
#[async_trait]
pub trait PollingOp: Send {
    /// Total budget in seconds; `<= 0` means poll forever.
    fn polling_timeout(&self) -> i64;

    /// One evaluation round; refreshes whatever state the predicate reads.
    async fn run_execute(&mut self, ctx: &mut ExecContext) -> Result<()>;

    /// `Ok(true)` ends successfully, `Ok(false)` sleeps and retries,
    /// `Err` ends with failure.
    fn should_stop_polling(&mut self) -> Result<bool>;
}

/// Drive a poller to its terminal state or timeout.
pub async fn drive_polling<P: PollingOp + ?Sized>(
    name: &str,
    poller: &mut P,
    ctx: &mut ExecContext,
) -> Result<()> {
    let budget = poller.polling_timeout();
    let started = Instant::now();
    let mut tick: u64 = 0;
    loop {
        poller.run_execute(ctx).await?;
        if poller.should_stop_polling()? {
            debug!("{name}: predicate satisfied after {tick} tick(s)");
            return Ok(());
        }
        if budget > 0 && started.elapsed() >= Duration::from_secs(budget as u64) {
            return Err(OpError::PollingTimeout {
                op: name.to_string(),
                seconds: budget as u64,
            });
        }
        tick += 1;
        tokio::time::sleep(POLLING_INTERVAL).await;
    }
}
