//! Wait for shard subscriptions to settle

use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::Result;
use crate::op::{ClusterOp, OpBase, fan_out, first_passing};
use crate::ops::fetch_vdb::SubscriptionListResponse;
use crate::poller::{PollingOp, STARTUP_POLLING_TIMEOUT_SECONDS, drive_polling};
use async_trait::async_trait;
use tracing::debug;

pub const SUBSCRIPTION_ACTIVE: &str = "ACTIVE";
pub const SUBSCRIPTION_REMOVING: &str = "REMOVING";

/// Poll `GET /subscriptions` until every subscription of the watched nodes
/// is `ACTIVE` and none of the nodes leaving still shows `REMOVING`.
pub struct PollSubscriptionStateOp {
    base: OpBase,
    nodes_to_poll: Vec<String>,
    nodes_to_poll_for_removal: Vec<String>,
    timeout_seconds: i64,
    settled: bool,
}

impl PollSubscriptionStateOp {
    pub fn new(
        up_hosts: Vec<String>,
        nodes_to_poll: Vec<String>,
        nodes_to_poll_for_removal: Vec<String>,
    ) -> Self {
        PollSubscriptionStateOp {
            base: OpBase::with_hosts("poll_subscription_state", up_hosts),
            nodes_to_poll,
            nodes_to_poll_for_removal,
            timeout_seconds: STARTUP_POLLING_TIMEOUT_SECONDS,
            settled: false,
        }
    }

    pub fn with_timeout(mut self, seconds: i64) -> Self {
        self.timeout_seconds = seconds;
        self
    }
}

#[async_trait]
impl ClusterOp for PollSubscriptionStateOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        format!(
            "wait for subscriptions of {} node(s) to settle",
            self.nodes_to_poll.len()
        )
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        if self.nodes_to_poll.is_empty() && self.nodes_to_poll_for_removal.is_empty() {
            self.base.skip_execute = true;
        }
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let name = self.base.name;
        drive_polling(name, self, ctx).await
    }
}

#[async_trait]
impl PollingOp for PollSubscriptionStateOp {
    fn polling_timeout(&self) -> i64 {
        self.timeout_seconds
    }

    async fn run_execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        self.base
            .register_for_all(|_| HostRequest::https_get("subscriptions"));
        let results = fan_out(&mut self.base, ctx).await;
        let Ok(passing) = first_passing("poll_subscription_state", &results) else {
            // nobody answered this tick; keep polling
            self.settled = false;
            return Ok(());
        };
        let response: SubscriptionListResponse = passing.json()?;

        let unsettled = response.subscription_list.iter().any(|s| {
            self.nodes_to_poll.contains(&s.node_name)
                && s.subscription_state != SUBSCRIPTION_ACTIVE
        });
        let still_removing = response.subscription_list.iter().any(|s| {
            self.nodes_to_poll_for_removal.contains(&s.node_name)
                && s.subscription_state == SUBSCRIPTION_REMOVING
        });
        debug!(
            "poll_subscription_state: unsettled={unsettled} still_removing={still_removing}"
        );
        self.settled = !unsettled && !still_removing;
        Ok(())
    }

    fn should_stop_polling(&mut self) -> Result<bool> {
        Ok(self.settled)
    }
}
