//! Refuse to stop a database that still has client sessions

use crate::context::ExecContext;
use crate::dispatcher::HostRequest;
use crate::error::{OpError, Result, SessionDetail};
use crate::op::{ClusterOp, OpBase, fan_out, first_passing};
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct SessionRow {
    session_id: String,
    #[serde(default)]
    user_name: String,
    #[serde(default)]
    node_name: String,
    #[serde(default)]
    session_type: String,
}

#[derive(Debug, Deserialize)]
struct SessionListResponse {
    session_list: Vec<SessionRow>,
}

/// `GET /sessions` on an initiator; any active client session raises a
/// structured error the caller can pattern-match, distinct from a generic
/// failure.
pub struct CheckSessionsOp {
    base: OpBase,
}

impl CheckSessionsOp {
    pub fn new(initiators: Vec<String>) -> Self {
        CheckSessionsOp {
            base: OpBase::with_hosts("check_sessions", initiators),
        }
    }
}

#[async_trait]
impl ClusterOp for CheckSessionsOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        "check for active client sessions".to_string()
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        self.base
            .register_for_all(|_| HostRequest::https_get("sessions"));
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut ExecContext) -> Result<()> {
        let results = fan_out(&mut self.base, ctx).await;
        let passing = first_passing("check_sessions", &results)?;
        let response: SessionListResponse = passing.json()?;
        let sessions: Vec<SessionDetail> = response
            .session_list
            .iter()
            .filter(|s| s.session_type != "dbd" && s.session_type != "internal")
            .map(|s| SessionDetail {
                session_id: s.session_id.clone(),
                user_name: s.user_name.clone(),
                node_name: s.node_name.clone(),
            })
            .collect();
        if sessions.is_empty() {
            Ok(())
        } else {
            Err(OpError::ActiveSessions { sessions })
        }
    }
}
