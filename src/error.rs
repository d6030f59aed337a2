//! Error types for cluster operations

use thiserror::Error;

/// One active client session, as reported by the sessions system table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDetail {
    pub session_id: String,
    pub user_name: String,
    pub node_name: String,
}

#[derive(Error, Debug, Clone)]
pub enum OpError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized on host {host}")]
    Unauthorized { host: String },

    #[error("Precondition failed on host {host}: {message}")]
    Precondition { host: String, message: String },

    #[error("{identifier} not found on host {host}")]
    NotFound { identifier: String, host: String },

    #[error("Host {host} unreachable: {message}")]
    HostUnreachable { host: String, message: String },

    #[error("Database is down: {0}")]
    DbDown(String),

    #[error("{} active session(s) found", sessions.len())]
    ActiveSessions { sessions: Vec<SessionDetail> },

    #[error("The cluster lease will expire at {expiry}")]
    ClusterLeaseNotExpired { expiry: String },

    #[error("cycle detected in session dependencies")]
    CycleDetected,

    #[error("inconsistent ksafety values in epoch reports")]
    InconsistentKSafety,

    #[error("Polling timeout: {op} did not finish within {seconds} seconds")]
    PollingTimeout { op: String, seconds: u64 },

    #[error("Restore point not found in archive {archive}{}{}",
        invalid_id.as_ref().map(|i| format!(" (id {i})")).unwrap_or_default(),
        invalid_index.map(|i| format!(" (index {i})")).unwrap_or_default())]
    RestorePointNotFound {
        archive: String,
        invalid_id: Option<String>,
        invalid_index: Option<usize>,
    },

    #[error("Subcluster {sc_name} is not sandboxed")]
    SubclusterNotSandboxed { sc_name: String },

    #[error("cannot remove the default subcluster {sc_name}")]
    RemoveDefaultSubcluster { sc_name: String },

    #[error("API error on host {host}: {message} (code: {code})")]
    Api {
        host: String,
        code: u16,
        message: String,
    },

    #[error("Connection error on host {host}: {message}")]
    Connection { host: String, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("{op}: {source}")]
    OpFailed {
        op: String,
        #[source]
        source: Box<OpError>,
    },

    #[error("{op} failed on {} host(s): {}", causes.len(), causes.join("; "))]
    Aggregate { op: String, causes: Vec<String> },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for OpError {
    fn from(err: serde_json::Error) -> Self {
        OpError::Parse(err.to_string())
    }
}

impl OpError {
    /// Wrap an error with the operation or composer name that produced it,
    /// preserving the causal chain: `<composer>: <operation>: <cause>`.
    pub fn in_op(self, op: impl Into<String>) -> Self {
        OpError::OpFailed {
            op: op.into(),
            source: Box::new(self),
        }
    }

    /// Join per-host failure messages into one aggregated error.
    pub fn joined(op: impl Into<String>, causes: Vec<String>) -> Self {
        OpError::Aggregate {
            op: op.into(),
            causes,
        }
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self.root(), OpError::Validation(_))
    }

    /// Check if this is an authentication error
    pub fn is_unauthorized(&self) -> bool {
        matches!(self.root(), OpError::Unauthorized { .. })
            || matches!(self.root(), OpError::Api { code, .. } if *code == 401)
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), OpError::NotFound { .. })
            || matches!(self.root(), OpError::Api { code, .. } if *code == 404)
    }

    /// Check if this is a precondition failure (node not joined, missing ksafety)
    pub fn is_precondition(&self) -> bool {
        matches!(self.root(), OpError::Precondition { .. })
            || matches!(self.root(), OpError::Api { code, .. } if *code == 412)
    }

    /// Check if this is a transport-level failure
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self.root(),
            OpError::HostUnreachable { .. } | OpError::Connection { .. }
        )
    }

    /// Check if this error means the database is down everywhere
    pub fn is_db_down(&self) -> bool {
        matches!(self.root(), OpError::DbDown(_))
    }

    /// Check if this is a polling timeout
    pub fn is_polling_timeout(&self) -> bool {
        matches!(self.root(), OpError::PollingTimeout { .. })
    }

    /// Unwrap `OpFailed` layers down to the originating error.
    pub fn root(&self) -> &OpError {
        match self {
            OpError::OpFailed { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, OpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_failed_preserves_causal_chain() {
        let err = OpError::Unauthorized {
            host: "10.0.0.1".into(),
        }
        .in_op("sync_catalog")
        .in_op("stop_db");
        assert_eq!(
            err.to_string(),
            "stop_db: sync_catalog: Unauthorized on host 10.0.0.1"
        );
        assert!(err.is_unauthorized());
    }

    #[test]
    fn aggregate_joins_causes() {
        let err = OpError::joined(
            "prepare_directories",
            vec!["h1: permission denied".into(), "h2: disk full".into()],
        );
        let msg = err.to_string();
        assert!(msg.contains("2 host(s)"));
        assert!(msg.contains("h1: permission denied"));
    }

    #[test]
    fn classifier_sees_through_wrapping() {
        let err = OpError::NotFound {
            identifier: "subcluster sc2".into(),
            host: "10.0.0.1".into(),
        }
        .in_op("find_subcluster");
        assert!(err.is_not_found());
        assert!(!err.is_unauthorized());
    }

    #[test]
    fn restore_point_error_carries_selector() {
        let err = OpError::RestorePointNotFound {
            archive: "arch1".into(),
            invalid_id: None,
            invalid_index: Some(2),
        };
        assert_eq!(
            err.to_string(),
            "Restore point not found in archive arch1 (index 2)"
        );
    }
}
