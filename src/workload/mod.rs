//! Workload capture and replay
//!
//! A captured workload is a CSV of queries tagged with their session, start
//! time and duration. Replay preserves intra-session order and honors
//! write/write and write/read conflicts across sessions through a dependency
//! DAG; independent sessions replay concurrently.

pub mod csv;
pub mod scheduler;

use serde::{Deserialize, Serialize};

/// One captured query, as stored in the workload CSV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadQuery {
    pub node_name: String,
    pub session_id: String,
    pub start_timestamp: String,
    pub end_timestamp: String,
    pub request: String,
    pub request_duration_ms: u64,
    pub error_details: String,
}

/// One row of the replay report CSV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayReportRow {
    pub request: String,
    pub original_duration_ms: u64,
    pub original_node_name: String,
    pub replay_duration_ms: u64,
    pub replay_node_name: String,
    pub error: String,
}

/// Marker placed on rows a cancellation cut short.
pub const CANCELED_MARKER: &str = "Workload replay was Canceled";

pub use csv::{
    read_workload_csv, read_workload_csv_from, write_replay_report, write_replay_report_to,
    write_workload_csv, write_workload_csv_to,
};
pub use scheduler::{ReplayOptions, replay_sessions};
