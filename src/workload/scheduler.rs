//! Session-level replay scheduling
//!
//! Sessions replay strictly sequentially inside themselves. Across sessions,
//! two sessions touching the same user table where at least one access is a
//! write are ordered: the session that started later waits for the earlier
//! one. Everything else runs concurrently.

use super::{CANCELED_MARKER, ReplayReportRow, WorkloadQuery};
use crate::dispatcher::{DEFAULT_REQUEST_TIMEOUT, Dispatcher, HostRequest};
use crate::error::{OpError, Result};
use crate::util::parse_workload_time;
use chrono::{DateTime, FixedOffset};
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Table name prefixes excluded from dependency tracking.
const SYSTEM_SCHEMA_PREFIXES: [&str; 3] = ["v_monitor.", "v_internal.", "v_catalog."];

fn table_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:DELETE\s+FROM|FROM|JOIN|INTO|UPDATE|TABLE)\s+([A-Za-z_][A-Za-z0-9_.]*)")
            .expect("table regex is valid")
    })
}

fn write_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:INSERT|UPDATE|DELETE|MERGE|CREATE|DROP|ALTER|TRUNCATE)\b")
            .expect("write regex is valid")
    })
}

/// How a session touches one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableAccess {
    Read,
    Write,
}

/// The user tables one statement references, tagged read or write.
pub fn table_access_map(sql: &str) -> HashMap<String, TableAccess> {
    let access = if write_regex().is_match(sql) {
        TableAccess::Write
    } else {
        TableAccess::Read
    };
    let mut tables = HashMap::new();
    for capture in table_regex().captures_iter(sql) {
        let table = capture[1].to_lowercase();
        if SYSTEM_SCHEMA_PREFIXES
            .iter()
            .any(|prefix| table.starts_with(prefix))
        {
            continue;
        }
        tables.insert(table, access);
    }
    tables
}

/// One session's replay plan.
#[derive(Debug, Clone)]
pub struct SessionPlan {
    pub session_id: String,
    /// Queries in CSV order; replayed strictly sequentially
    pub queries: Vec<WorkloadQuery>,
    pub earliest_start: DateTime<FixedOffset>,
    pub table_access: HashMap<String, TableAccess>,
}

/// Group queries by session id, preserving CSV order inside each group.
/// Sessions come out ordered by first appearance in the CSV.
pub fn group_sessions(queries: &[WorkloadQuery]) -> Result<Vec<SessionPlan>> {
    let mut plans: Vec<SessionPlan> = Vec::new();
    let mut index_of: HashMap<String, usize> = HashMap::new();
    for query in queries {
        let start = parse_workload_time(&query.start_timestamp)?;
        let idx = match index_of.get(&query.session_id) {
            Some(idx) => *idx,
            None => {
                index_of.insert(query.session_id.clone(), plans.len());
                plans.push(SessionPlan {
                    session_id: query.session_id.clone(),
                    queries: Vec::new(),
                    earliest_start: start,
                    table_access: HashMap::new(),
                });
                plans.len() - 1
            }
        };
        let plan = &mut plans[idx];
        if start < plan.earliest_start {
            plan.earliest_start = start;
        }
        for (table, access) in table_access_map(&query.request) {
            let entry = plan.table_access.entry(table).or_insert(access);
            if access == TableAccess::Write {
                *entry = TableAccess::Write;
            }
        }
        plan.queries.push(query.clone());
    }
    Ok(plans)
}

/// Dependency edges: `deps[i]` holds the indices session `i` must wait for.
/// For every pair sharing a user table with at least one write access, the
/// later session (by earliest start; ties broken by session id) depends on
/// the earlier one.
pub fn build_dependency_edges(plans: &[SessionPlan]) -> Vec<HashSet<usize>> {
    let mut deps: Vec<HashSet<usize>> = vec![HashSet::new(); plans.len()];
    for a in 0..plans.len() {
        for b in (a + 1)..plans.len() {
            let conflicted = plans[a].table_access.iter().any(|(table, access_a)| {
                plans[b].table_access.get(table).is_some_and(|access_b| {
                    *access_a == TableAccess::Write || *access_b == TableAccess::Write
                })
            });
            if !conflicted {
                continue;
            }
            let a_earlier = (plans[a].earliest_start, &plans[a].session_id)
                < (plans[b].earliest_start, &plans[b].session_id);
            if a_earlier {
                deps[b].insert(a);
            } else {
                deps[a].insert(b);
            }
        }
    }
    deps
}

/// Kahn's algorithm over the dependency edges; any cycle is a hard error
/// raised before a single query replays.
pub fn topological_order(deps: &[HashSet<usize>]) -> Result<Vec<usize>> {
    let n = deps.len();
    let mut remaining: Vec<HashSet<usize>> = deps.to_vec();
    let mut order = Vec::with_capacity(n);
    let mut placed = vec![false; n];
    while order.len() < n {
        let Some(next) = (0..n).find(|&i| !placed[i] && remaining[i].is_empty()) else {
            return Err(OpError::CycleDetected);
        };
        placed[next] = true;
        order.push(next);
        for dep_set in remaining.iter_mut() {
            dep_set.remove(&next);
        }
    }
    Ok(order)
}

/// Replace constructs the replay endpoint cannot execute verbatim.
pub fn preprocess_query(sql: &str) -> String {
    sql.trim().trim_end_matches(';').to_string()
}

/// Per-query budget: at least the process default, stretched for queries
/// that originally ran long.
pub fn per_query_timeout(captured_duration_ms: u64) -> Duration {
    DEFAULT_REQUEST_TIMEOUT.max(Duration::from_millis(captured_duration_ms * 3 / 2))
}

#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    /// Skip relative-timing sleeps; ordering is unchanged
    pub quick_replay: bool,
}

#[derive(Debug, Deserialize)]
struct ReplayResponse {
    #[serde(default)]
    node_name: String,
    #[serde(default)]
    request_duration_ms: Option<u64>,
    #[serde(default)]
    error_details: String,
}

struct SharedReplay {
    rows: Vec<Option<Vec<ReplayReportRow>>>,
    active: usize,
    max_active: usize,
}

fn canceled_row(query: &WorkloadQuery) -> ReplayReportRow {
    ReplayReportRow {
        request: query.request.clone(),
        original_duration_ms: query.request_duration_ms,
        original_node_name: query.node_name.clone(),
        replay_duration_ms: 0,
        replay_node_name: String::new(),
        error: CANCELED_MARKER.to_string(),
    }
}

/// Replay a captured workload against the given hosts.
///
/// Returns one report row per original query, sessions in CSV appearance
/// order, intra-session order preserved verbatim. Query errors are recorded
/// in their row and do not abort the session; cancellation marks every
/// not-yet-replayed row with [`CANCELED_MARKER`].
pub async fn replay_sessions(
    dispatcher: &Dispatcher,
    replay_hosts: &[String],
    queries: Vec<WorkloadQuery>,
    options: &ReplayOptions,
    cancel: CancellationToken,
) -> Result<Vec<ReplayReportRow>> {
    if replay_hosts.is_empty() {
        return Err(OpError::Validation(
            "workload replay needs at least one host".into(),
        ));
    }
    let plans = group_sessions(&queries)?;
    let deps = build_dependency_edges(&plans);
    topological_order(&deps)?;

    let total = plans.len();
    let shared = Arc::new(Mutex::new(SharedReplay {
        rows: vec![None; total],
        active: 0,
        max_active: 0,
    }));
    let replay_epoch = Instant::now();
    let mut slots: Vec<Option<SessionPlan>> = plans.into_iter().map(Some).collect();
    let mut started: HashSet<usize> = HashSet::new();
    let mut completed: HashSet<usize> = HashSet::new();
    let mut join_set: JoinSet<usize> = JoinSet::new();

    while completed.len() < total && !cancel.is_cancelled() {
        for idx in 0..total {
            if started.contains(&idx) || !deps[idx].iter().all(|d| completed.contains(d)) {
                continue;
            }
            let plan = slots[idx]
                .take()
                .expect("unstarted session plan is present");
            started.insert(idx);
            join_set.spawn(run_session(
                idx,
                plan,
                dispatcher.clone(),
                replay_hosts[idx % replay_hosts.len()].clone(),
                options.quick_replay,
                replay_epoch,
                cancel.clone(),
                Arc::clone(&shared),
            ));
        }
        match join_set.join_next().await {
            Some(Ok(idx)) => {
                completed.insert(idx);
            }
            Some(Err(e)) => {
                return Err(OpError::Internal(format!(
                    "a replay session task failed: {e}"
                )));
            }
            None => break,
        }
    }

    // drain sessions still running; under cancellation they finish promptly
    while let Some(joined) = join_set.join_next().await {
        if let Ok(idx) = joined {
            completed.insert(idx);
        }
    }

    let mut shared = shared.lock().expect("replay state lock");
    debug!(
        "workload replay finished; peak session concurrency {}",
        shared.max_active
    );
    let mut report = Vec::with_capacity(queries.len());
    for idx in 0..total {
        match shared.rows[idx].take() {
            Some(rows) => report.extend(rows),
            None => {
                // session never started before cancellation
                if let Some(plan) = &slots[idx] {
                    report.extend(plan.queries.iter().map(canceled_row));
                }
            }
        }
    }
    Ok(report)
}

#[allow(clippy::too_many_arguments)]
async fn run_session(
    idx: usize,
    plan: SessionPlan,
    dispatcher: Dispatcher,
    host: String,
    quick_replay: bool,
    replay_epoch: Instant,
    cancel: CancellationToken,
    shared: Arc<Mutex<SharedReplay>>,
) -> usize {
    {
        let mut state = shared.lock().expect("replay state lock");
        state.active += 1;
        state.max_active = state.max_active.max(state.active);
    }
    let mut rows = Vec::with_capacity(plan.queries.len());
    let mut canceled = false;

    for query in &plan.queries {
        if canceled || cancel.is_cancelled() {
            canceled = true;
            rows.push(canceled_row(query));
            continue;
        }

        if !quick_replay {
            if let Ok(query_start) = parse_workload_time(&query.start_timestamp) {
                let session_elapsed = (query_start - plan.earliest_start)
                    .to_std()
                    .unwrap_or_default();
                let wall_elapsed = replay_epoch.elapsed();
                if wall_elapsed < session_elapsed {
                    let wait = session_elapsed - wall_elapsed;
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            canceled = true;
                            rows.push(canceled_row(query));
                            continue;
                        }
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
            }
        }

        let sql = preprocess_query(&query.request);
        let request = HostRequest::nma_post("workload-replay/replay", json!({ "request": sql }))
            .with_timeout(per_query_timeout(query.request_duration_ms));
        let mut requests = HashMap::new();
        requests.insert(host.clone(), request);

        let sent_at = Instant::now();
        let results = tokio::select! {
            _ = cancel.cancelled() => {
                canceled = true;
                rows.push(canceled_row(query));
                continue;
            }
            results = dispatcher.fan_out(requests) => results,
        };
        let elapsed_ms = sent_at.elapsed().as_millis() as u64;

        let row = match results.into_values().next() {
            Some(result) if result.is_passing() => {
                let response: ReplayResponse = result.json().unwrap_or(ReplayResponse {
                    node_name: host.clone(),
                    request_duration_ms: None,
                    error_details: String::new(),
                });
                ReplayReportRow {
                    request: query.request.clone(),
                    original_duration_ms: query.request_duration_ms,
                    original_node_name: query.node_name.clone(),
                    replay_duration_ms: response.request_duration_ms.unwrap_or(elapsed_ms),
                    replay_node_name: if response.node_name.is_empty() {
                        host.clone()
                    } else {
                        response.node_name
                    },
                    error: response.error_details,
                }
            }
            Some(result) => {
                // errors append a row and the session continues
                warn!(
                    "workload replay: query failed on {}: {}",
                    host,
                    result.as_error()
                );
                ReplayReportRow {
                    request: query.request.clone(),
                    original_duration_ms: query.request_duration_ms,
                    original_node_name: query.node_name.clone(),
                    replay_duration_ms: elapsed_ms,
                    replay_node_name: host.clone(),
                    error: result.as_error().to_string(),
                }
            }
            None => canceled_row(query),
        };
        rows.push(row);
    }

    let mut state = shared.lock().expect("replay state lock");
    state.rows[idx] = Some(rows);
    state.active -= 1;
    idx
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(session: &str, start: &str, sql: &str) -> WorkloadQuery {
        WorkloadQuery {
            node_name: "v_db_node0001".into(),
            session_id: session.into(),
            start_timestamp: format!("2024-03-01T10:00:{start}.000000+00:00"),
            end_timestamp: String::new(),
            request: sql.into(),
            request_duration_ms: 10,
            error_details: String::new(),
        }
    }

    #[test]
    fn access_map_tags_reads_and_writes() {
        let read = table_access_map("SELECT a FROM orders JOIN customers ON x");
        assert_eq!(read.get("orders"), Some(&TableAccess::Read));
        assert_eq!(read.get("customers"), Some(&TableAccess::Read));

        let write = table_access_map("INSERT INTO orders SELECT * FROM staging");
        assert_eq!(write.get("orders"), Some(&TableAccess::Write));
        assert_eq!(write.get("staging"), Some(&TableAccess::Write));

        let delete = table_access_map("DELETE FROM orders WHERE id = 1");
        assert_eq!(delete.get("orders"), Some(&TableAccess::Write));
    }

    #[test]
    fn access_map_excludes_system_schemas() {
        let access = table_access_map("SELECT * FROM v_monitor.sessions, v_catalog.tables");
        assert!(access.is_empty());
        let mixed = table_access_map("SELECT * FROM v_internal.dc_errors JOIN orders ON x");
        assert_eq!(mixed.len(), 1);
        assert!(mixed.contains_key("orders"));
    }

    #[test]
    fn sessions_group_in_appearance_order() {
        let queries = vec![
            query("s2", "05", "SELECT 1"),
            query("s1", "01", "SELECT 2"),
            query("s2", "06", "SELECT 3"),
        ];
        let plans = group_sessions(&queries).unwrap();
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].session_id, "s2");
        assert_eq!(plans[0].queries.len(), 2);
        assert_eq!(plans[1].session_id, "s1");
    }

    #[test]
    fn write_conflicts_order_later_after_earlier() {
        let queries = vec![
            query("a", "01", "INSERT INTO t VALUES (1)"),
            query("b", "02", "SELECT * FROM t"),
            query("c", "03", "SELECT * FROM unrelated"),
        ];
        let plans = group_sessions(&queries).unwrap();
        let deps = build_dependency_edges(&plans);
        // b reads what a writes, so b waits for a; c is independent
        assert!(deps[1].contains(&0));
        assert!(deps[0].is_empty());
        assert!(deps[2].is_empty());
        let order = topological_order(&deps).unwrap();
        let pos = |i: usize| order.iter().position(|&x| x == i).unwrap();
        assert!(pos(0) < pos(1));
    }

    #[test]
    fn read_only_sharing_creates_no_edge() {
        let queries = vec![
            query("a", "01", "SELECT * FROM t"),
            query("b", "02", "SELECT * FROM t"),
        ];
        let plans = group_sessions(&queries).unwrap();
        let deps = build_dependency_edges(&plans);
        assert!(deps.iter().all(HashSet::is_empty));
    }

    #[test]
    fn ties_break_by_session_id() {
        let queries = vec![
            query("beta", "01", "DROP TABLE t"),
            query("alfa", "01", "TRUNCATE TABLE t"),
        ];
        let plans = group_sessions(&queries).unwrap();
        let deps = build_dependency_edges(&plans);
        // equal starts: "alfa" sorts earlier, so "beta" depends on it
        assert!(deps[0].contains(&1));
        assert!(deps[1].is_empty());
    }

    #[test]
    fn cycle_is_a_hard_error() {
        let mut deps = vec![HashSet::new(), HashSet::new(), HashSet::new()];
        deps[1].insert(0);
        deps[2].insert(1);
        deps[0].insert(2);
        let err = topological_order(&deps).unwrap_err();
        assert_eq!(err.to_string(), "cycle detected in session dependencies");
    }

    #[test]
    fn query_timeout_stretches_for_long_queries() {
        assert_eq!(per_query_timeout(1_000), Duration::from_secs(300));
        assert_eq!(per_query_timeout(400_000), Duration::from_millis(600_000));
    }

    #[test]
    fn preprocess_strips_trailing_semicolon() {
        assert_eq!(preprocess_query("SELECT 1;  "), "SELECT 1");
    }
}
