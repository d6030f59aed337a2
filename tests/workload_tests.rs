//! Workload replay end-to-end tests

mod common;

use common::{host_of, node_entry, setup_mock_server, success_response, test_dispatcher};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use vertica_clusterops::commands::workload_replay::{WorkloadReplayOptions, workload_replay};
use vertica_clusterops::workload::scheduler::{ReplayOptions, replay_sessions};
use vertica_clusterops::workload::{CANCELED_MARKER, WorkloadQuery, write_workload_csv};
use vertica_clusterops::DatabaseOptions;
use wiremock::matchers::{method, path};
use wiremock::Mock;

fn query(session: &str, second: u32, sql: &str) -> WorkloadQuery {
    WorkloadQuery {
        node_name: "v_testdb_node0001".into(),
        session_id: session.into(),
        start_timestamp: format!("2024-03-01T10:00:{second:02}.000000+00:00"),
        end_timestamp: format!("2024-03-01T10:00:{:02}.500000+00:00", second),
        request: sql.into(),
        request_duration_ms: 10,
        error_details: String::new(),
    }
}

async fn mock_replay_endpoint(server: &wiremock::MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/workload-replay/replay"))
        .respond_with(success_response(json!({
            "node_name": "v_testdb_node0003",
            "request_duration_ms": 5,
            "error_details": "",
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn replay_preserves_session_order() {
    let server = setup_mock_server().await;
    mock_replay_endpoint(&server).await;

    let queries = vec![
        query("s1", 0, "INSERT INTO t VALUES (1)"),
        query("s1", 1, "INSERT INTO t VALUES (2)"),
        query("s2", 2, "SELECT * FROM t"),
    ];
    let report = replay_sessions(
        &test_dispatcher(),
        &[host_of(&server)],
        queries,
        &ReplayOptions { quick_replay: true },
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.len(), 3);
    assert_eq!(report[0].request, "INSERT INTO t VALUES (1)");
    assert_eq!(report[1].request, "INSERT INTO t VALUES (2)");
    assert_eq!(report[2].request, "SELECT * FROM t");
    assert!(report.iter().all(|r| r.error.is_empty()));
    assert!(report.iter().all(|r| r.replay_node_name == "v_testdb_node0003"));
    assert_eq!(report[0].replay_duration_ms, 5);
}

#[tokio::test]
async fn replay_errors_do_not_abort_the_session() {
    let server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path("/v1/workload-replay/replay"))
        .respond_with(wiremock::ResponseTemplate::new(500).set_body_json(json!({
            "detail": "syntax error"
        })))
        .mount(&server)
        .await;

    let queries = vec![query("s1", 0, "SELECT 1"), query("s1", 1, "SELECT 2")];
    let report = replay_sessions(
        &test_dispatcher(),
        &[host_of(&server)],
        queries,
        &ReplayOptions { quick_replay: true },
        CancellationToken::new(),
    )
    .await
    .unwrap();

    // both queries ran and both recorded their failure
    assert_eq!(report.len(), 2);
    assert!(report.iter().all(|r| !r.error.is_empty()));
}

#[tokio::test]
async fn cancellation_marks_remaining_rows() {
    let server = setup_mock_server().await;
    mock_replay_endpoint(&server).await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let queries = vec![query("s1", 0, "SELECT 1"), query("s2", 1, "SELECT 2")];
    let report = replay_sessions(
        &test_dispatcher(),
        &[host_of(&server)],
        queries,
        &ReplayOptions { quick_replay: true },
        cancel,
    )
    .await
    .unwrap();

    assert_eq!(report.len(), 2);
    assert!(report.iter().all(|r| r.error == CANCELED_MARKER));
}

#[tokio::test]
async fn workload_replay_command_reads_csv_and_writes_report() {
    let server = setup_mock_server().await;
    let host = host_of(&server);
    Mock::given(method("GET"))
        .and(path("/v1/nodes"))
        .respond_with(success_response(json!({
            "node_list": [node_entry("v_testdb_node0001", &host, "UP", "sc1", "")]
        })))
        .mount(&server)
        .await;
    mock_replay_endpoint(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let workload_file = dir.path().join("workload.csv");
    let report_file = dir.path().join("report.csv");
    write_workload_csv(
        &workload_file,
        &[query("s1", 0, "SELECT 1"), query("s1", 1, "SELECT 2")],
    )
    .unwrap();

    let mut options = WorkloadReplayOptions::builder()
        .base(
            DatabaseOptions::builder()
                .db_name("testdb")
                .raw_hosts(vec![host])
                .username(common::TEST_USER)
                .password(common::TEST_PASSWORD)
                .scheme("http")
                .build(),
        )
        .workload_file(workload_file)
        .report_file(report_file.clone())
        .quick_replay(true)
        .build();
    let rows = workload_replay(&mut options, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(rows.len(), 2);
    let written = std::fs::read_to_string(&report_file).unwrap();
    assert!(written.starts_with(
        "request,original_duration_ms,original_node_name,replay_duration_ms,replay_node_name,error"
    ));
    assert!(written.contains("SELECT 1"));
}
