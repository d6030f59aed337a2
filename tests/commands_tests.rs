//! Composer tests against mock clusters

mod common;

use common::{host_of, node_entry, setup_mock_server, success_response};
use serde_json::json;
use vertica_clusterops::commands::replicate::{ReplicateStatusOptions, replicate_status};
use vertica_clusterops::commands::stop_db::{StopDbOptions, stop_db};
use vertica_clusterops::DatabaseOptions;
use wiremock::matchers::{basic_auth, method, path};
use wiremock::Mock;

fn base_options(server_host: String) -> DatabaseOptions {
    DatabaseOptions::builder()
        .db_name("testdb")
        .raw_hosts(vec![server_host])
        .username(common::TEST_USER)
        .password(common::TEST_PASSWORD)
        .scheme("http")
        .build()
}

#[tokio::test]
async fn stop_db_shuts_down_and_confirms() {
    let server = setup_mock_server().await;
    let host = host_of(&server);

    // first call discovers the UP node; the post-shutdown confirmation gets
    // no match and reads as "nothing running"
    Mock::given(method("GET"))
        .and(path("/v1/nodes"))
        .and(basic_auth("dbadmin", "secret"))
        .respond_with(success_response(json!({
            "node_list": [node_entry("v_testdb_node0001", &host, "UP", "sc1", "")]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/cluster/shutdown"))
        .and(basic_auth("dbadmin", "secret"))
        .respond_with(success_response(json!({"detail": "Shutdown: sync complete"})))
        .mount(&server)
        .await;

    let mut options = StopDbOptions::builder()
        .base(base_options(host))
        .build();
    stop_db(&mut options).await.unwrap();
}

#[tokio::test]
async fn stop_db_with_sessions_returns_structured_error() {
    let server = setup_mock_server().await;
    let host = host_of(&server);

    Mock::given(method("GET"))
        .and(path("/v1/nodes"))
        .respond_with(success_response(json!({
            "node_list": [node_entry("v_testdb_node0001", &host, "UP", "sc1", "")]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/sessions"))
        .respond_with(success_response(json!({
            "session_list": [
                {"session_id": "s-42", "user_name": "alice",
                 "node_name": "v_testdb_node0001", "session_type": "client"}
            ]
        })))
        .mount(&server)
        .await;

    let mut options = StopDbOptions::builder()
        .base(base_options(host))
        .check_user_conn(true)
        .build();
    let err = stop_db(&mut options).await.unwrap_err();
    match err.root() {
        vertica_clusterops::OpError::ActiveSessions { sessions } => {
            assert_eq!(sessions.len(), 1);
            assert_eq!(sessions[0].user_name, "alice");
        }
        other => panic!("expected ActiveSessions, got {other}"),
    }
}

#[tokio::test]
async fn replicate_status_merges_rows() {
    let server = setup_mock_server().await;
    let host = host_of(&server);

    Mock::given(method("POST"))
        .and(path("/v1/replicate/status"))
        .respond_with(success_response(json!({
            "replication_status_list": [
                {"transaction_id": 77, "node_name": "v_t_node0001",
                 "op_name": "data_transfer", "status": "started",
                 "start_time": "2024-01-01 00:01:00", "end_time": "",
                 "sent_bytes": 512, "total_bytes": 2048},
                {"transaction_id": 77, "node_name": "v_t_node0001",
                 "op_name": "load_snapshot_prep", "status": "completed",
                 "start_time": "2024-01-01 00:00:00",
                 "end_time": "2024-01-01 00:00:30",
                 "sent_bytes": 0, "total_bytes": 0},
                {"transaction_id": 99, "node_name": "v_t_node0001",
                 "op_name": "load_snapshot", "status": "completed",
                 "start_time": "2023-12-31 00:00:00", "end_time": "",
                 "sent_bytes": 0, "total_bytes": 0}
            ]
        })))
        .mount(&server)
        .await;

    let mut options = ReplicateStatusOptions::builder()
        .base(base_options(host))
        .transaction_id(77)
        .build();
    let summary = replicate_status(&mut options).await.unwrap();
    assert_eq!(summary.transaction_id, 77);
    // earliest op's timing, current op's status and progress
    assert_eq!(summary.start_time, "2024-01-01 00:00:00");
    assert_eq!(summary.op_name, "data_transfer");
    assert_eq!(summary.status, "started");
    assert_eq!(summary.sent_bytes, 512);
}
