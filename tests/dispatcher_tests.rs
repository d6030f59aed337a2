//! Dispatcher fanout and result classification tests

mod common;

use common::{error_response, host_of, setup_mock_server, success_response, test_dispatcher};
use serde_json::json;
use std::collections::HashMap;
use vertica_clusterops::HostRequest;
use wiremock::matchers::{basic_auth, method, path, query_param};
use wiremock::Mock;

#[tokio::test]
async fn fan_out_collects_results_per_host() {
    let server_a = setup_mock_server().await;
    let server_b = setup_mock_server().await;
    for server in [&server_a, &server_b] {
        Mock::given(method("GET"))
            .and(path("/v1/nodes"))
            .and(basic_auth("dbadmin", "secret"))
            .respond_with(success_response(json!({"node_list": []})))
            .mount(server)
            .await;
    }

    let dispatcher = test_dispatcher();
    let mut requests = HashMap::new();
    requests.insert(host_of(&server_a), HostRequest::https_get("nodes"));
    requests.insert(host_of(&server_b), HostRequest::https_get("nodes"));
    let results = dispatcher.fan_out(requests).await;

    assert_eq!(results.len(), 2);
    assert!(results.values().all(|r| r.is_passing()));
    assert!(results.contains_key(&host_of(&server_a)));
    assert!(results.contains_key(&host_of(&server_b)));
}

#[tokio::test]
async fn status_codes_classify() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/v1/unauthorized"))
        .respond_with(error_response(401, "bad credentials"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/precondition"))
        .respond_with(error_response(412, "node not yet joined"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/internal"))
        .respond_with(error_response(503, "catalog busy"))
        .mount(&server)
        .await;

    let dispatcher = test_dispatcher();
    let host = host_of(&server);

    for (endpoint, check) in [
        ("unauthorized", 401u16),
        ("precondition", 412),
        ("internal", 503),
    ] {
        let mut requests = HashMap::new();
        requests.insert(host.clone(), HostRequest::https_get(endpoint));
        let results = dispatcher.fan_out(requests).await;
        let result = &results[&host];
        assert_eq!(result.status, Some(check));
        match check {
            401 => assert!(result.is_unauthorized()),
            412 => assert!(result.is_precondition_failed()),
            _ => assert!(result.is_internal_error()),
        }
    }
}

#[tokio::test]
async fn connection_refused_reads_as_node_down() {
    let dispatcher = test_dispatcher();
    let mut requests = HashMap::new();
    // nothing listens on this port
    requests.insert(
        "127.0.0.1:1".to_string(),
        HostRequest::https_get("nodes"),
    );
    let results = dispatcher.fan_out(requests).await;
    let result = &results["127.0.0.1:1"];
    assert!(result.is_transport_failure());
    assert!(result.is_connection_refused());
    assert!(result.as_error().is_unreachable());
}

#[tokio::test]
async fn typed_decode_reports_the_field_path() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/v1/nodes"))
        .respond_with(success_response(json!({"node_list": [{"name": 42}]})))
        .mount(&server)
        .await;

    let dispatcher = test_dispatcher();
    let host = host_of(&server);
    let mut requests = HashMap::new();
    requests.insert(host.clone(), HostRequest::https_get("nodes"));
    let results = dispatcher.fan_out(requests).await;
    let err = results[&host]
        .json::<vertica_clusterops::vdb::NodeListResponse>()
        .unwrap_err();
    assert!(err.to_string().contains("node_list"));
}

#[tokio::test]
async fn query_parameters_reach_the_server() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/v1/dc/slow-events"))
        .and(query_param("node-name", "v_testdb_node0001"))
        .respond_with(success_response(json!({"slow_events": []})))
        .mount(&server)
        .await;

    let dispatcher = test_dispatcher();
    let host = host_of(&server);
    let mut requests = HashMap::new();
    requests.insert(
        host.clone(),
        HostRequest::https_get("dc/slow-events").with_query("node-name", "v_testdb_node0001"),
    );
    let results = dispatcher.fan_out(requests).await;
    assert!(results[&host].is_passing());
}
