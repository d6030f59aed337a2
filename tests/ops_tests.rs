//! Operation behavior tests against mock hosts

mod common;

use common::{
    error_response, host_of, node_entry, setup_mock_server, success_response, test_dispatcher,
};
use serde_json::json;
use vertica_clusterops::ExecContext;
use vertica_clusterops::op::ClusterOp;
use vertica_clusterops::ops::find_subcluster::FindSubclusterOp;
use vertica_clusterops::ops::get_up_nodes::GetUpNodesOp;
use vertica_clusterops::ops::last_good_epoch::GetLastGoodEpochOp;
use vertica_clusterops::ops::read_catalog_editor::ReadCatalogEditorOp;
use vertica_clusterops::ops::shutdown_cluster::ShutdownClusterOp;
use vertica_clusterops::ops::system_tables::GetSystemTablesOp;
use vertica_clusterops::ops::tls_digest::TlsDigestOp;
use wiremock::matchers::{method, path, query_param};
use wiremock::Mock;

fn context() -> ExecContext {
    ExecContext::new(test_dispatcher())
}

async fn run_op(op: &mut dyn ClusterOp, ctx: &mut ExecContext) -> vertica_clusterops::Result<()> {
    op.prepare(ctx).await?;
    if !op.skip_execute() {
        op.execute(ctx).await?;
    }
    op.finalize(ctx).await
}

#[tokio::test]
async fn critical_subcluster_refuses_shutdown() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/v1/subclusters/sc1"))
        .respond_with(success_response(json!({
            "subcluster_name": "sc1",
            "is_secondary": false,
            "control_set_size": 3,
            "is_default": false,
            "sandbox": "",
            "is_critical": true,
        })))
        .mount(&server)
        .await;

    let mut ctx = context();
    let mut op = FindSubclusterOp::new(vec![host_of(&server)], "sc1").rejecting_critical();
    let err = run_op(&mut op, &mut ctx).await.unwrap_err();
    assert!(err.to_string().contains(
        "subcluster sc1 is critical, shutting the subcluster down will cause \
         the whole database/sandbox shutdown"
    ));
}

#[tokio::test]
async fn missing_subcluster_can_be_suppressed() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/v1/subclusters/ghost"))
        .respond_with(error_response(404, "subcluster not found"))
        .mount(&server)
        .await;

    let mut ctx = context();
    let mut strict = FindSubclusterOp::new(vec![host_of(&server)], "ghost");
    let err = run_op(&mut strict, &mut ctx).await.unwrap_err();
    assert!(err.is_not_found());

    let mut ctx = context();
    let mut lenient = FindSubclusterOp::new(vec![host_of(&server)], "ghost").ignoring_not_found();
    run_op(&mut lenient, &mut ctx).await.unwrap();
    assert!(ctx.target_sc_info.is_none());
}

#[tokio::test]
async fn tls_digest_mismatch_keeps_holder_empty() {
    let server_a = setup_mock_server().await;
    let server_b = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path("/v1/vertica/tls_digest"))
        .respond_with(success_response(json!({"digest": "abc", "is_bootstrap": false})))
        .mount(&server_a)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/vertica/tls_digest"))
        .respond_with(success_response(json!({"digest": "def", "is_bootstrap": false})))
        .mount(&server_b)
        .await;

    let mut ctx = context();
    let mut op = TlsDigestOp::new(vec![host_of(&server_a), host_of(&server_b)]);
    let err = run_op(&mut op, &mut ctx).await.unwrap_err();
    assert!(err.to_string().contains("digest mismatch"));
    // the config cache stays untouched on mismatch
    assert!(ctx.tls_config_digest.is_none());
}

#[tokio::test]
async fn tls_digest_agreement_publishes() {
    let server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path("/v1/vertica/tls_digest"))
        .respond_with(success_response(json!({"digest": "abc", "is_bootstrap": true})))
        .mount(&server)
        .await;

    let mut ctx = context();
    let mut op = TlsDigestOp::new(vec![host_of(&server)]);
    run_op(&mut op, &mut ctx).await.unwrap();
    let digest = ctx.tls_config_digest.unwrap();
    assert_eq!(digest.digest, "abc");
    assert!(digest.is_bootstrap);
}

#[tokio::test]
async fn up_nodes_classify_by_sandbox_and_subcluster() {
    let server = setup_mock_server().await;
    let host = host_of(&server);
    Mock::given(method("GET"))
        .and(path("/v1/nodes"))
        .respond_with(success_response(json!({
            "node_list": [
                node_entry("v_testdb_node0001", "10.0.0.1", "UP", "sc1", ""),
                node_entry("v_testdb_node0002", "10.0.0.2", "UP", "sc2", "sand1"),
                node_entry("v_testdb_node0003", "10.0.0.3", "DOWN", "sc1", ""),
                node_entry("v_testdb_node0004", "10.0.0.4", "COMPUTE", "sc1", ""),
            ]
        })))
        .mount(&server)
        .await;

    let mut ctx = context();
    let mut op = GetUpNodesOp::new(vec![host]);
    run_op(&mut op, &mut ctx).await.unwrap();

    assert_eq!(ctx.up_hosts, vec!["10.0.0.1", "10.0.0.2"]);
    assert_eq!(ctx.up_hosts_to_sandboxes["10.0.0.1"], "");
    assert_eq!(ctx.up_hosts_to_sandboxes["10.0.0.2"], "sand1");
    assert_eq!(ctx.up_sc_info["sc1"], vec!["10.0.0.1"]);
    assert_eq!(ctx.compute_hosts, vec!["10.0.0.4"]);
    assert_eq!(ctx.nodes_info.len(), 4);
}

#[tokio::test]
async fn up_nodes_error_when_db_down_unless_allowed() {
    let dispatcher_host = "127.0.0.1:1".to_string();

    let mut ctx = context();
    let mut strict = GetUpNodesOp::new(vec![dispatcher_host.clone()]);
    let err = run_op(&mut strict, &mut ctx).await.unwrap_err();
    assert!(err.is_db_down());

    let mut ctx = context();
    let mut lenient = GetUpNodesOp::new(vec![dispatcher_host]).allowing_db_down();
    run_op(&mut lenient, &mut ctx).await.unwrap();
    assert!(ctx.up_hosts.is_empty());
}

#[tokio::test]
async fn catalog_editor_picks_latest_global_version() {
    let server_a = setup_mock_server().await;
    let server_b = setup_mock_server().await;
    let host_a = host_of(&server_a);
    let host_b = host_of(&server_b);

    for (server, host, global) in [(&server_a, &host_a, 40u64), (&server_b, &host_b, 42u64)] {
        Mock::given(method("GET"))
            .and(path("/v1/catalog/database"))
            .and(query_param("catalog_path", "/data/testdb/catalog"))
            .respond_with(success_response(json!({
                "name": "testdb",
                "versions": {"global": global},
                "nodes": [
                    {"name": "v_testdb_node0001", "address": host, "is_primary": true}
                ]
            })))
            .mount(server)
            .await;
    }

    let mut paths = std::collections::HashMap::new();
    paths.insert(host_a.clone(), "/data/testdb/catalog".to_string());
    paths.insert(host_b.clone(), "/data/testdb/catalog".to_string());

    let mut ctx = context();
    let mut op = ReadCatalogEditorOp::new(paths);
    run_op(&mut op, &mut ctx).await.unwrap();

    assert_eq!(ctx.hosts_with_latest_catalog, vec![host_b.clone()]);
    assert_eq!(ctx.primary_hosts_with_latest_catalog, vec![host_b]);
    assert_eq!(ctx.nma_vdatabase.unwrap().versions.global, 42);
}

#[tokio::test]
async fn last_good_epoch_takes_the_majority() {
    let mut servers = Vec::new();
    for epoch in [100u64, 100, 99] {
        let server = setup_mock_server().await;
        Mock::given(method("POST"))
            .and(path("/v1/epoch"))
            .respond_with(success_response(json!({
                "node_name": "v_testdb_node0001",
                "last_good_epoch": epoch,
                "ksafety": 1,
            })))
            .mount(&server)
            .await;
        servers.push(server);
    }

    let hosts: Vec<String> = servers.iter().map(host_of).collect();
    let mut ctx = context();
    let mut op = GetLastGoodEpochOp::new(hosts, "testdb");
    run_op(&mut op, &mut ctx).await.unwrap();
    assert_eq!(ctx.last_good_epoch, Some(100));
    assert_eq!(ctx.epoch_reports.len(), 3);
}

#[tokio::test]
async fn system_tables_land_in_the_context() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/v1/system-tables"))
        .respond_with(success_response(json!({
            "system_table_list": [
                {"table_name": "sessions", "schema": "v_monitor"},
                {"table_name": "nodes", "schema": "v_catalog"},
            ]
        })))
        .mount(&server)
        .await;

    let mut ctx = context();
    let mut op = GetSystemTablesOp::new(vec![host_of(&server)]);
    run_op(&mut op, &mut ctx).await.unwrap();
    assert_eq!(ctx.system_table_list.len(), 2);
    assert_eq!(ctx.system_table_list[0].table_name, "sessions");
}

#[tokio::test]
async fn shutdown_accepts_drain_grammar() {
    let server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path("/v1/cluster/shutdown"))
        .and(query_param("timeout", "60"))
        .respond_with(success_response(json!({
            "detail": "Set subcluster (sc1) to draining state before shutdown"
        })))
        .mount(&server)
        .await;

    let mut ctx = context();
    let mut op = ShutdownClusterOp::new(vec![host_of(&server)], Some(60));
    run_op(&mut op, &mut ctx).await.unwrap();
}

#[tokio::test]
async fn shutdown_deadline_exceeded_hints_at_kill() {
    let server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path("/v1/cluster/shutdown"))
        .respond_with(success_response(json!({
            "detail": "Error: context deadline exceeded while draining"
        })))
        .mount(&server)
        .await;

    let mut ctx = context();
    let mut op = ShutdownClusterOp::new(vec![host_of(&server)], None);
    let err = run_op(&mut op, &mut ctx).await.unwrap_err();
    assert!(err.to_string().contains("signal_type=kill"));
}
