//! Common test utilities
#![allow(dead_code)]

use serde_json::json;
use vertica_clusterops::{Dispatcher, DispatcherConfig, TlsOptions};
use wiremock::{MockServer, ResponseTemplate};

pub const TEST_USER: &str = "dbadmin";
pub const TEST_PASSWORD: &str = "secret";

/// Create a mock server playing both the HTTPS service and the NMA.
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// The mock's `host:port` authority, usable as a host address.
pub fn host_of(server: &MockServer) -> String {
    server.address().to_string()
}

/// Dispatcher config pointed at plain-HTTP mock servers.
pub fn test_config() -> DispatcherConfig {
    DispatcherConfig {
        scheme: "http".to_string(),
        username: TEST_USER.to_string(),
        password: Some(TEST_PASSWORD.to_string()),
        ..DispatcherConfig::default()
    }
}

pub fn test_dispatcher() -> Dispatcher {
    Dispatcher::new(test_config(), &TlsOptions::default()).unwrap()
}

/// Create a standard success response
pub fn success_response(body: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(body)
}

/// Create a standard error response
pub fn error_response(code: u16, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(code).set_body_json(json!({
        "type": "about:blank",
        "title": "error",
        "detail": message,
    }))
}

/// A node entry as `/nodes` reports it
pub fn node_entry(name: &str, address: &str, state: &str, sc: &str, sandbox: &str) -> serde_json::Value {
    json!({
        "name": name,
        "address": address,
        "state": state,
        "database": "testdb",
        "catalog_path": format!("/data/testdb/{name}_catalog"),
        "depot_path": "",
        "data_path": [format!("/data/testdb/{name}_data")],
        "subcluster_name": sc,
        "sandbox_name": sandbox,
        "is_primary": true,
        "build_info": "Vertica Analytic Database v24.1.0-0-abcdef",
        "is_control_node": false,
        "control_node": "",
    })
}
