//! Per-host request fanout for the HTTPS and NMA services
//!
//! Every operation registers one [`HostRequest`] per target host; the
//! dispatcher sends them all concurrently and hands back one [`HostResult`]
//! per host. Retries are not performed at this layer; operations decide
//! whether a failure class is retryable.

use crate::error::{OpError, Result};
use futures::future::join_all;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Process-wide default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
/// NMA health probes use a capped timeout.
pub const NMA_HEALTH_TIMEOUT: Duration = Duration::from_secs(30);

/// Default port of the database HTTPS service.
pub const DEFAULT_HTTPS_PORT: u16 = 8443;
/// Default port of the node management agent.
pub const DEFAULT_NMA_PORT: u16 = 5554;

/// TLS material used when building the dispatcher's HTTP client.
#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    /// Accept self-signed server certificates (dev only)
    pub insecure: bool,
    pub ca_cert_path: Option<String>,
    pub client_cert_path: Option<String>,
    pub client_key_path: Option<String>,
}

/// Which per-host service a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    /// The database HTTPS service
    Https,
    /// The node management agent
    Nma,
}

/// HTTP method for host requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

/// One typed request bound for a single host.
#[derive(Debug, Clone)]
pub struct HostRequest {
    pub service: Service,
    pub method: Method,
    /// Path relative to the per-host `/v1/` base
    pub endpoint: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub timeout: Option<Duration>,
}

impl HostRequest {
    pub fn new(service: Service, method: Method, endpoint: impl Into<String>) -> Self {
        HostRequest {
            service,
            method,
            endpoint: endpoint.into(),
            query: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn https_get(endpoint: impl Into<String>) -> Self {
        Self::new(Service::Https, Method::Get, endpoint)
    }

    pub fn https_post(endpoint: impl Into<String>, body: Value) -> Self {
        Self::new(Service::Https, Method::Post, endpoint).with_body(body)
    }

    pub fn https_put(endpoint: impl Into<String>, body: Value) -> Self {
        Self::new(Service::Https, Method::Put, endpoint).with_body(body)
    }

    pub fn nma_get(endpoint: impl Into<String>) -> Self {
        Self::new(Service::Nma, Method::Get, endpoint)
    }

    pub fn nma_post(endpoint: impl Into<String>, body: Value) -> Self {
        Self::new(Service::Nma, Method::Post, endpoint).with_body(body)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn effective_timeout(&self, default: Duration) -> Duration {
        let requested = self.timeout.unwrap_or(default);
        if self.service == Service::Nma && self.endpoint.trim_matches('/') == "health" {
            requested.min(NMA_HEALTH_TIMEOUT)
        } else {
            requested
        }
    }
}

/// Transport-level failure classes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostFailure {
    Timeout,
    /// Connection closed mid-response; expected and benign during shutdown
    Eof,
    /// Treated as "node down"
    ConnectionRefused,
    Unreachable(String),
    Request(String),
}

/// The outcome of one request against one host.
#[derive(Debug, Clone)]
pub struct HostResult {
    pub host: String,
    pub status: Option<u16>,
    pub body: String,
    pub failure: Option<HostFailure>,
}

impl HostResult {
    pub fn is_passing(&self) -> bool {
        self.failure.is_none() && matches!(self.status, Some(s) if (200..300).contains(&s))
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == Some(401)
    }

    pub fn is_internal_error(&self) -> bool {
        matches!(self.status, Some(s) if s >= 500)
    }

    pub fn is_precondition_failed(&self) -> bool {
        self.status == Some(412)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.failure, Some(HostFailure::Timeout))
    }

    pub fn is_eof(&self) -> bool {
        matches!(self.failure, Some(HostFailure::Eof))
    }

    pub fn is_connection_refused(&self) -> bool {
        matches!(self.failure, Some(HostFailure::ConnectionRefused))
    }

    pub fn is_transport_failure(&self) -> bool {
        self.failure.is_some()
    }

    /// Decode the response body into a typed value.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let deserializer = &mut serde_json::Deserializer::from_str(&self.body);
        serde_path_to_error::deserialize(deserializer).map_err(|err| {
            OpError::Parse(format!(
                "host {}: failed to deserialize field '{}': {}",
                self.host,
                err.path(),
                err.inner()
            ))
        })
    }

    /// The `detail` member of an RFC 7807 error body, falling back to the
    /// raw body when the response is not structured.
    pub fn error_detail(&self) -> String {
        serde_json::from_str::<Value>(&self.body)
            .ok()
            .and_then(|v| {
                v.get("detail")
                    .or_else(|| v.get("title"))
                    .and_then(|d| d.as_str().map(str::to_string))
            })
            .unwrap_or_else(|| self.body.clone())
    }

    /// Summarize this result as an error for collect-then-join reporting.
    pub fn as_error(&self) -> OpError {
        match (&self.failure, self.status) {
            (Some(HostFailure::Timeout), _) => OpError::Connection {
                host: self.host.clone(),
                message: "request timed out".into(),
            },
            (Some(HostFailure::Eof), _) => OpError::Connection {
                host: self.host.clone(),
                message: "connection closed before the response completed".into(),
            },
            (Some(HostFailure::ConnectionRefused), _) => OpError::HostUnreachable {
                host: self.host.clone(),
                message: "connection refused".into(),
            },
            (Some(HostFailure::Unreachable(m)), _) => OpError::HostUnreachable {
                host: self.host.clone(),
                message: m.clone(),
            },
            (Some(HostFailure::Request(m)), _) => OpError::Connection {
                host: self.host.clone(),
                message: m.clone(),
            },
            (None, Some(401)) => OpError::Unauthorized {
                host: self.host.clone(),
            },
            (None, Some(412)) => OpError::Precondition {
                host: self.host.clone(),
                message: self.error_detail(),
            },
            (None, Some(code)) => OpError::Api {
                host: self.host.clone(),
                code,
                message: self.error_detail(),
            },
            (None, None) => OpError::Connection {
                host: self.host.clone(),
                message: "no response".into(),
            },
        }
    }
}

/// Connection settings shared by every request in one engine run.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// `https` in production; tests point this at a plain-HTTP mock server
    pub scheme: String,
    pub https_port: u16,
    pub nma_port: u16,
    pub username: String,
    pub password: Option<String>,
    pub default_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        DispatcherConfig {
            scheme: "https".to_string(),
            https_port: DEFAULT_HTTPS_PORT,
            nma_port: DEFAULT_NMA_PORT,
            username: String::new(),
            password: None,
            default_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Sends registered per-host requests concurrently. Scoped to one engine run.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    config: DispatcherConfig,
    client: Arc<Client>,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig, tls: &TlsOptions) -> Result<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(tls.insecure)
            .build()
            .map_err(|e| OpError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Dispatcher {
            config,
            client: Arc::new(client),
        })
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Hosts given with an explicit port are used verbatim; otherwise the
    /// service's default port is appended.
    fn url_for(&self, host: &str, request: &HostRequest) -> String {
        let authority = if host.contains(':') && !host.starts_with('[') {
            host.to_string()
        } else {
            let port = match request.service {
                Service::Https => self.config.https_port,
                Service::Nma => self.config.nma_port,
            };
            format!("{host}:{port}")
        };
        let endpoint = request.endpoint.trim_start_matches('/');
        let mut url = format!("{}://{}/v1/{}", self.config.scheme, authority, endpoint);
        if !request.query.is_empty() {
            match serde_urlencoded::to_string(&request.query) {
                Ok(qs) => {
                    url.push('?');
                    url.push_str(&qs);
                }
                Err(e) => trace!("dropping unencodable query string: {e}"),
            }
        }
        url
    }

    /// Send all registered requests concurrently and collect results by host.
    pub async fn fan_out(
        &self,
        requests: HashMap<String, HostRequest>,
    ) -> HashMap<String, HostResult> {
        let futures: Vec<_> = requests
            .into_iter()
            .map(|(host, request)| self.send_one(host, request))
            .collect();
        join_all(futures)
            .await
            .into_iter()
            .map(|result| (result.host.clone(), result))
            .collect()
    }

    async fn send_one(&self, host: String, request: HostRequest) -> HostResult {
        let url = self.url_for(&host, &request);
        debug!("{:?} {}", request.method, url);
        trace!("request body: {:?}", request.body);

        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
            Method::Delete => self.client.delete(&url),
        };
        builder = builder
            .basic_auth(&self.config.username, self.config.password.as_deref())
            .timeout(request.effective_timeout(self.config.default_timeout));
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        match builder.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                trace!("response status from {host}: {status}");
                match response.text().await {
                    Ok(body) => HostResult {
                        host,
                        status: Some(status),
                        body,
                        failure: None,
                    },
                    Err(e) => HostResult {
                        host,
                        status: Some(status),
                        body: String::new(),
                        failure: Some(classify_reqwest_error(&e)),
                    },
                }
            }
            Err(e) => HostResult {
                host,
                status: None,
                body: String::new(),
                failure: Some(classify_reqwest_error(&e)),
            },
        }
    }
}

fn classify_reqwest_error(error: &reqwest::Error) -> HostFailure {
    if error.is_timeout() {
        return HostFailure::Timeout;
    }
    // the io error at the bottom of the chain is the reliable signal
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            use std::io::ErrorKind;
            return match io.kind() {
                ErrorKind::ConnectionRefused => HostFailure::ConnectionRefused,
                ErrorKind::UnexpectedEof
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::BrokenPipe => HostFailure::Eof,
                _ => HostFailure::Unreachable(io.to_string()),
            };
        }
        source = cause.source();
    }
    let text = error.to_string();
    if text.contains("connection closed") || text.contains("unexpected end of file") {
        HostFailure::Eof
    } else if error.is_connect() {
        if text.contains("refused") {
            HostFailure::ConnectionRefused
        } else {
            HostFailure::Unreachable(text)
        }
    } else if error.is_body() || error.is_decode() {
        HostFailure::Eof
    } else {
        HostFailure::Request(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(DispatcherConfig::default(), &TlsOptions::default()).unwrap()
    }

    #[test]
    fn url_appends_service_port() {
        let d = dispatcher();
        let https = HostRequest::https_get("nodes");
        assert_eq!(
            d.url_for("10.0.0.1", &https),
            "https://10.0.0.1:8443/v1/nodes"
        );
        let nma = HostRequest::nma_get("health");
        assert_eq!(
            d.url_for("10.0.0.1", &nma),
            "https://10.0.0.1:5554/v1/health"
        );
    }

    #[test]
    fn url_keeps_explicit_port() {
        let d = dispatcher();
        let req = HostRequest::https_get("/cluster");
        assert_eq!(
            d.url_for("10.0.0.1:9999", &req),
            "https://10.0.0.1:9999/v1/cluster"
        );
    }

    #[test]
    fn query_string_is_encoded() {
        let d = dispatcher();
        let req = HostRequest::https_get("dc/slow-events")
            .with_query("start-time", "2024-01-01 00:00:00.000000+00")
            .with_query("node-name", "v_db_node0001");
        let url = d.url_for("h1", &req);
        assert!(url.contains("start-time=2024-01-01+00%3A00%3A00.000000%2B00"));
        assert!(url.contains("node-name=v_db_node0001"));
    }

    #[test]
    fn nma_health_timeout_is_capped() {
        let req = HostRequest::nma_get("health").with_timeout(Duration::from_secs(120));
        assert_eq!(
            req.effective_timeout(DEFAULT_REQUEST_TIMEOUT),
            NMA_HEALTH_TIMEOUT
        );
        let other = HostRequest::nma_get("nodes").with_timeout(Duration::from_secs(120));
        assert_eq!(
            other.effective_timeout(DEFAULT_REQUEST_TIMEOUT),
            Duration::from_secs(120)
        );
    }

    #[test]
    fn result_classification() {
        let pass = HostResult {
            host: "h1".into(),
            status: Some(200),
            body: "{}".into(),
            failure: None,
        };
        assert!(pass.is_passing());

        let unauthorized = HostResult {
            host: "h1".into(),
            status: Some(401),
            body: String::new(),
            failure: None,
        };
        assert!(unauthorized.is_unauthorized());
        assert!(unauthorized.as_error().is_unauthorized());

        let refused = HostResult {
            host: "h1".into(),
            status: None,
            body: String::new(),
            failure: Some(HostFailure::ConnectionRefused),
        };
        assert!(refused.is_connection_refused());
        assert!(refused.as_error().is_unreachable());
    }

    #[test]
    fn error_detail_prefers_rfc7807_detail() {
        let result = HostResult {
            host: "h1".into(),
            status: Some(500),
            body: r#"{"type":"about:blank","title":"Internal","detail":"catalog lock held"}"#
                .into(),
            failure: None,
        };
        assert_eq!(result.error_detail(), "catalog lock held");
    }
}
