//! Workflow composers
//!
//! Each high-level command validates its options, optionally fetches a
//! topology snapshot, builds an ordered instruction list, hands it to a
//! fresh engine and interprets the result. Validation failures surface
//! before any engine runs and are never wrapped.

pub mod clone_subcluster;
pub mod create_db;
pub mod fetch;
pub mod re_ip;
pub mod remove_subcluster;
pub mod replicate;
pub mod revive_db;
pub mod rotate_tls;
pub mod sandbox;
pub mod stop_db;
pub mod unsandbox;
pub mod workload_replay;

use crate::dispatcher::{DispatcherConfig, TlsOptions};
use crate::engine::ClusterOpEngine;
use crate::error::{OpError, Result};
use crate::util::{current_os_user, resolve_raw_hosts, validate_absolute_path};
use typed_builder::TypedBuilder;

/// Options every command shares.
#[derive(Debug, Clone, TypedBuilder)]
pub struct DatabaseOptions {
    #[builder(setter(into))]
    pub db_name: String,
    /// Hosts as the user typed them; resolved by [`DatabaseOptions::analyze`]
    pub raw_hosts: Vec<String>,
    #[builder(default)]
    pub ipv6: bool,
    #[builder(default, setter(into, strip_option))]
    pub username: Option<String>,
    #[builder(default, setter(into, strip_option))]
    pub password: Option<String>,
    #[builder(default = String::from("/opt/vertica"), setter(into))]
    pub catalog_prefix: String,
    #[builder(default = String::from("/opt/vertica"), setter(into))]
    pub data_prefix: String,
    #[builder(default, setter(into))]
    pub depot_prefix: String,
    #[builder(default)]
    pub tls: TlsOptions,
    /// `https` in production; tests point commands at plain-HTTP mocks
    #[builder(default = String::from("https"), setter(into))]
    pub scheme: String,
    /// Print the plan without contacting any host
    #[builder(default)]
    pub display_only: bool,
}

impl DatabaseOptions {
    /// Shared precondition pattern: database name syntax, credentials
    /// pairing, non-empty hosts.
    pub fn validate_base_options(&self, cmd: &str) -> Result<()> {
        validate_db_name(&self.db_name)?;
        if self.raw_hosts.is_empty() && !self.display_only {
            return Err(OpError::Validation(format!(
                "{cmd} requires at least one host"
            )));
        }
        Ok(())
    }

    /// Resolve raw hosts to addresses of the requested family, preserving
    /// the user's order, and normalize path prefixes.
    pub fn analyze(&mut self) -> Result<Vec<String>> {
        if self.password.is_some() && self.username.is_none() {
            self.username = Some(current_os_user());
        }
        for prefix in [&mut self.catalog_prefix, &mut self.data_prefix] {
            while prefix.len() > 1 && prefix.ends_with('/') {
                prefix.pop();
            }
            validate_absolute_path(prefix, "path prefix")?;
        }
        while self.depot_prefix.len() > 1 && self.depot_prefix.ends_with('/') {
            self.depot_prefix.pop();
        }
        resolve_raw_hosts(&self.raw_hosts, self.ipv6)
    }

    /// The username sent with every request; the OS user when a password was
    /// given without one.
    pub fn effective_username(&self) -> String {
        self.username.clone().unwrap_or_else(current_os_user)
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            scheme: self.scheme.clone(),
            username: self.effective_username(),
            password: self.password.clone(),
            ..DispatcherConfig::default()
        }
    }

    pub fn engine(&self) -> ClusterOpEngine {
        ClusterOpEngine::new(self.dispatcher_config(), self.tls.clone())
    }
}

/// Shared precheck of the subcluster commands: discover UP hosts per
/// db-group and the target subcluster's description in one engine run.
pub(crate) async fn subcluster_precheck(
    options: &DatabaseOptions,
    hosts: &[String],
    find: crate::ops::find_subcluster::FindSubclusterOp,
) -> Result<crate::context::ExecContext> {
    let engine = options.engine();
    let mut instructions: Vec<Box<dyn crate::op::ClusterOp>> = vec![
        Box::new(crate::ops::get_up_nodes::GetUpNodesOp::new(hosts.to_vec()).full_scan()),
        Box::new(find),
    ];
    engine.run(&mut instructions).await
}

/// Database names start with a letter and stay alphanumeric/underscore.
pub fn validate_db_name(db_name: &str) -> Result<()> {
    if db_name.is_empty() {
        return Err(OpError::Validation("database name cannot be empty".into()));
    }
    let mut chars = db_name.chars();
    let first = chars.next().expect("non-empty name");
    if !first.is_ascii_alphabetic() {
        return Err(OpError::Validation(format!(
            "database name {db_name:?} must start with a letter"
        )));
    }
    if let Some(bad) = db_name
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && *c != '_')
    {
        return Err(OpError::Validation(format!(
            "database name {db_name:?} contains invalid character {bad:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(hosts: &[&str]) -> DatabaseOptions {
        DatabaseOptions::builder()
            .db_name("testdb")
            .raw_hosts(hosts.iter().map(|h| h.to_string()).collect())
            .build()
    }

    #[test]
    fn base_validation_requires_hosts() {
        let opts = options(&[]);
        let err = opts.validate_base_options("stop_db").unwrap_err();
        assert!(err.is_validation());
        assert!(options(&["10.0.0.1"]).validate_base_options("stop_db").is_ok());
    }

    #[test]
    fn db_name_syntax() {
        assert!(validate_db_name("testdb_1").is_ok());
        assert!(validate_db_name("").is_err());
        assert!(validate_db_name("1db").is_err());
        assert!(validate_db_name("bad-name").is_err());
    }

    #[test]
    fn password_without_username_defaults_to_os_user() {
        let mut opts = DatabaseOptions::builder()
            .db_name("testdb")
            .raw_hosts(vec!["10.0.0.1".to_string()])
            .password("secret")
            .build();
        opts.analyze().unwrap();
        assert!(opts.username.is_some());
    }

    #[test]
    fn analyze_normalizes_prefixes_and_keeps_host_order() {
        let mut opts = DatabaseOptions::builder()
            .db_name("testdb")
            .raw_hosts(vec!["10.0.0.2".to_string(), "10.0.0.1".to_string()])
            .catalog_prefix("/data/")
            .data_prefix("/data///")
            .build();
        let hosts = opts.analyze().unwrap();
        assert_eq!(hosts, vec!["10.0.0.2", "10.0.0.1"]);
        assert_eq!(opts.catalog_prefix, "/data");
        assert_eq!(opts.data_prefix, "/data");
    }

    #[test]
    fn relative_prefix_is_rejected() {
        let mut opts = DatabaseOptions::builder()
            .db_name("testdb")
            .raw_hosts(vec!["10.0.0.1".to_string()])
            .catalog_prefix("data")
            .build();
        assert!(opts.analyze().is_err());
    }
}
