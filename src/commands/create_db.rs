//! Create a new database across a host fleet

use super::DatabaseOptions;
use crate::error::{OpError, Result};
use crate::op::ClusterOp;
use crate::ops::bootstrap_catalog::{BootstrapCatalogOp, BootstrapCatalogRequest};
use crate::ops::check_db_running::{CheckDbRunningOp, DbDownReason};
use crate::ops::create_depot::CreateDepotOp;
use crate::ops::create_node::{CreateNodeOp, CreateNodeRequest};
use crate::ops::create_tls_auth::CreateTlsAuthOp;
use crate::ops::install_packages::InstallPackagesOp;
use crate::ops::mark_design_ksafe::MarkDesignKsafeOp;
use crate::ops::network_profile::NetworkProfileOp;
use crate::ops::nma_health::NmaHealthOp;
use crate::ops::poll_node_state::PollNodeStateOp;
use crate::ops::prepare_directories::{HostDirectories, PrepareDirectoriesOp};
use crate::ops::reload_spread::ReloadSpreadOp;
use crate::ops::spread_security::SetSpreadSecurityOp;
use crate::ops::stage_config_files::StageConfigFilesOp;
use crate::ops::start_node::StartNodeOp;
use crate::ops::startup_command::GetStartupCommandsOp;
use crate::ops::sync_catalog::SyncCatalogOp;
use crate::ops::system_tables::InstallLicenseOp;
use crate::ops::version_check::VersionCheckOp;
use crate::util::validate_depot_size;
use crate::vdb::{NodeState, VNode, Vdb, node_name_for};
use std::collections::HashMap;
use typed_builder::TypedBuilder;

/// Below this host count the design cannot be marked k-safe.
pub const KSAFETY_THRESHOLD: usize = 3;
pub const KSAFE_VALUE_ONE: u32 = 1;

#[derive(Debug, Clone, TypedBuilder)]
pub struct CreateDbOptions {
    pub base: DatabaseOptions,
    #[builder(default)]
    pub is_eon: bool,
    #[builder(default, setter(into))]
    pub communal_storage_location: String,
    #[builder(default, setter(into, strip_option))]
    pub depot_size: Option<String>,
    /// Only removes non-user directories
    #[builder(default)]
    pub force_cleanup: bool,
    #[builder(default)]
    pub spread_encryption: bool,
    #[builder(default)]
    pub skip_startup_polling: bool,
    #[builder(default)]
    pub skip_package_install: bool,
    /// Create a TLS auth rule and grant it to the database user
    #[builder(default)]
    pub tls_auth: bool,
    #[builder(default, setter(into, strip_option))]
    pub license_file: Option<String>,
}

impl CreateDbOptions {
    pub fn validate(&self) -> Result<()> {
        self.base.validate_base_options("create_db")?;
        self.validate_eon_options()?;
        Ok(())
    }

    fn validate_eon_options(&self) -> Result<()> {
        if self.is_eon && self.communal_storage_location.is_empty() {
            return Err(OpError::Validation(
                "create_db in Eon mode requires a communal storage location".into(),
            ));
        }
        if let Some(depot_size) = &self.depot_size {
            if !self.is_eon {
                return Err(OpError::Validation(
                    "a depot size only applies to Eon mode".into(),
                ));
            }
            validate_depot_size(depot_size)?;
        }
        Ok(())
    }

    fn node_paths(&self, index: usize) -> (String, String, String, String) {
        let db = &self.base.db_name;
        let node = node_name_for(db, index);
        let catalog = format!("{}/{}/{}_catalog", self.base.catalog_prefix, db, node);
        let data = format!("{}/{}/{}_data", self.base.data_prefix, db, node);
        let depot_prefix = if self.base.depot_prefix.is_empty() {
            &self.base.data_prefix
        } else {
            &self.base.depot_prefix
        };
        let depot = if self.is_eon {
            format!("{}/{}/{}_depot", depot_prefix, db, node)
        } else {
            String::new()
        };
        (node, catalog, data, depot)
    }
}

/// Build the ordered instruction list of §create-db. Hosts keep the user's
/// input order; the first host bootstraps the catalog.
pub fn plan_instructions(
    options: &CreateDbOptions,
    hosts: &[String],
) -> Result<Vec<Box<dyn ClusterOp>>> {
    let db_name = options.base.db_name.clone();
    let bootstrap_host = hosts
        .first()
        .cloned()
        .ok_or_else(|| OpError::Validation("create_db requires at least one host".into()))?;
    let workers: Vec<String> = hosts.iter().skip(1).cloned().collect();
    let (bootstrap_node, bootstrap_catalog, _, _) = options.node_paths(1);

    let mut layouts = HashMap::new();
    for (i, host) in hosts.iter().enumerate() {
        let (_, catalog, data, depot) = options.node_paths(i + 1);
        layouts.insert(
            host.clone(),
            HostDirectories {
                catalog_path: catalog,
                depot_path: depot,
                storage_locations: vec![data],
                user_storage_locations: Vec::new(),
            },
        );
    }

    let mut instructions: Vec<Box<dyn ClusterOp>> = vec![
        Box::new(NmaHealthOp::new(hosts.to_vec())),
        Box::new(VersionCheckOp::new(hosts.to_vec()).require_equal_versions()),
        Box::new(CheckDbRunningOp::new(hosts.to_vec(), DbDownReason::CreateDb)),
        Box::new(PrepareDirectoriesOp::new(layouts, options.force_cleanup)),
        Box::new(NetworkProfileOp::new(hosts.to_vec())),
        Box::new(BootstrapCatalogOp::new(
            bootstrap_host.clone(),
            BootstrapCatalogRequest {
                db_name: db_name.clone(),
                catalog_path: bootstrap_catalog.clone(),
                storage_locations: vec![options.node_paths(1).2],
                node_name: bootstrap_node.clone(),
                communal_storage_location: options.communal_storage_location.clone(),
                ipv6: options.base.ipv6,
                spread_encryption_enabled: options.spread_encryption,
            },
        )),
    ];

    let mut bootstrap_catalog_map = HashMap::new();
    bootstrap_catalog_map.insert(bootstrap_host.clone(), bootstrap_catalog.clone());
    instructions.push(Box::new(crate::ops::read_catalog_editor::ReadCatalogEditorOp::new(
        bootstrap_catalog_map,
    )));

    if options.spread_encryption {
        instructions.push(Box::new(SetSpreadSecurityOp::new(
            bootstrap_host.clone(),
            bootstrap_catalog.clone(),
        )));
    }

    instructions.push(Box::new(StartNodeOp::for_bootstrap(
        bootstrap_host.clone(),
        bootstrap_node.clone(),
        bootstrap_catalog.clone(),
    )));
    instructions.push(Box::new(PollNodeStateOp::wait_for_up(vec![
        bootstrap_host.clone(),
    ])));

    if !workers.is_empty() {
        instructions.push(Box::new(CreateNodeOp::new(
            vec![bootstrap_host.clone()],
            CreateNodeRequest {
                db_name: db_name.clone(),
                hosts: workers.clone(),
                catalog_prefix: options.base.catalog_prefix.clone(),
                data_prefix: options.base.data_prefix.clone(),
                subcluster: None,
            },
        )));
        instructions.push(Box::new(ReloadSpreadOp::new(vec![bootstrap_host.clone()])));
        instructions.push(Box::new(
            crate::ops::get_up_nodes::GetUpNodesOp::new(vec![bootstrap_host.clone()]),
        ));
        instructions.push(Box::new(GetStartupCommandsOp::new(vec![
            bootstrap_host.clone(),
        ])));
        instructions.push(Box::new(StageConfigFilesOp::new(
            bootstrap_host.clone(),
            workers.clone(),
            bootstrap_catalog.clone(),
        )));
        let worker_nodes: HashMap<String, String> = workers
            .iter()
            .map(|host| {
                let index = hosts.iter().position(|h| h == host).expect("worker host") + 1;
                (host.clone(), node_name_for(&db_name, index))
            })
            .collect();
        instructions.push(Box::new(StartNodeOp::new(worker_nodes)));
    }

    if !options.skip_startup_polling {
        instructions.push(Box::new(PollNodeStateOp::wait_for_up(hosts.to_vec())));
    }

    if options.is_eon {
        let depot_path = format!(
            "{}/{}",
            if options.base.depot_prefix.is_empty() {
                &options.base.data_prefix
            } else {
                &options.base.depot_prefix
            },
            db_name
        );
        instructions.push(Box::new(CreateDepotOp::new(
            vec![bootstrap_host.clone()],
            depot_path,
            options.depot_size.clone(),
        )));
    }

    if hosts.len() >= KSAFETY_THRESHOLD {
        instructions.push(Box::new(MarkDesignKsafeOp::new(
            vec![bootstrap_host.clone()],
            KSAFE_VALUE_ONE,
        )));
    }

    if !options.skip_package_install {
        instructions.push(Box::new(InstallPackagesOp::new(
            vec![bootstrap_host.clone()],
            false,
        )));
    }

    if options.tls_auth {
        instructions.push(Box::new(CreateTlsAuthOp::new(
            vec![bootstrap_host.clone()],
            format!("{db_name}_tls_auth"),
            options.base.effective_username(),
            options.base.ipv6,
        )));
    }

    if let Some(license_file) = &options.license_file {
        instructions.push(Box::new(InstallLicenseOp::new(
            vec![bootstrap_host.clone()],
            license_file.clone(),
        )));
    }

    if options.is_eon {
        instructions.push(Box::new(SyncCatalogOp::new(vec![bootstrap_host])));
    }

    Ok(instructions)
}

/// Create the database and return its topology snapshot.
pub async fn create_db(options: &mut CreateDbOptions) -> Result<Vdb> {
    options.validate()?;
    let hosts = options.base.analyze()?;
    let mut instructions = plan_instructions(options, &hosts)?;
    let engine = options.base.engine();
    engine.run(&mut instructions).await?;

    let mut vdb = Vdb {
        name: options.base.db_name.clone(),
        is_eon: options.is_eon,
        communal_storage_location: options.communal_storage_location.clone(),
        catalog_prefix: options.base.catalog_prefix.clone(),
        data_prefix: options.base.data_prefix.clone(),
        depot_prefix: options.base.depot_prefix.clone(),
        ipv6: options.base.ipv6,
        use_depot: options.is_eon,
        ..Vdb::default()
    };
    for (i, host) in hosts.iter().enumerate() {
        let (node, catalog, data, depot) = options.node_paths(i + 1);
        vdb.host_list.push(host.clone());
        vdb.host_node_map.insert(
            host.clone(),
            VNode {
                name: node,
                address: host.clone(),
                state: NodeState::Up,
                catalog_path: catalog,
                depot_path: depot,
                storage_locations: vec![data],
                is_primary: true,
                subcluster: "default_subcluster".to_string(),
                ..VNode::default()
            },
        );
    }
    Ok(vdb)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(host_count: usize) -> (CreateDbOptions, Vec<String>) {
        let hosts: Vec<String> = (1..=host_count).map(|i| format!("10.0.0.{i}")).collect();
        let opts = CreateDbOptions::builder()
            .base(
                DatabaseOptions::builder()
                    .db_name("testdb")
                    .raw_hosts(hosts.clone())
                    .build(),
            )
            .build();
        (opts, hosts)
    }

    fn op_names(instructions: &[Box<dyn ClusterOp>]) -> Vec<&'static str> {
        instructions.iter().map(|op| op.name()).collect()
    }

    #[test]
    fn two_hosts_skip_mark_design_ksafe() {
        let (opts, hosts) = options(2);
        let names = op_names(&plan_instructions(&opts, &hosts).unwrap());
        assert!(!names.contains(&"mark_design_ksafe"));
    }

    #[test]
    fn three_hosts_mark_design_ksafe() {
        let (opts, hosts) = options(3);
        let names = op_names(&plan_instructions(&opts, &hosts).unwrap());
        assert!(names.contains(&"mark_design_ksafe"));
    }

    #[test]
    fn plan_starts_with_health_version_and_running_checks() {
        let (opts, hosts) = options(3);
        let names = op_names(&plan_instructions(&opts, &hosts).unwrap());
        assert_eq!(
            &names[..3],
            &["nma_health", "version_check", "check_db_running"]
        );
    }

    #[test]
    fn eon_plan_ends_with_catalog_sync() {
        let (mut opts, hosts) = options(3);
        opts.is_eon = true;
        opts.communal_storage_location = "s3://bucket/db".into();
        let names = op_names(&plan_instructions(&opts, &hosts).unwrap());
        assert_eq!(*names.last().unwrap(), "sync_catalog");
        assert!(names.contains(&"create_depot"));
    }

    #[test]
    fn single_host_plan_has_no_worker_steps() {
        let (opts, hosts) = options(1);
        let names = op_names(&plan_instructions(&opts, &hosts).unwrap());
        assert!(!names.contains(&"create_node"));
        assert!(!names.contains(&"stage_config_files"));
    }

    #[test]
    fn depot_size_requires_eon() {
        let (mut opts, _) = options(1);
        opts.depot_size = Some("10G".into());
        assert!(opts.validate().is_err());
        opts.is_eon = true;
        opts.communal_storage_location = "s3://bucket/db".into();
        assert!(opts.validate().is_ok());
    }
}
