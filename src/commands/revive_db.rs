//! Revive a database from communal storage onto a new host fleet

use super::DatabaseOptions;
use crate::catalog::NmaVDatabase;
use crate::error::{OpError, Result};
use crate::op::ClusterOp;
use crate::ops::check_db_running::{CheckDbRunningOp, DbDownReason};
use crate::ops::download_cluster_config::DownloadClusterConfigOp;
use crate::ops::load_remote_catalog::{LoadRemoteCatalogOp, LoadRemoteCatalogRequest};
use crate::ops::network_profile::NetworkProfileOp;
use crate::ops::nma_health::NmaHealthOp;
use crate::ops::prepare_directories::{HostDirectories, PrepareDirectoriesOp};
use crate::ops::read_catalog_editor::ReadCatalogEditorOp;
use crate::ops::restore_points::ShowRestorePointsOp;
use crate::vdb::{RestorePoint, Vdb};
use std::collections::HashMap;
use typed_builder::TypedBuilder;

/// Which restore point to revive to. Exactly one of `id` and `index` must be
/// set.
#[derive(Debug, Clone, TypedBuilder)]
pub struct RestorePointSpec {
    #[builder(setter(into))]
    pub archive: String,
    #[builder(default, setter(into, strip_option))]
    pub id: Option<String>,
    #[builder(default, setter(strip_option))]
    pub index: Option<usize>,
}

impl RestorePointSpec {
    pub fn validate(&self) -> Result<()> {
        if self.archive.is_empty() {
            return Err(OpError::Validation(
                "a restore point needs an archive name".into(),
            ));
        }
        match (&self.id, self.index) {
            (Some(_), None) | (None, Some(_)) => Ok(()),
            _ => Err(OpError::Validation(
                "exactly one of restore point id and index must be set".into(),
            )),
        }
    }

    /// Exactly one enumerated point must match the spec.
    pub fn resolve(&self, points: &[RestorePoint]) -> Result<RestorePoint> {
        let matching: Vec<&RestorePoint> = points
            .iter()
            .filter(|p| {
                p.archive == self.archive
                    && self.id.as_ref().is_none_or(|id| &p.id == id)
                    && self.index.is_none_or(|index| p.index == index)
            })
            .collect();
        match matching.as_slice() {
            [point] => Ok((*point).clone()),
            _ => Err(OpError::RestorePointNotFound {
                archive: self.archive.clone(),
                invalid_id: self.id.clone(),
                invalid_index: self.index,
            }),
        }
    }
}

#[derive(Debug, Clone, TypedBuilder)]
pub struct ReviveDbOptions {
    pub base: DatabaseOptions,
    #[builder(setter(into))]
    pub communal_storage_location: String,
    #[builder(default)]
    pub ignore_cluster_lease: bool,
    #[builder(default, setter(strip_option))]
    pub restore_point: Option<RestorePointSpec>,
}

impl ReviveDbOptions {
    pub fn validate(&self) -> Result<()> {
        self.base.validate_base_options("revive_db")?;
        if self.communal_storage_location.is_empty() {
            return Err(OpError::Validation(
                "revive_db requires a communal storage location".into(),
            ));
        }
        if let Some(spec) = &self.restore_point {
            spec.validate()?;
        }
        Ok(())
    }
}

/// One original node paired with the host that will carry it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviveNodePlan {
    pub node_name: String,
    pub new_host: String,
    /// Address the node had in the original cluster
    pub old_host: String,
    pub catalog_path: String,
}

/// Sort original nodes by name and pair them with the user-supplied hosts in
/// input order; the old addresses stay in the same order for the remote
/// catalog load.
pub fn plan_revive_nodes(original: &NmaVDatabase, new_hosts: &[String]) -> Result<Vec<ReviveNodePlan>> {
    let mut nodes: Vec<_> = original.nodes.iter().collect();
    nodes.sort_by(|a, b| a.name.cmp(&b.name));
    if nodes.len() != new_hosts.len() {
        return Err(OpError::Validation(format!(
            "revive_db needs exactly {} host(s) for database {}, got {}",
            nodes.len(),
            original.name,
            new_hosts.len()
        )));
    }
    Ok(nodes
        .iter()
        .zip(new_hosts)
        .map(|(node, host)| ReviveNodePlan {
            node_name: node.name.clone(),
            new_host: host.clone(),
            old_host: node.address.clone(),
            catalog_path: node.catalog_path.clone(),
        })
        .collect())
}

/// Two-phase revive: validate the communal state, then rebuild catalogs on
/// the new hosts. Returns the revived topology snapshot.
pub async fn revive_db(options: &mut ReviveDbOptions) -> Result<Vdb> {
    options.validate()?;
    let hosts = options.base.analyze()?;
    let engine = options.base.engine();
    let db_name = options.base.db_name.clone();

    // phase 1: health, no running database, description file + lease
    let mut download = DownloadClusterConfigOp::new(
        hosts.clone(),
        db_name.clone(),
        options.communal_storage_location.clone(),
    );
    if options.ignore_cluster_lease {
        download = download.ignoring_cluster_lease();
    }
    let mut phase_one: Vec<Box<dyn ClusterOp>> = vec![
        Box::new(NmaHealthOp::new(hosts.clone())),
        Box::new(CheckDbRunningOp::new(hosts.clone(), DbDownReason::ReviveDb)),
        Box::new(download),
    ];
    if let Some(spec) = &options.restore_point {
        phase_one.push(Box::new(
            ShowRestorePointsOp::new(
                hosts.clone(),
                db_name.clone(),
                options.communal_storage_location.clone(),
            )
            .filtered_by_archive(spec.archive.clone()),
        ));
    }
    let ctx = engine
        .run(&mut phase_one)
        .await
        .map_err(|e| e.in_op("revive_db"))?;

    let restore_point = match &options.restore_point {
        Some(spec) => Some(spec.resolve(&ctx.restore_points)?),
        None => None,
    };
    let original = ctx.nma_vdatabase.ok_or_else(|| {
        OpError::Internal("revive_db: the description file carried no database".into())
    })?;
    let plans = plan_revive_nodes(&original, &hosts)?;

    // phase 2: directories, network profiles, remote catalog, catalog read
    let mut layouts = HashMap::new();
    let mut catalog_requests = HashMap::new();
    let mut editor_paths = HashMap::new();
    for plan in &plans {
        layouts.insert(
            plan.new_host.clone(),
            HostDirectories {
                catalog_path: plan.catalog_path.clone(),
                depot_path: String::new(),
                storage_locations: Vec::new(),
                user_storage_locations: Vec::new(),
            },
        );
        catalog_requests.insert(
            plan.new_host.clone(),
            LoadRemoteCatalogRequest {
                db_name: db_name.clone(),
                node_name: plan.node_name.clone(),
                catalog_path: plan.catalog_path.clone(),
                communal_storage_location: options.communal_storage_location.clone(),
                old_address: plan.old_host.clone(),
                restore_point_id: restore_point.as_ref().map(|p| p.id.clone()),
            },
        );
        editor_paths.insert(plan.new_host.clone(), plan.catalog_path.clone());
    }
    let mut phase_two: Vec<Box<dyn ClusterOp>> = vec![
        Box::new(PrepareDirectoriesOp::new(layouts, false).for_revive()),
        Box::new(NetworkProfileOp::new(hosts.clone())),
        Box::new(LoadRemoteCatalogOp::new(catalog_requests)),
        Box::new(ReadCatalogEditorOp::new(editor_paths).ignoring_missing_catalog()),
    ];
    let ctx = engine
        .run(&mut phase_two)
        .await
        .map_err(|e| e.in_op("revive_db"))?;

    let revived = ctx.nma_vdatabase.unwrap_or(original);
    let mut vdb = crate::catalog::vdb_from_catalog_editor(&revived);
    // the catalog still carries old addresses; rebind to the new fleet
    let rebind: HashMap<String, String> = plans
        .iter()
        .map(|p| (p.node_name.clone(), p.new_host.clone()))
        .collect();
    let nodes: Vec<_> = vdb.host_node_map.values().cloned().collect();
    vdb.host_list.clear();
    vdb.host_node_map.clear();
    for mut node in nodes {
        if let Some(new_host) = rebind.get(&node.name) {
            node.address = new_host.clone();
        }
        vdb.host_list.push(node.address.clone());
        vdb.host_node_map.insert(node.address.clone(), node);
    }
    Ok(vdb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn point(archive: &str, index: usize, id: &str) -> RestorePoint {
        RestorePoint {
            archive: archive.into(),
            index,
            id: id.into(),
            timestamp: String::new(),
        }
    }

    #[test]
    fn spec_requires_exactly_one_selector() {
        assert!(RestorePointSpec::builder().archive("arch1").build().validate().is_err());
        assert!(
            RestorePointSpec::builder()
                .archive("arch1")
                .id("rp1")
                .index(1)
                .build()
                .validate()
                .is_err()
        );
        assert!(
            RestorePointSpec::builder()
                .archive("arch1")
                .index(1)
                .build()
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn missing_index_reports_structured_error() {
        let spec = RestorePointSpec::builder().archive("arch1").index(2).build();
        let points = vec![point("arch1", 1, "rp1")];
        let err = spec.resolve(&points).unwrap_err();
        match err {
            OpError::RestorePointNotFound {
                archive,
                invalid_id,
                invalid_index,
            } => {
                assert_eq!(archive, "arch1");
                assert_eq!(invalid_id, None);
                assert_eq!(invalid_index, Some(2));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unique_match_resolves() {
        let spec = RestorePointSpec::builder().archive("arch1").id("rp2").build();
        let points = vec![point("arch1", 1, "rp1"), point("arch1", 2, "rp2")];
        assert_eq!(spec.resolve(&points).unwrap().index, 2);
    }

    #[test]
    fn nodes_pair_sorted_with_hosts_in_user_order() {
        let original: NmaVDatabase = serde_json::from_value(json!({
            "name": "testdb",
            "nodes": [
                {"name": "v_testdb_node0002", "address": "10.1.0.2",
                 "catalog_path": "/data/testdb/v_testdb_node0002_catalog"},
                {"name": "v_testdb_node0001", "address": "10.1.0.1",
                 "catalog_path": "/data/testdb/v_testdb_node0001_catalog"}
            ]
        }))
        .unwrap();
        let new_hosts = vec!["10.2.0.9".to_string(), "10.2.0.8".to_string()];
        let plans = plan_revive_nodes(&original, &new_hosts).unwrap();
        // node0001 (sorted first) pairs with the first user host
        assert_eq!(plans[0].node_name, "v_testdb_node0001");
        assert_eq!(plans[0].new_host, "10.2.0.9");
        assert_eq!(plans[0].old_host, "10.1.0.1");
        assert_eq!(plans[1].new_host, "10.2.0.8");
    }

    #[test]
    fn host_count_mismatch_is_rejected() {
        let original: NmaVDatabase = serde_json::from_value(json!({
            "name": "testdb",
            "nodes": [{"name": "v_testdb_node0001", "address": "10.1.0.1"}]
        }))
        .unwrap();
        assert!(plan_revive_nodes(&original, &[]).is_err());
    }
}
