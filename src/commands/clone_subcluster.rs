//! Clone a subcluster's layout under a new name

use super::{DatabaseOptions, subcluster_precheck};
use crate::error::{OpError, Result};
use crate::op::ClusterOp;
use crate::ops::clone_subcluster::CloneSubclusterOp;
use crate::ops::find_subcluster::FindSubclusterOp;
use typed_builder::TypedBuilder;

#[derive(Debug, Clone, TypedBuilder)]
pub struct CloneSubclusterOptions {
    pub base: DatabaseOptions,
    #[builder(setter(into))]
    pub source_sc_name: String,
    #[builder(setter(into))]
    pub target_sc_name: String,
}

impl CloneSubclusterOptions {
    pub fn validate(&self) -> Result<()> {
        self.base.validate_base_options("clone_subcluster")?;
        if self.source_sc_name.is_empty() {
            return Err(OpError::Validation(
                "must specify a source subcluster name".into(),
            ));
        }
        if self.target_sc_name.is_empty() {
            return Err(OpError::Validation(
                "must specify a target subcluster name".into(),
            ));
        }
        if self.source_sc_name == self.target_sc_name {
            return Err(OpError::Validation(
                "source and target subclusters cannot be the same".into(),
            ));
        }
        Ok(())
    }
}

/// Clone the source subcluster's type and control settings into a new,
/// empty subcluster.
pub async fn clone_subcluster(options: &mut CloneSubclusterOptions) -> Result<()> {
    options.validate()?;
    let hosts = options.base.analyze()?;

    let ctx = subcluster_precheck(
        &options.base,
        &hosts,
        FindSubclusterOp::new(hosts.clone(), options.source_sc_name.clone()),
    )
    .await
    .map_err(|e| e.in_op("clone_subcluster"))?;

    if ctx.up_sc_info.contains_key(&options.target_sc_name) {
        return Err(OpError::Validation(format!(
            "subcluster {} already exists",
            options.target_sc_name
        )));
    }
    let initiator = ctx
        .up_hosts
        .first()
        .cloned()
        .ok_or_else(|| OpError::DbDown("no UP host to clone the subcluster from".into()))?;

    let mut instructions: Vec<Box<dyn ClusterOp>> = vec![Box::new(CloneSubclusterOp::new(
        vec![initiator],
        options.source_sc_name.clone(),
        options.target_sc_name.clone(),
    ))];
    options
        .base
        .engine()
        .run(&mut instructions)
        .await
        .map_err(|e| e.in_op("clone_subcluster"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(source: &str, target: &str) -> CloneSubclusterOptions {
        CloneSubclusterOptions::builder()
            .base(
                DatabaseOptions::builder()
                    .db_name("testdb")
                    .raw_hosts(vec!["10.0.0.1".to_string()])
                    .build(),
            )
            .source_sc_name(source)
            .target_sc_name(target)
            .build()
    }

    #[test]
    fn same_source_and_target_is_rejected() {
        let err = options("sc1", "sc1").validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation error: source and target subclusters cannot be the same"
        );
    }

    #[test]
    fn empty_source_is_rejected() {
        let err = options("", "sc2").validate().unwrap_err();
        assert!(err.to_string().contains("must specify a source subcluster name"));
    }

    #[test]
    fn empty_target_is_rejected() {
        let err = options("sc1", "").validate().unwrap_err();
        assert!(err.to_string().contains("must specify a target subcluster name"));
    }
}
