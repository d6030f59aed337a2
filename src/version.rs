//! Database version string parsing

use crate::error::{OpError, Result};

/// Parsed form of `Vertica Analytic Database vX.Y.Z-<hotfix>-<revision>`.
///
/// Equality is by the full string; cross-host compatibility is by major
/// version only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub hotfix: String,
    pub revision: String,
    pub raw: String,
}

const VERSION_PREFIX: &str = "Vertica Analytic Database v";

impl DbVersion {
    pub fn parse(raw: &str) -> Result<Self> {
        let rest = raw.trim().strip_prefix(VERSION_PREFIX).ok_or_else(|| {
            OpError::Parse(format!("unrecognized database version string: {raw}"))
        })?;
        let mut dash_parts = rest.splitn(3, '-');
        let semver = dash_parts.next().unwrap_or_default();
        let hotfix = dash_parts.next().unwrap_or_default().to_string();
        let revision = dash_parts.next().unwrap_or_default().to_string();

        let mut nums = semver.split('.');
        let major = parse_component(nums.next(), raw)?;
        let minor = parse_component(nums.next(), raw)?;
        let patch = parse_component(nums.next(), raw)?;

        Ok(DbVersion {
            major,
            minor,
            patch,
            hotfix,
            revision,
            raw: raw.trim().to_string(),
        })
    }

    /// Hosts may cooperate in one cluster when their major versions match.
    pub fn is_compatible_with(&self, other: &DbVersion) -> bool {
        self.major == other.major
    }
}

fn parse_component(part: Option<&str>, raw: &str) -> Result<u32> {
    part.and_then(|p| p.parse().ok())
        .ok_or_else(|| OpError::Parse(format!("unrecognized database version string: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_version_string() {
        let v = DbVersion::parse("Vertica Analytic Database v12.0.4-7-20230405").unwrap();
        assert_eq!(v.major, 12);
        assert_eq!(v.minor, 0);
        assert_eq!(v.patch, 4);
        assert_eq!(v.hotfix, "7");
        assert_eq!(v.revision, "20230405");
    }

    #[test]
    fn compatibility_is_by_major_only() {
        let a = DbVersion::parse("Vertica Analytic Database v12.0.4-0-abc").unwrap();
        let b = DbVersion::parse("Vertica Analytic Database v12.3.1-2-def").unwrap();
        let c = DbVersion::parse("Vertica Analytic Database v11.0.4-0-abc").unwrap();
        assert!(a.is_compatible_with(&b));
        assert!(!a.is_compatible_with(&c));
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_foreign_strings() {
        assert!(DbVersion::parse("PostgreSQL 15.2").is_err());
        assert!(DbVersion::parse("Vertica Analytic Database vX.Y.Z").is_err());
    }
}
