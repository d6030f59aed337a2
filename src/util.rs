//! Shared validation helpers and wire formats

use crate::error::{OpError, Result};
use chrono::{DateTime, FixedOffset};
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};

/// Timestamp format exchanged with the database: `YYYY-MM-DD HH:MM:SS.ffffff±ZZ`.
pub const DB_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f%#z";
/// Timestamp format used by workload queries: `YYYY-MM-DDTHH:MM:SS.ffffff±HH:MM`.
pub const WORKLOAD_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f%:z";

pub fn parse_db_time(s: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_str(s, DB_TIME_FORMAT)
        .map_err(|e| OpError::Parse(format!("invalid database timestamp {s:?}: {e}")))
}

pub fn parse_workload_time(s: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_str(s, WORKLOAD_TIME_FORMAT)
        .map_err(|e| OpError::Parse(format!("invalid workload timestamp {s:?}: {e}")))
}

pub fn format_workload_time(t: &DateTime<FixedOffset>) -> String {
    t.format(WORKLOAD_TIME_FORMAT).to_string()
}

/// Depot size is either `<int>%` with 0 ≤ int ≤ 100 or `<int>[KMGT]` with
/// int > 0.
pub fn validate_depot_size(size: &str) -> Result<()> {
    let size = size.trim();
    if size.is_empty() {
        return Err(OpError::Validation("depot size cannot be empty".into()));
    }
    if let Some(percent) = size.strip_suffix('%') {
        let value: i64 = percent.parse().map_err(|_| {
            OpError::Validation(format!("depot size {size:?} is not a valid percentage"))
        })?;
        if value < 0 {
            return Err(OpError::Validation(format!(
                "depot size percentage {value} cannot be negative"
            )));
        }
        if value > 100 {
            return Err(OpError::Validation(format!(
                "depot size percentage {value} is greater than 100%"
            )));
        }
        return Ok(());
    }
    let (digits, unit) = size.split_at(size.len() - 1);
    if !matches!(unit, "K" | "M" | "G" | "T") {
        return Err(OpError::Validation(format!(
            "depot size {size:?} must end in %, K, M, G or T"
        )));
    }
    let value: i64 = digits.parse().map_err(|_| {
        OpError::Validation(format!("depot size {size:?} is not a valid number"))
    })?;
    if value <= 0 {
        return Err(OpError::Validation(format!(
            "depot size {size:?} must be a positive number"
        )));
    }
    Ok(())
}

/// Path of the description file under communal storage. Duplicate slashes are
/// collapsed while `s3://` and `gs://` scheme prefixes stay intact.
pub fn cluster_config_path(communal: &str, db_name: &str, sandbox: &str) -> String {
    let joined = if sandbox.is_empty() {
        format!("{communal}/metadata/{db_name}/cluster_config.json")
    } else {
        format!("{communal}/metadata/{db_name}/{sandbox}/cluster_config.json")
    };
    collapse_slashes(&joined)
}

fn collapse_slashes(path: &str) -> String {
    let (scheme, rest) = match path.split_once("://") {
        Some((scheme, rest)) if matches!(scheme, "s3" | "gs") => {
            (Some(scheme), rest)
        }
        _ => (None, path),
    };
    let mut collapsed = String::with_capacity(rest.len());
    let mut prev_slash = false;
    for c in rest.chars() {
        if c == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        collapsed.push(c);
    }
    match scheme {
        Some(scheme) => format!("{scheme}://{collapsed}"),
        None => collapsed,
    }
}

/// Resolve raw user-supplied hosts to addresses of the requested family,
/// preserving input order. Numeric literals pass through untouched.
pub fn resolve_raw_hosts(raw_hosts: &[String], ipv6: bool) -> Result<Vec<String>> {
    let mut resolved = Vec::with_capacity(raw_hosts.len());
    for raw in raw_hosts {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(OpError::Validation("empty host name in host list".into()));
        }
        // numeric literals pass through, with or without an explicit port
        if trimmed.parse::<IpAddr>().is_ok() || trimmed.parse::<SocketAddr>().is_ok() {
            resolved.push(trimmed.to_string());
            continue;
        }
        let addr = (trimmed, 0u16)
            .to_socket_addrs()
            .map_err(|e| {
                OpError::Validation(format!("cannot resolve host {trimmed:?}: {e}"))
            })?
            .map(|sa| sa.ip())
            .find(|ip| ip.is_ipv6() == ipv6)
            .ok_or_else(|| {
                OpError::Validation(format!(
                    "host {trimmed:?} did not resolve to an {} address",
                    if ipv6 { "IPv6" } else { "IPv4" }
                ))
            })?;
        resolved.push(addr.to_string());
    }
    Ok(resolved)
}

/// Absolute-path check used for catalog/data/depot prefixes.
pub fn validate_absolute_path(path: &str, what: &str) -> Result<()> {
    if !path.starts_with('/') {
        return Err(OpError::Validation(format!(
            "{what} {path:?} must be an absolute path"
        )));
    }
    Ok(())
}

/// The operating-system user running the caller, used when a password is
/// given without a username.
pub fn current_os_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_else(|_| "dbadmin".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depot_size_accepts_percent_and_units() {
        assert!(validate_depot_size("50%").is_ok());
        assert!(validate_depot_size("0%").is_ok());
        assert!(validate_depot_size("100%").is_ok());
        assert!(validate_depot_size("10G").is_ok());
        assert!(validate_depot_size("1T").is_ok());
    }

    #[test]
    fn depot_size_rejects_out_of_range() {
        let err = validate_depot_size("101%").unwrap_err();
        assert!(err.to_string().contains("greater than 100%"));
        assert!(validate_depot_size("-5G").is_err());
        assert!(validate_depot_size("0M").is_err());
        assert!(validate_depot_size("10X").is_err());
        assert!(validate_depot_size("").is_err());
    }

    #[test]
    fn config_path_collapses_slashes_but_keeps_scheme() {
        assert_eq!(
            cluster_config_path("s3://bucket//prefix/", "testdb", ""),
            "s3://bucket/prefix/metadata/testdb/cluster_config.json"
        );
        assert_eq!(
            cluster_config_path("gs://bucket", "testdb", "sand1"),
            "gs://bucket/metadata/testdb/sand1/cluster_config.json"
        );
        assert_eq!(
            cluster_config_path("/communal//dir", "db", ""),
            "/communal/dir/metadata/db/cluster_config.json"
        );
    }

    #[test]
    fn timestamps_round_trip() {
        let t = parse_workload_time("2024-03-01T10:15:30.123456+01:00").unwrap();
        assert_eq!(format_workload_time(&t), "2024-03-01T10:15:30.123456+01:00");
        assert!(parse_workload_time("2024-03-01 10:15:30").is_err());
        assert!(parse_db_time("2024-03-01 10:15:30.000000+00").is_ok());
    }

    #[test]
    fn numeric_hosts_pass_through() {
        let hosts = vec!["10.0.0.1".to_string(), "::1".to_string()];
        assert_eq!(
            resolve_raw_hosts(&hosts, false).unwrap(),
            vec!["10.0.0.1", "::1"]
        );
        assert!(resolve_raw_hosts(&["".to_string()], false).is_err());
    }
}
