//! Workload CSV parsing and report writing

use super::{ReplayReportRow, WorkloadQuery};
use crate::error::{OpError, Result};
use std::io::{Read, Write};
use std::path::Path;

/// Exact header of a captured workload file.
pub const WORKLOAD_HEADERS: [&str; 7] = [
    "node_name",
    "session_id",
    "start_timestamp",
    "end_timestamp",
    "request",
    "request_duration_ms",
    "error_details",
];

/// Exact header of the replay report.
pub const REPORT_HEADERS: [&str; 6] = [
    "request",
    "original_duration_ms",
    "original_node_name",
    "replay_duration_ms",
    "replay_node_name",
    "error",
];

fn check_headers(found: &csv::StringRecord) -> Result<()> {
    let found: Vec<&str> = found.iter().collect();
    if found != WORKLOAD_HEADERS {
        return Err(OpError::Validation(format!(
            "unexpected workload CSV header {:?}; expected {:?}",
            found, WORKLOAD_HEADERS
        )));
    }
    Ok(())
}

/// Parse a captured workload from any reader, rejecting unknown headers.
pub fn read_workload_csv_from<R: Read>(reader: R) -> Result<Vec<WorkloadQuery>> {
    let mut csv_reader = csv::ReaderBuilder::new().from_reader(reader);
    let headers = csv_reader
        .headers()
        .map_err(|e| OpError::Parse(format!("cannot read workload CSV header: {e}")))?
        .clone();
    check_headers(&headers)?;

    let mut queries = Vec::new();
    for record in csv_reader.deserialize() {
        let query: WorkloadQuery =
            record.map_err(|e| OpError::Parse(format!("bad workload CSV row: {e}")))?;
        queries.push(query);
    }
    Ok(queries)
}

pub fn read_workload_csv(path: &Path) -> Result<Vec<WorkloadQuery>> {
    let file = std::fs::File::open(path)
        .map_err(|e| OpError::Validation(format!("cannot open workload file {path:?}: {e}")))?;
    read_workload_csv_from(file)
}

/// Serialize captured queries back to CSV, byte-stable for well-formed input.
pub fn write_workload_csv_to<W: Write>(writer: W, queries: &[WorkloadQuery]) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for query in queries {
        csv_writer
            .serialize(query)
            .map_err(|e| OpError::Parse(format!("cannot write workload CSV row: {e}")))?;
    }
    csv_writer
        .flush()
        .map_err(|e| OpError::Parse(format!("cannot flush workload CSV: {e}")))?;
    Ok(())
}

pub fn write_workload_csv(path: &Path, queries: &[WorkloadQuery]) -> Result<()> {
    let file = std::fs::File::create(path)
        .map_err(|e| OpError::Validation(format!("cannot create workload file {path:?}: {e}")))?;
    write_workload_csv_to(file, queries)
}

/// Write the aggregated replay report, one row per original query.
pub fn write_replay_report_to<W: Write>(writer: W, rows: &[ReplayReportRow]) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in rows {
        csv_writer
            .serialize(row)
            .map_err(|e| OpError::Parse(format!("cannot write replay report row: {e}")))?;
    }
    csv_writer
        .flush()
        .map_err(|e| OpError::Parse(format!("cannot flush replay report: {e}")))?;
    Ok(())
}

pub fn write_replay_report(path: &Path, rows: &[ReplayReportRow]) -> Result<()> {
    let file = std::fs::File::create(path)
        .map_err(|e| OpError::Validation(format!("cannot create report file {path:?}: {e}")))?;
    write_replay_report_to(file, rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
node_name,session_id,start_timestamp,end_timestamp,request,request_duration_ms,error_details
v_db_node0001,s1,2024-03-01T10:00:00.000000+00:00,2024-03-01T10:00:01.000000+00:00,SELECT 1,1000,
v_db_node0002,s2,2024-03-01T10:00:02.000000+00:00,2024-03-01T10:00:03.000000+00:00,\"INSERT INTO t VALUES (1)\",500,
";

    #[test]
    fn parses_well_formed_workload() {
        let queries = read_workload_csv_from(SAMPLE.as_bytes()).unwrap();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].session_id, "s1");
        assert_eq!(queries[1].request, "INSERT INTO t VALUES (1)");
        assert_eq!(queries[1].request_duration_ms, 500);
    }

    #[test]
    fn round_trips_well_formed_workload() {
        let queries = read_workload_csv_from(SAMPLE.as_bytes()).unwrap();
        let mut out = Vec::new();
        write_workload_csv_to(&mut out, &queries).unwrap();
        let reread = read_workload_csv_from(out.as_slice()).unwrap();
        assert_eq!(queries, reread);
    }

    #[test]
    fn rejects_unknown_header() {
        let bad = SAMPLE.replace("error_details", "err");
        let result = read_workload_csv_from(bad.as_bytes());
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("header"));
    }

    #[test]
    fn rejects_reordered_header() {
        let bad = SAMPLE.replace(
            "node_name,session_id",
            "session_id,node_name",
        );
        assert!(read_workload_csv_from(bad.as_bytes()).is_err());
    }

    #[test]
    fn report_has_expected_columns() {
        let rows = vec![ReplayReportRow {
            request: "SELECT 1".into(),
            original_duration_ms: 1000,
            original_node_name: "v_db_node0001".into(),
            replay_duration_ms: 900,
            replay_node_name: "v_db_node0003".into(),
            error: String::new(),
        }];
        let mut out = Vec::new();
        write_replay_report_to(&mut out, &rows).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with(&REPORT_HEADERS.join(",")));
        assert!(text.contains("SELECT 1,1000,v_db_node0001,900,v_db_node0003,"));
    }
}
