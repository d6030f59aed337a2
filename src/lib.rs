//! Cluster administration library for Eon-mode Vertica analytical databases
//!
//! This crate is the operation engine behind cluster commands: it executes
//! ordered pipelines of *cluster operations* against a fleet of database
//! hosts over HTTPS and the per-host node management agent (NMA). Each
//! operation fans a typed request out to a set of hosts, validates the
//! per-host responses and updates a shared execution context that downstream
//! operations consume.
//!
//! # Architecture
//!
//! - [`dispatcher`]: concurrent per-host request fanout with transport-level
//!   result classification
//! - [`op`] + [`engine`]: the operation contract (prepare / execute /
//!   finalize) and the strictly sequential engine that threads one
//!   [`context::ExecContext`] through an instruction list
//! - [`vdb`]: the in-memory cluster topology snapshot with the filters and
//!   deterministic initiator selection every command relies on
//! - [`poller`]: the waiting contract for operations that watch cluster
//!   state converge
//! - [`ops`]: the operation set, one module per operation
//! - [`commands`]: workflow composers that turn validated options into
//!   instruction lists (create, stop, revive, sandbox, replicate, …)
//! - [`workload`]: workload capture CSV handling and the session replay
//!   scheduler with dependency-DAG concurrency
//!
//! # Example
//!
//! ```no_run
//! use vertica_clusterops::commands::{DatabaseOptions, stop_db::{StopDbOptions, stop_db}};
//!
//! # async fn example() -> vertica_clusterops::Result<()> {
//! let mut options = StopDbOptions::builder()
//!     .base(
//!         DatabaseOptions::builder()
//!             .db_name("analytics")
//!             .raw_hosts(vec!["10.0.0.1".into(), "10.0.0.2".into()])
//!             .username("dbadmin")
//!             .password("secret")
//!             .build(),
//!     )
//!     .check_user_conn(true)
//!     .build();
//! stop_db(&mut options).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Every failure is an [`OpError`] preserving the causal chain
//! `<composer>: <operation>: <per-host joined cause>`. Structured variants
//! (`ActiveSessions`, `RestorePointNotFound`, `SubclusterNotSandboxed`,
//! `ClusterLeaseNotExpired`, …) are exported so callers can pattern-match,
//! and `is_*` helpers classify wrapped errors without unpacking them.

pub mod catalog;
pub mod commands;
pub mod context;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod op;
pub mod ops;
pub mod poller;
pub mod util;
pub mod vdb;
pub mod version;
pub mod workload;

// Core engine types
pub use context::ExecContext;
pub use engine::ClusterOpEngine;
pub use op::{ClusterOp, OpBase};

// Transport
pub use dispatcher::{
    Dispatcher, DispatcherConfig, HostRequest, HostResult, Method, Service, TlsOptions,
};

// Errors
pub use error::{OpError, Result, SessionDetail};

// Topology model
pub use vdb::{NodeState, RestorePoint, SubclusterInfo, VNode, Vdb};

// Catalog editor & epochs
pub use catalog::{EpochReport, NmaVDatabase, calculate_last_good_epoch};

// Versions
pub use version::DbVersion;

// Composer options
pub use commands::DatabaseOptions;
pub use commands::create_db::CreateDbOptions;
pub use commands::revive_db::{RestorePointSpec, ReviveDbOptions};
pub use commands::stop_db::StopDbOptions;

// Workload replay
pub use workload::{ReplayReportRow, WorkloadQuery};
