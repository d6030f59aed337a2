//! Engine contract tests: lifecycle ordering and skip semantics

mod common;

use async_trait::async_trait;
use common::test_config;
use std::sync::{Arc, Mutex};
use vertica_clusterops::context::ExecContext;
use vertica_clusterops::error::{OpError, Result};
use vertica_clusterops::op::{ClusterOp, OpBase};
use vertica_clusterops::{ClusterOpEngine, TlsOptions};

type EventLog = Arc<Mutex<Vec<String>>>;

/// A recording operation that optionally fails at a chosen phase.
struct RecordingOp {
    base: OpBase,
    log: EventLog,
    label: &'static str,
    fail_in_prepare: bool,
    fail_in_execute: bool,
    skip: bool,
}

impl RecordingOp {
    fn new(label: &'static str, log: EventLog) -> Self {
        RecordingOp {
            base: OpBase::new("recording_op"),
            log,
            label,
            fail_in_prepare: false,
            fail_in_execute: false,
            skip: false,
        }
    }

    fn record(&self, phase: &str) {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{}", self.label, phase));
    }
}

#[async_trait]
impl ClusterOp for RecordingOp {
    fn base(&self) -> &OpBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OpBase {
        &mut self.base
    }

    fn description(&self) -> String {
        format!("recording op {}", self.label)
    }

    async fn prepare(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        self.record("prepare");
        if self.fail_in_prepare {
            return Err(OpError::Validation("prepare exploded".into()));
        }
        if self.skip {
            self.base.skip_execute = true;
        }
        Ok(())
    }

    async fn execute(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        self.record("execute");
        if self.fail_in_execute {
            return Err(OpError::Internal("execute exploded".into()));
        }
        Ok(())
    }

    async fn finalize(&mut self, _ctx: &mut ExecContext) -> Result<()> {
        self.record("finalize");
        Ok(())
    }
}

fn engine() -> ClusterOpEngine {
    ClusterOpEngine::new(test_config(), TlsOptions::default())
}

#[tokio::test]
async fn phases_run_in_order_per_instruction() {
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let mut instructions: Vec<Box<dyn ClusterOp>> = vec![
        Box::new(RecordingOp::new("a", log.clone())),
        Box::new(RecordingOp::new("b", log.clone())),
    ];
    engine().run(&mut instructions).await.unwrap();
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "a:prepare",
            "a:execute",
            "a:finalize",
            "b:prepare",
            "b:execute",
            "b:finalize",
        ]
    );
}

#[tokio::test]
async fn prepare_failure_aborts_and_is_labeled() {
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let mut failing = RecordingOp::new("a", log.clone());
    failing.fail_in_prepare = true;
    let mut instructions: Vec<Box<dyn ClusterOp>> = vec![
        Box::new(failing),
        Box::new(RecordingOp::new("b", log.clone())),
    ];
    let err = engine().run(&mut instructions).await.unwrap_err();
    assert!(err.to_string().starts_with("prepare recording_op failed:"));
    // nothing after the failing prepare runs, including its own execute
    assert_eq!(*log.lock().unwrap(), vec!["a:prepare"]);
}

#[tokio::test]
async fn finalize_runs_even_when_execute_fails() {
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let mut failing = RecordingOp::new("a", log.clone());
    failing.fail_in_execute = true;
    let mut instructions: Vec<Box<dyn ClusterOp>> = vec![
        Box::new(failing),
        Box::new(RecordingOp::new("b", log.clone())),
    ];
    let err = engine().run(&mut instructions).await.unwrap_err();
    assert!(err.to_string().contains("execute exploded"));
    assert_eq!(
        *log.lock().unwrap(),
        vec!["a:prepare", "a:execute", "a:finalize"]
    );
}

#[tokio::test]
async fn skip_execute_still_finalizes() {
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let mut skipping = RecordingOp::new("a", log.clone());
    skipping.skip = true;
    let mut instructions: Vec<Box<dyn ClusterOp>> = vec![
        Box::new(skipping),
        Box::new(RecordingOp::new("b", log.clone())),
    ];
    engine().run(&mut instructions).await.unwrap();
    assert_eq!(
        *log.lock().unwrap(),
        vec!["a:prepare", "a:finalize", "b:prepare", "b:execute", "b:finalize"]
    );
}

#[tokio::test]
async fn run_in_sandbox_seeds_the_context() {
    struct SandboxProbe {
        base: OpBase,
        seen: Arc<Mutex<Option<(String, bool)>>>,
    }

    #[async_trait]
    impl ClusterOp for SandboxProbe {
        fn base(&self) -> &OpBase {
            &self.base
        }
        fn base_mut(&mut self) -> &mut OpBase {
            &mut self.base
        }
        fn description(&self) -> String {
            "probe the seeded sandbox context".into()
        }
        async fn prepare(&mut self, ctx: &mut ExecContext) -> Result<()> {
            *self.seen.lock().unwrap() =
                Some((ctx.sandbox.clone(), ctx.vdb_for_sandbox_info.is_some()));
            self.base.skip_execute = true;
            Ok(())
        }
        async fn execute(&mut self, _ctx: &mut ExecContext) -> Result<()> {
            Ok(())
        }
    }

    let seen = Arc::new(Mutex::new(None));
    let mut instructions: Vec<Box<dyn ClusterOp>> = vec![Box::new(SandboxProbe {
        base: OpBase::new("sandbox_probe"),
        seen: seen.clone(),
    })];
    engine()
        .run_in_sandbox(
            &mut instructions,
            vertica_clusterops::Vdb::default(),
            "sand1",
        )
        .await
        .unwrap();
    assert_eq!(
        seen.lock().unwrap().clone(),
        Some(("sand1".to_string(), true))
    );
}
