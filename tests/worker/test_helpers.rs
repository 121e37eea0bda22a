//! Shared fixtures and helpers for snapshot worker BDD scenarios.

use ebs_snapper::test_support::FakeEc2;
use ebs_snapper::{Instance, RunSummary, TagSet, WorkerSettings};
use rstest::fixture;

#[derive(Clone, Debug)]
pub enum RunOutcome {
    Success(RunSummary),
    Failure(String),
}

#[derive(Clone, Debug)]
pub struct WorkerContext {
    pub api: FakeEc2,
    pub instance: Option<Instance>,
    pub outcome: Option<RunOutcome>,
}

#[fixture]
pub fn worker_context() -> WorkerContext {
    WorkerContext {
        api: FakeEc2::new(),
        instance: None,
        outcome: None,
    }
}

pub fn lifecycle_tags() -> TagSet {
    TagSet::new().with("Test", "daily")
}

pub fn build_settings(dry_run: bool) -> WorkerSettings {
    WorkerSettings {
        lifecycle_tag_key: String::from("Test"),
        description: String::from("Manufactured by MakeSnapshotWorker"),
        dry_run,
        copy_tags: Vec::new(),
    }
}

impl WorkerContext {
    pub fn summary(&self) -> &RunSummary {
        match self.outcome.as_ref() {
            Some(RunOutcome::Success(summary)) => summary,
            Some(RunOutcome::Failure(message)) => panic!("worker run failed: {message}"),
            None => panic!("worker has not run"),
        }
    }
}
