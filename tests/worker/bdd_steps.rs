//! BDD step definitions for snapshot worker behaviour.

use ebs_snapper::{DeviceMapping, Instance, SnapshotOutcome, SnapshotWorker, VolumeMetadata};
use rstest_bdd_macros::{given, then, when};

use super::test_helpers::{RunOutcome, WorkerContext, build_settings, lifecycle_tags};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

fn pending_instance(worker_context: &mut WorkerContext) -> &mut Instance {
    worker_context
        .instance
        .as_mut()
        .unwrap_or_else(|| panic!("test setup requires an instance"))
}

#[given("an account with instance \"{instance_id}\" booting from \"{device}\" on \"{volume_id}\"")]
fn instance_with_boot_volume(
    mut worker_context: WorkerContext,
    instance_id: String,
    device: String,
    volume_id: String,
) -> WorkerContext {
    worker_context.instance = Some(
        Instance::new(instance_id.trim(), Some(device.trim()))
            .with_tags(lifecycle_tags())
            .with_mapping(DeviceMapping::ebs(device.trim(), volume_id.trim(), true)),
    );
    worker_context
        .api
        .add_volume(VolumeMetadata::new(volume_id.trim(), 8).with_tags(lifecycle_tags()));
    worker_context
}

#[given("an account with instance \"{instance_id}\" that only has ephemeral device \"{device}\"")]
fn instance_without_ebs(
    mut worker_context: WorkerContext,
    instance_id: String,
    device: String,
) -> WorkerContext {
    worker_context.instance = Some(
        Instance::new(instance_id.trim(), Some("/dev/sda1"))
            .with_tags(lifecycle_tags())
            .with_mapping(DeviceMapping::ephemeral(device.trim())),
    );
    worker_context
}

#[given("data volume \"{volume_id}\" attached at \"{device}\" named \"{name}\"")]
fn named_data_volume(
    mut worker_context: WorkerContext,
    volume_id: String,
    device: String,
    name: String,
) -> WorkerContext {
    attach_data_volume(&mut worker_context, volume_id.trim(), device.trim());
    worker_context.api.add_volume(
        VolumeMetadata::new(volume_id.trim(), 100)
            .with_tags(lifecycle_tags().with("Name", name.trim())),
    );
    worker_context
}

#[given("unnamed data volume \"{volume_id}\" attached at \"{device}\"")]
fn unnamed_data_volume(
    mut worker_context: WorkerContext,
    volume_id: String,
    device: String,
) -> WorkerContext {
    attach_data_volume(&mut worker_context, volume_id.trim(), device.trim());
    worker_context
        .api
        .add_volume(VolumeMetadata::new(volume_id.trim(), 20).with_tags(lifecycle_tags()));
    worker_context
}

fn attach_data_volume(worker_context: &mut WorkerContext, volume_id: &str, device: &str) {
    let instance = pending_instance(worker_context);
    let updated = instance
        .clone()
        .with_mapping(DeviceMapping::ebs(device, volume_id, false));
    *instance = updated;
}

fn run_worker(mut worker_context: WorkerContext, dry_run: bool) -> WorkerContext {
    if let Some(instance) = worker_context.instance.take() {
        worker_context.api.add_instance(instance);
    }
    let worker = SnapshotWorker::new(worker_context.api.clone(), build_settings(dry_run));
    worker_context.outcome = Some(match worker.run() {
        Ok(summary) => RunOutcome::Success(summary),
        Err(err) => RunOutcome::Failure(err.to_string()),
    });
    worker_context
}

#[when("I run the snapshot worker with dry run disabled")]
fn run_live(worker_context: WorkerContext) -> WorkerContext {
    run_worker(worker_context, false)
}

#[when("I run the snapshot worker in dry run mode")]
fn run_dry(worker_context: WorkerContext) -> WorkerContext {
    run_worker(worker_context, true)
}

#[then("{count:u32} snapshot is requested for \"{volume_id}\" tagged \"{name}\"")]
fn snapshot_requested(
    worker_context: &WorkerContext,
    count: u32,
    volume_id: String,
    name: String,
) -> Result<(), StepError> {
    let requests = worker_context.api.snapshot_requests();
    if requests.len() != count as usize {
        return Err(StepError::Assertion(format!(
            "expected {count} requests, got {requests:?}"
        )));
    }
    let matching = requests.iter().any(|request| {
        request.volume_id == volume_id.trim() && request.tags.get("Name") == Some(name.trim())
    });
    if matching {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "no request for {volume_id} tagged {name}: {requests:?}"
        )))
    }
}

#[then("no snapshot is requested")]
fn no_snapshot_requested(worker_context: &WorkerContext) -> Result<(), StepError> {
    let requests = worker_context.api.snapshot_requests();
    if requests.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected no requests, got {requests:?}"
        )))
    }
}

#[then("\"{volume_id}\" is reported as missing a Name tag")]
fn reported_missing_name(
    worker_context: &WorkerContext,
    volume_id: String,
) -> Result<(), StepError> {
    let summary = worker_context.summary();
    let reported = summary.instances.iter().any(|report| {
        report
            .selection
            .exceptions
            .iter()
            .any(|exception| exception.volume_id == volume_id.trim())
    });
    if reported {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected exception for {volume_id}, got {summary:?}"
        )))
    }
}

#[then("no volumes are described")]
fn no_volumes_described(worker_context: &WorkerContext) -> Result<(), StepError> {
    let calls = worker_context.api.describe_calls();
    if calls.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected no describe calls, got {calls:?}"
        )))
    }
}

#[then("the snapshot summary reports {count:u32} created")]
fn summary_reports_created(worker_context: &WorkerContext, count: u32) {
    assert_eq!(worker_context.summary().created(), count as usize);
}

#[then("the snapshot summary reports {count:u32} skipped instance")]
fn summary_reports_skipped(worker_context: &WorkerContext, count: u32) {
    assert_eq!(
        worker_context.summary().skipped_instances(),
        count as usize
    );
}

#[then("every snapshot outcome is a dry run without a snapshot id")]
fn dry_run_outcomes_only(worker_context: &WorkerContext) -> Result<(), StepError> {
    let summary = worker_context.summary();
    let outcomes: Vec<_> = summary.outcomes().collect();
    if outcomes.is_empty() {
        return Err(StepError::Assertion(String::from(
            "expected at least one dry-run outcome",
        )));
    }
    if outcomes
        .iter()
        .all(|outcome| matches!(outcome, SnapshotOutcome::DryRunAccepted))
        && summary.created() == 0
    {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected only accepted dry runs, got {outcomes:?}"
        )))
    }
}
