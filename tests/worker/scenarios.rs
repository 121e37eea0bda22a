//! BDD scenarios for the snapshot worker.

use rstest_bdd_macros::scenario;

use super::test_helpers::{WorkerContext, worker_context};

#[scenario(
    path = "tests/features/snapshot_worker.feature",
    name = "Snapshot a named data volume and leave the boot volume alone"
)]
fn scenario_snapshot_named_volume(worker_context: WorkerContext) {
    let _ = worker_context;
}

#[scenario(
    path = "tests/features/snapshot_worker.feature",
    name = "Report lifecycle-tagged data volumes without a Name tag"
)]
fn scenario_report_missing_name(worker_context: WorkerContext) {
    let _ = worker_context;
}

#[scenario(
    path = "tests/features/snapshot_worker.feature",
    name = "Skip instances without EBS-backed devices"
)]
fn scenario_skip_without_ebs(worker_context: WorkerContext) {
    let _ = worker_context;
}

#[scenario(
    path = "tests/features/snapshot_worker.feature",
    name = "Dry runs never produce snapshot ids"
)]
fn scenario_dry_run_only(worker_context: WorkerContext) {
    let _ = worker_context;
}
