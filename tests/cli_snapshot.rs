//! End-to-end tests for `ebs-snapper snapshot` and `ebs-snapper plan`
//! against a fake `aws` executable.

#![cfg(unix)]

#[path = "common/fake_aws.rs"]
mod fake_aws;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use fake_aws::FakeAws;
use predicates::str::contains;

fn snapper(fake: &FakeAws) -> Command {
    let mut cmd = cargo_bin_cmd!("ebs-snapper");
    cmd.current_dir(fake.home())
        .env("HOME", fake.home())
        .env("XDG_CONFIG_HOME", fake.home())
        .env_remove("EBS_SNAPPER_CONFIG_PATH")
        .env_remove("EBS_SNAPPER_DRY_RUN")
        .env_remove("EBS_SNAPPER_COPY_TAGS")
        .env("EBS_SNAPPER_AWS_BIN", fake.bin())
        .env("RUST_LOG", "warn");
    cmd
}

#[test]
fn snapshot_defaults_to_dry_run() {
    let fake = FakeAws::install();

    snapper(&fake)
        .args(["snapshot", "--region", "eu-west-1"])
        .assert()
        .success()
        .stdout(contains("(dry run)"))
        .stdout(contains("candidates=1"))
        .stdout(contains("dry_run_accepted=1"))
        .stdout(contains("created=0"));

    let calls = fake.calls();
    assert_eq!(calls.len(), 3, "calls: {calls:?}");
    let create = calls
        .iter()
        .find(|line| line.contains("create-snapshot"))
        .unwrap_or_else(|| panic!("expected create-snapshot call: {calls:?}"));
    assert!(create.contains("--volume-id vol-2"), "{create}");
    assert!(create.contains("--dry-run"), "{create}");
    assert!(create.contains("db-backup"), "{create}");
    assert!(create.contains("--region eu-west-1"), "{create}");
}

#[test]
fn snapshot_execute_creates_snapshots() {
    let fake = FakeAws::install();

    snapper(&fake)
        .args(["snapshot", "--execute", "--description", "nightly"])
        .assert()
        .success()
        .stdout(contains("(live)"))
        .stdout(contains("created=1"));

    let calls = fake.calls();
    assert!(
        calls
            .iter()
            .any(|line| line.contains("--no-dry-run") && line.contains("--description nightly")),
        "calls: {calls:?}"
    );
}

#[test]
fn snapshot_failures_only_fail_the_run_on_request() {
    let fake = FakeAws::failing_create();

    snapper(&fake)
        .args(["snapshot", "--execute"])
        .assert()
        .success()
        .stdout(contains("failed=1"));

    snapper(&fake)
        .args(["snapshot", "--execute", "--fail-on-errors"])
        .assert()
        .code(1)
        .stdout(contains("failed=1"));
}

#[test]
fn plan_lists_classification_without_snapshot_calls() {
    let fake = FakeAws::install();

    snapper(&fake)
        .arg("plan")
        .assert()
        .success()
        .stdout(contains("i-1 (db-1)"))
        .stdout(contains("root vol-1 /dev/sda1 8GiB gp3"))
        .stdout(contains("snapshot vol-2 as \"db-backup\""));

    assert!(
        fake.calls()
            .iter()
            .all(|line| !line.contains("create-snapshot"))
    );
}

#[test]
fn listing_failure_exits_with_error() {
    let fake = FakeAws::install();

    snapper(&fake)
        .args(["plan", "--tag-key", "Backup"])
        .env("EBS_SNAPPER_AWS_BIN", fake.home().join("missing-aws"))
        .assert()
        .code(1)
        .stderr(contains("failed to list instances tagged Backup"));
}
