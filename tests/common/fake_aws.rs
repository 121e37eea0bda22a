//! Fake `aws` executable for driving the CLI end to end.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

const DESCRIBE_INSTANCES: &str = r#"{"Reservations":[{"Instances":[{"InstanceId":"i-1","RootDeviceName":"/dev/sda1","BlockDeviceMappings":[{"DeviceName":"/dev/sda1","Ebs":{"VolumeId":"vol-1","DeleteOnTermination":true}},{"DeviceName":"/dev/sdf","Ebs":{"VolumeId":"vol-2","DeleteOnTermination":false}}],"Tags":[{"Key":"Test","Value":"daily"},{"Key":"Name","Value":"db-1"}]}]}]}"#;

const DESCRIBE_VOLUMES: &str = r#"{"Volumes":[{"VolumeId":"vol-1","Size":8,"VolumeType":"gp3","Encrypted":false,"SnapshotId":""},{"VolumeId":"vol-2","Size":100,"VolumeType":"gp3","Encrypted":true,"SnapshotId":"","Tags":[{"Key":"Test","Value":"daily"},{"Key":"Name","Value":"db-backup"}]}]}"#;

/// Temporary directory holding an executable `aws` script and its call log.
pub struct FakeAws {
    dir: TempDir,
}

impl FakeAws {
    /// Writes a script answering describe calls with one tagged instance and
    /// accepting create-snapshot requests.
    pub fn install() -> Self {
        Self::with_create_snapshot(
            r#"echo '{"SnapshotId":"snap-0abc","State":"pending"}'"#,
        )
    }

    /// Like [`FakeAws::install`] but every live create-snapshot call fails.
    pub fn failing_create() -> Self {
        Self::with_create_snapshot(
            "echo 'An error occurred (InternalError) when calling the CreateSnapshot operation: boom' >&2\n    exit 254",
        )
    }

    fn with_create_snapshot(live_create: &str) -> Self {
        let dir = TempDir::new().unwrap_or_else(|err| panic!("create temp dir: {err}"));
        let log = dir.path().join("calls.log");
        let script = format!(
            r#"#!/bin/sh
echo "$@" >> '{log}'
case "$2" in
  describe-instances)
    echo '{DESCRIBE_INSTANCES}'
    ;;
  describe-volumes)
    echo '{DESCRIBE_VOLUMES}'
    ;;
  create-snapshot)
    for arg in "$@"; do
      if [ "$arg" = "--dry-run" ]; then
        echo 'An error occurred (DryRunOperation) when calling the CreateSnapshot operation: Request would have succeeded, but DryRun flag is set.' >&2
        exit 254
      fi
    done
    {live_create}
    ;;
  *)
    echo "unexpected call: $*" >&2
    exit 2
    ;;
esac
"#,
            log = log.display(),
        );
        let path = dir.path().join("aws");
        fs::write(&path, script).unwrap_or_else(|err| panic!("write fake aws: {err}"));
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
            .unwrap_or_else(|err| panic!("chmod fake aws: {err}"));
        Self { dir }
    }

    /// Path of the fake executable.
    pub fn bin(&self) -> PathBuf {
        self.dir.path().join("aws")
    }

    /// Directory used as working directory and home for the CLI under test.
    pub fn home(&self) -> &Path {
        self.dir.path()
    }

    /// Argument lines the fake received, one per invocation.
    pub fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.dir.path().join("calls.log"))
            .map(|log| log.lines().map(str::to_owned).collect())
            .unwrap_or_default()
    }
}
