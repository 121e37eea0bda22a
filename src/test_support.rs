//! Test support utilities shared across unit and integration tests.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::rc::Rc;

use tokio::sync::{Mutex, MutexGuard};

use crate::command::{CommandError, CommandOutput, CommandRunner};
use crate::model::{Instance, VolumeMetadata};
use crate::provider::{Ec2Api, ProviderError, SnapshotResult};
use crate::snapshot::SnapshotRequest;
use crate::tags::matches;

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic AWS CLI outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Rc<RefCell<VecDeque<CommandOutput>>>,
    invocations: Rc<RefCell<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.invocations.borrow().clone()
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        self.responses.borrow_mut().push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }

    /// Pushes an AWS CLI API error in the format the CLI prints to stderr.
    pub fn push_api_error(&self, code: &str, operation: &str, message: &str) {
        self.push_output(
            Some(254),
            "",
            format!(
                "\nAn error occurred ({code}) when calling the {operation} operation: {message}\n"
            ),
        );
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, CommandError> {
        self.invocations.borrow_mut().push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        self.responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| CommandError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}

#[derive(Debug, Default)]
struct FakeState {
    instances: Vec<Instance>,
    volumes: BTreeMap<String, VolumeMetadata>,
    stray_volumes: Vec<VolumeMetadata>,
    list_failure: Option<String>,
    describe_failure: Option<String>,
    snapshot_failures: BTreeMap<String, String>,
    deny_dry_runs: bool,
    list_calls: Vec<String>,
    describe_calls: Vec<Vec<String>>,
    snapshot_requests: Vec<SnapshotRequest>,
}

/// In-memory [`Ec2Api`] that records every call.
///
/// Clones share state, so a test can keep a handle while the worker owns
/// another.
#[derive(Clone, Debug, Default)]
pub struct FakeEc2 {
    state: Rc<RefCell<FakeState>>,
}

impl FakeEc2 {
    /// Creates an empty account.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an instance; listing filters on its tags.
    pub fn add_instance(&self, instance: Instance) {
        self.state.borrow_mut().instances.push(instance);
    }

    /// Adds a volume answerable by describe.
    pub fn add_volume(&self, volume: VolumeMetadata) {
        self.state
            .borrow_mut()
            .volumes
            .insert(volume.volume_id.clone(), volume);
    }

    /// Appends `volume` to every describe answer even though nobody asked
    /// for it.
    pub fn add_stray_volume(&self, volume: VolumeMetadata) {
        self.state.borrow_mut().stray_volumes.push(volume);
    }

    /// Makes listing fail with the given error code.
    pub fn fail_list(&self, code: &str) {
        self.state.borrow_mut().list_failure = Some(code.to_owned());
    }

    /// Makes describe fail with the given error code.
    pub fn fail_describe(&self, code: &str) {
        self.state.borrow_mut().describe_failure = Some(code.to_owned());
    }

    /// Makes create-snapshot fail for one volume.
    pub fn fail_snapshot_for(&self, volume_id: &str, code: &str) {
        self.state
            .borrow_mut()
            .snapshot_failures
            .insert(volume_id.to_owned(), code.to_owned());
    }

    /// Answers dry runs with a permission denial.
    pub fn deny_dry_runs(&self) {
        self.state.borrow_mut().deny_dry_runs = true;
    }

    /// Tag keys passed to each listing call.
    #[must_use]
    pub fn list_calls(&self) -> Vec<String> {
        self.state.borrow().list_calls.clone()
    }

    /// Id sets passed to each describe call.
    #[must_use]
    pub fn describe_calls(&self) -> Vec<Vec<String>> {
        self.state.borrow().describe_calls.clone()
    }

    /// Every create-snapshot request received.
    #[must_use]
    pub fn snapshot_requests(&self) -> Vec<SnapshotRequest> {
        self.state.borrow().snapshot_requests.clone()
    }
}

fn api_error(operation: &str, code: &str) -> ProviderError {
    ProviderError::Api {
        operation: operation.to_owned(),
        code: code.to_owned(),
        message: String::from("simulated failure"),
    }
}

impl Ec2Api for FakeEc2 {
    fn list_instances_by_tag(
        &self,
        tag_key: &str,
        accepted: &[&str],
    ) -> Result<Vec<Instance>, ProviderError> {
        let mut state = self.state.borrow_mut();
        state.list_calls.push(tag_key.to_owned());
        if let Some(code) = &state.list_failure {
            return Err(api_error("DescribeInstances", code));
        }
        Ok(state
            .instances
            .iter()
            .filter(|instance| matches(&instance.tags, tag_key, accepted))
            .cloned()
            .collect())
    }

    fn describe_volumes(&self, volume_ids: &[String]) -> Result<Vec<VolumeMetadata>, ProviderError> {
        let mut state = self.state.borrow_mut();
        state.describe_calls.push(volume_ids.to_vec());
        if volume_ids.is_empty() {
            return Err(ProviderError::EmptyVolumeIds);
        }
        if let Some(code) = &state.describe_failure {
            return Err(api_error("DescribeVolumes", code));
        }
        let mut found: Vec<VolumeMetadata> = volume_ids
            .iter()
            .filter_map(|id| state.volumes.get(id).cloned())
            .collect();
        found.extend(state.stray_volumes.iter().cloned());
        Ok(found)
    }

    fn create_snapshot(&self, request: &SnapshotRequest) -> Result<SnapshotResult, ProviderError> {
        let mut state = self.state.borrow_mut();
        state.snapshot_requests.push(request.clone());
        if let Some(code) = state.snapshot_failures.get(&request.volume_id) {
            return Err(api_error("CreateSnapshot", code));
        }
        if request.dry_run {
            if state.deny_dry_runs {
                return Ok(SnapshotResult::DryRunDenied {
                    message: String::from("You are not authorized to perform this operation."),
                });
            }
            return Ok(SnapshotResult::DryRunAccepted);
        }
        Ok(SnapshotResult::Created {
            snapshot_id: format!("snap-{}", request.volume_id.trim_start_matches("vol-")),
            state: Some(String::from("pending")),
        })
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: Mutex<()> = Mutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}

/// Instance fixture: id, boot device, and `(device, volume)` mappings.
pub type InstanceSpec<'a> = (&'a str, Option<&'a str>, &'a [(&'a str, Option<&'a str>)]);

fn json_string(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

fn json_tags(tags: &[(&str, &str)]) -> String {
    tags.iter()
        .map(|(key, value)| {
            format!(
                "{{\"Key\":{},\"Value\":{}}}",
                json_string(key),
                json_string(value)
            )
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn json_instance((id, root, mappings): &InstanceSpec<'_>) -> String {
    let devices = mappings
        .iter()
        .map(|(device, volume)| match volume {
            Some(volume_id) => format!(
                "{{\"DeviceName\":{},\"Ebs\":{{\"VolumeId\":{},\"DeleteOnTermination\":true,\"Status\":\"attached\"}}}}",
                json_string(device),
                json_string(volume_id)
            ),
            None => format!("{{\"DeviceName\":{}}}", json_string(device)),
        })
        .collect::<Vec<_>>()
        .join(",");
    let root_field = root.map_or_else(String::new, |name| {
        format!("\"RootDeviceName\":{},", json_string(name))
    });
    format!(
        "{{\"InstanceId\":{},{root_field}\"BlockDeviceMappings\":[{devices}],\"Tags\":[{{\"Key\":\"Test\",\"Value\":\"daily\"}}]}}",
        json_string(id)
    )
}

/// Produces a payload matching `aws ec2 describe-instances --output json`,
/// one inner slice per reservation.
#[must_use]
pub fn json_instances(reservations: &[&[InstanceSpec<'_>]]) -> String {
    let items = reservations
        .iter()
        .map(|instances| {
            let body = instances
                .iter()
                .map(json_instance)
                .collect::<Vec<_>>()
                .join(",");
            format!("{{\"Instances\":[{body}]}}")
        })
        .collect::<Vec<_>>()
        .join(",");
    format!("{{\"Reservations\":[{items}]}}")
}

/// Produces a payload matching `aws ec2 describe-volumes --output json`.
#[must_use]
pub fn json_volumes(volumes: &[(&str, &[(&str, &str)])]) -> String {
    let items = volumes
        .iter()
        .map(|(id, tags)| {
            format!(
                "{{\"VolumeId\":{},\"Size\":8,\"VolumeType\":\"gp3\",\"Iops\":3000,\"Encrypted\":false,\"SnapshotId\":\"\",\"Tags\":[{}]}}",
                json_string(id),
                json_tags(tags)
            )
        })
        .collect::<Vec<_>>()
        .join(",");
    format!("{{\"Volumes\":[{items}]}}")
}
