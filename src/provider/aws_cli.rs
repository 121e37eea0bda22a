//! [`Ec2Api`] implementation backed by the AWS CLI.

use std::ffi::OsString;

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{Ec2Api, ProviderError, SnapshotResult};
use crate::command::{CommandOutput, CommandRunner, ProcessCommandRunner};
use crate::model::{Instance, VolumeMetadata};
use crate::snapshot::SnapshotRequest;

/// Default AWS CLI binary name.
pub const DEFAULT_AWS_BIN: &str = "aws";

/// Credentials profile used when none is configured.
pub const DEFAULT_PROFILE: &str = "default";

const DRY_RUN_OPERATION: &str = "DryRunOperation";
const UNAUTHORIZED_OPERATION: &str = "UnauthorizedOperation";

/// How to invoke the AWS CLI.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AwsCliSettings {
    /// Path to the `aws` executable.
    pub aws_bin: String,
    /// Named profile passed via `--profile`.
    pub profile: String,
    /// Region passed via `--region`; the CLI default applies when absent.
    pub region: Option<String>,
}

impl Default for AwsCliSettings {
    fn default() -> Self {
        Self {
            aws_bin: DEFAULT_AWS_BIN.to_owned(),
            profile: DEFAULT_PROFILE.to_owned(),
            region: None,
        }
    }
}

/// EC2 client that shells out to `aws ec2`.
#[derive(Clone, Debug)]
pub struct AwsCli<R: CommandRunner> {
    settings: AwsCliSettings,
    runner: R,
}

impl AwsCli<ProcessCommandRunner> {
    /// Creates a client wired to the real process runner.
    #[must_use]
    pub const fn with_process_runner(settings: AwsCliSettings) -> Self {
        Self::new(settings, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> AwsCli<R> {
    /// Creates a client using the provided settings and runner.
    #[must_use]
    pub const fn new(settings: AwsCliSettings, runner: R) -> Self {
        Self { settings, runner }
    }

    /// Returns the CLI settings.
    #[must_use]
    pub const fn settings(&self) -> &AwsCliSettings {
        &self.settings
    }

    /// Builds `ec2 <subcommand> <args...>` plus profile, region, and JSON
    /// output options.
    fn build_args(&self, subcommand: &str, extra: Vec<OsString>) -> Vec<OsString> {
        let mut args = vec![OsString::from("ec2"), OsString::from(subcommand)];
        args.extend(extra);
        args.push(OsString::from("--profile"));
        args.push(OsString::from(&self.settings.profile));
        if let Some(region) = &self.settings.region {
            args.push(OsString::from("--region"));
            args.push(OsString::from(region));
        }
        args.push(OsString::from("--output"));
        args.push(OsString::from("json"));
        args
    }

    fn run_ec2(&self, subcommand: &str, extra: Vec<OsString>) -> Result<CommandOutput, ProviderError> {
        let args = self.build_args(subcommand, extra);
        debug!(program = %self.settings.aws_bin, subcommand, "invoking aws cli");
        Ok(self.runner.run(&self.settings.aws_bin, &args)?)
    }

    /// Converts a failed invocation into the matching [`ProviderError`].
    fn failure(&self, output: &CommandOutput) -> ProviderError {
        parse_api_error(&output.stderr).map_or_else(
            || ProviderError::CommandFailure {
                program: self.settings.aws_bin.clone(),
                status: output.code,
                status_text: output.status_text(),
                stderr: output.stderr.trim().to_owned(),
            },
            ApiError::into_provider_error,
        )
    }

    fn run_json<T>(&self, subcommand: &str, extra: Vec<OsString>) -> Result<T, ProviderError>
    where
        T: serde::de::DeserializeOwned,
    {
        let output = self.run_ec2(subcommand, extra)?;
        if !output.is_success() {
            return Err(self.failure(&output));
        }
        serde_json::from_str::<T>(&output.stdout).map_err(|err| ProviderError::Decode {
            operation: subcommand.to_owned(),
            message: err.to_string(),
        })
    }
}

impl<R: CommandRunner> Ec2Api for AwsCli<R> {
    fn list_instances_by_tag(
        &self,
        tag_key: &str,
        accepted: &[&str],
    ) -> Result<Vec<Instance>, ProviderError> {
        let filters = json!([{ "Name": format!("tag:{tag_key}"), "Values": accepted }]);
        let output: DescribeInstancesOutput = self.run_json(
            "describe-instances",
            vec![
                OsString::from("--filters"),
                OsString::from(filters.to_string()),
            ],
        )?;
        Ok(output
            .reservations
            .into_iter()
            .flat_map(|reservation| reservation.instances)
            .collect())
    }

    fn describe_volumes(&self, volume_ids: &[String]) -> Result<Vec<VolumeMetadata>, ProviderError> {
        if volume_ids.is_empty() {
            return Err(ProviderError::EmptyVolumeIds);
        }
        let mut extra = vec![OsString::from("--volume-ids")];
        extra.extend(volume_ids.iter().map(OsString::from));
        let output: DescribeVolumesOutput = self.run_json("describe-volumes", extra)?;
        Ok(output.volumes)
    }

    fn create_snapshot(&self, request: &SnapshotRequest) -> Result<SnapshotResult, ProviderError> {
        let tag_specifications = json!([{
            "ResourceType": "snapshot",
            "Tags": request.tags.to_tags(),
        }]);
        let extra = vec![
            OsString::from("--volume-id"),
            OsString::from(&request.volume_id),
            OsString::from("--description"),
            OsString::from(&request.description),
            OsString::from("--tag-specifications"),
            OsString::from(tag_specifications.to_string()),
            OsString::from(if request.dry_run {
                "--dry-run"
            } else {
                "--no-dry-run"
            }),
        ];
        let output = self.run_ec2("create-snapshot", extra)?;

        if output.is_success() {
            if request.dry_run {
                return Err(ProviderError::Decode {
                    operation: String::from("create-snapshot"),
                    message: format!(
                        "dry run exited successfully instead of reporting {DRY_RUN_OPERATION}: {}",
                        output.stdout.trim()
                    ),
                });
            }
            let created: CreateSnapshotOutput =
                serde_json::from_str(&output.stdout).map_err(|err| ProviderError::Decode {
                    operation: String::from("create-snapshot"),
                    message: err.to_string(),
                })?;
            return Ok(SnapshotResult::Created {
                snapshot_id: created.snapshot_id,
                state: created.state,
            });
        }

        match parse_api_error(&output.stderr) {
            Some(api) if request.dry_run && api.code == DRY_RUN_OPERATION => {
                Ok(SnapshotResult::DryRunAccepted)
            }
            Some(api) if request.dry_run && api.code == UNAUTHORIZED_OPERATION => {
                Ok(SnapshotResult::DryRunDenied {
                    message: api.message,
                })
            }
            _ => Err(self.failure(&output)),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeInstancesOutput {
    #[serde(default)]
    reservations: Vec<Reservation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Reservation {
    #[serde(default)]
    instances: Vec<Instance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeVolumesOutput {
    #[serde(default)]
    volumes: Vec<VolumeMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateSnapshotOutput {
    snapshot_id: String,
    #[serde(default)]
    state: Option<String>,
}

/// Error reported by the CLI as
/// `An error occurred (<Code>) when calling the <Operation> operation: <msg>`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(super) struct ApiError {
    pub(super) code: String,
    pub(super) operation: String,
    pub(super) message: String,
}

impl ApiError {
    fn into_provider_error(self) -> ProviderError {
        ProviderError::Api {
            operation: self.operation,
            code: self.code,
            message: self.message,
        }
    }
}

pub(super) fn parse_api_error(stderr: &str) -> Option<ApiError> {
    let (_, after_marker) = stderr.split_once("An error occurred (")?;
    let (code, rest) = after_marker.split_once(')')?;
    let (operation, message) = rest
        .split_once("when calling the ")
        .and_then(|(_, tail)| tail.split_once(" operation"))
        .map_or_else(
            || ("", message_after(rest)),
            |(operation, tail)| (operation, message_after(skip_retry_note(tail))),
        );
    Some(ApiError {
        code: code.trim().to_owned(),
        operation: operation.trim().to_owned(),
        message: message.trim().to_owned(),
    })
}

/// Strips the `(reached max retries: N)` note the CLI inserts after the
/// operation name of retried calls.
fn skip_retry_note(tail: &str) -> &str {
    let trimmed = tail.trim_start();
    if trimmed.starts_with("(reached max retries") {
        trimmed.split_once(')').map_or(trimmed, |(_, after)| after)
    } else {
        trimmed
    }
}

fn message_after(text: &str) -> &str {
    text.split_once(": ").map_or("", |(_, message)| message)
}
