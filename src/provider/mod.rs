//! EC2 collaborator interface and its AWS CLI binding.
//!
//! The engine only talks to the provider through [`Ec2Api`]. [`AwsCli`]
//! implements it by shelling out to `aws ec2 ... --output json`, mirroring how
//! the operator would query the account by hand.

mod aws_cli;

use thiserror::Error;

use crate::command::CommandError;
use crate::model::{Instance, VolumeMetadata};
use crate::snapshot::SnapshotRequest;

pub use aws_cli::{AwsCli, AwsCliSettings, DEFAULT_AWS_BIN, DEFAULT_PROFILE};

/// Provider answer to a create-snapshot call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SnapshotResult {
    /// A snapshot was created.
    Created {
        /// Identifier of the new snapshot.
        snapshot_id: String,
        /// Initial snapshot state (normally `pending`).
        state: Option<String>,
    },
    /// Dry run: the request would have succeeded.
    DryRunAccepted,
    /// Dry run: the caller lacks permission to create the snapshot.
    DryRunDenied {
        /// Provider message explaining the denial.
        message: String,
    },
}

impl SnapshotResult {
    /// Snapshot identifier, present only when a snapshot was persisted.
    #[must_use]
    pub fn snapshot_id(&self) -> Option<&str> {
        match self {
            Self::Created { snapshot_id, .. } => Some(snapshot_id.as_str()),
            Self::DryRunAccepted | Self::DryRunDenied { .. } => None,
        }
    }
}

/// Errors raised by provider calls.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProviderError {
    /// Raised when the CLI cannot be started.
    #[error(transparent)]
    Command(#[from] CommandError),
    /// Raised when the API rejects a call with an error code.
    #[error("{operation} failed with {code}: {message}")]
    Api {
        /// API operation (for example `DescribeVolumes`).
        operation: String,
        /// Provider error code (for example `RequestLimitExceeded`).
        code: String,
        /// Provider error message.
        message: String,
    },
    /// Raised when the CLI fails without a recognisable API error.
    #[error("{program} exited with status {status_text}: {stderr}")]
    CommandFailure {
        /// Program that failed.
        program: String,
        /// Exit status reported by the OS.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the command.
        stderr: String,
    },
    /// Raised when JSON output cannot be decoded.
    #[error("failed to parse {operation} output: {message}")]
    Decode {
        /// CLI subcommand whose output was parsed.
        operation: String,
        /// Parser error message.
        message: String,
    },
    /// Raised when describe-volumes is asked for no volumes at all.
    #[error("describe-volumes requires at least one volume id")]
    EmptyVolumeIds,
}

/// Provider operations consumed by the snapshot engine.
///
/// Every call is a single blocking attempt; implementations do not retry.
pub trait Ec2Api {
    /// Lists instances whose `tag_key` tag holds one of `accepted`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on transport, authentication, or decoding
    /// failure. No match is an empty list, not an error.
    fn list_instances_by_tag(
        &self,
        tag_key: &str,
        accepted: &[&str],
    ) -> Result<Vec<Instance>, ProviderError>;

    /// Describes the given volumes. `volume_ids` must not be empty.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::EmptyVolumeIds`] for an empty id list and
    /// [`ProviderError`] on provider failure.
    fn describe_volumes(&self, volume_ids: &[String]) -> Result<Vec<VolumeMetadata>, ProviderError>;

    /// Submits one create-snapshot request.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the request fails for any reason other
    /// than a dry-run verdict.
    fn create_snapshot(&self, request: &SnapshotRequest) -> Result<SnapshotResult, ProviderError>;
}
