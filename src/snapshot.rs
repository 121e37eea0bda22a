//! Snapshot request construction and submission.

use tracing::{error, info, warn};

use crate::provider::{Ec2Api, ProviderError, SnapshotResult};
use crate::select::SnapshotCandidate;
use crate::tags::{NAME_TAG_KEY, TagSet};

/// One create-snapshot call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SnapshotRequest {
    /// Volume to snapshot.
    pub volume_id: String,
    /// Snapshot description, fixed for the run.
    pub description: String,
    /// Tags applied to the snapshot; always contains `Name`.
    pub tags: TagSet,
    /// Validate only, without creating a snapshot.
    pub dry_run: bool,
}

impl SnapshotRequest {
    /// Builds the request for `candidate`, propagating its display name as
    /// the `Name` tag along with any copied volume tags.
    #[must_use]
    pub fn for_candidate(candidate: &SnapshotCandidate, description: &str, dry_run: bool) -> Self {
        let mut tags: TagSet = candidate
            .copied_tags
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect();
        tags.insert(NAME_TAG_KEY, candidate.display_name.as_str());
        Self {
            volume_id: candidate.volume_id.clone(),
            description: description.to_owned(),
            tags,
            dry_run,
        }
    }
}

/// Terminal outcome for one candidate.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SnapshotOutcome {
    /// The snapshot was created.
    Created {
        /// New snapshot identifier.
        snapshot_id: String,
    },
    /// Dry run validated successfully.
    DryRunAccepted,
    /// Dry run was refused for lack of permission.
    DryRunDenied {
        /// Provider explanation.
        message: String,
    },
    /// The request failed; other candidates are unaffected.
    Failed {
        /// Provider failure.
        error: ProviderError,
    },
}

impl SnapshotOutcome {
    /// Returns `true` for [`SnapshotOutcome::Failed`].
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl From<SnapshotResult> for SnapshotOutcome {
    fn from(value: SnapshotResult) -> Self {
        match value {
            SnapshotResult::Created { snapshot_id, .. } => Self::Created { snapshot_id },
            SnapshotResult::DryRunAccepted => Self::DryRunAccepted,
            SnapshotResult::DryRunDenied { message } => Self::DryRunDenied { message },
        }
    }
}

/// Candidate together with what happened to its request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SnapshotReport {
    /// Volume the request targeted.
    pub volume_id: String,
    /// Name propagated to the snapshot.
    pub display_name: String,
    /// Outcome of the single attempt.
    pub outcome: SnapshotOutcome,
}

/// Issues one create-snapshot call per candidate, in order.
///
/// A failing call is recorded and the next candidate is still attempted.
pub fn request_snapshots<P: Ec2Api>(
    api: &P,
    candidates: &[SnapshotCandidate],
    description: &str,
    dry_run: bool,
) -> Vec<SnapshotReport> {
    candidates
        .iter()
        .map(|candidate| {
            let request = SnapshotRequest::for_candidate(candidate, description, dry_run);
            let outcome = submit(api, &request);
            SnapshotReport {
                volume_id: candidate.volume_id.clone(),
                display_name: candidate.display_name.clone(),
                outcome,
            }
        })
        .collect()
}

fn submit<P: Ec2Api>(api: &P, request: &SnapshotRequest) -> SnapshotOutcome {
    let outcome = match api.create_snapshot(request) {
        Ok(result) => SnapshotOutcome::from(result),
        Err(err) => SnapshotOutcome::Failed { error: err },
    };
    let volume_id = request.volume_id.as_str();
    match &outcome {
        SnapshotOutcome::Created { snapshot_id } => {
            info!(volume_id, snapshot_id = %snapshot_id, "snapshot created");
        }
        SnapshotOutcome::DryRunAccepted => info!(volume_id, "dry run: snapshot would be created"),
        SnapshotOutcome::DryRunDenied { message } => {
            warn!(volume_id, %message, "dry run: snapshot creation not permitted");
        }
        SnapshotOutcome::Failed { error: err } => {
            error!(volume_id, error = %err, "snapshot request failed");
        }
    }
    outcome
}
