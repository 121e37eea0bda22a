//! Orchestrates one snapshot run over every lifecycle-tagged instance.
//!
//! Each instance moves linearly through [`InstanceStage`]: its devices are
//! indexed, volumes described and classified, candidates selected, and
//! snapshot requests issued. Instances are processed one after another and
//! share no state.

use serde::Serialize;
use thiserror::Error;
use tracing::{info, info_span, warn};

use crate::classify::{ClassifyError, DeviceIndex, classify_instance};
use crate::config::SnapperConfig;
use crate::model::{Instance, VolumeDescriptor};
use crate::provider::{Ec2Api, ProviderError};
use crate::select::{Selection, select_candidates};
use crate::snapshot::{SnapshotOutcome, SnapshotReport, request_snapshots};
use crate::tags::LIFECYCLE_VALUES;

/// Settings the worker needs from the loaded configuration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WorkerSettings {
    /// Lifecycle tag key.
    pub lifecycle_tag_key: String,
    /// Snapshot description.
    pub description: String,
    /// Dry-run flag for create-snapshot.
    pub dry_run: bool,
    /// Extra volume tags copied onto snapshots.
    pub copy_tags: Vec<String>,
}

impl From<&SnapperConfig> for WorkerSettings {
    fn from(value: &SnapperConfig) -> Self {
        Self {
            lifecycle_tag_key: value.lifecycle_tag_key.trim().to_owned(),
            description: value.description.clone(),
            dry_run: value.dry_run,
            copy_tags: value.copy_tag_keys(),
        }
    }
}

/// Last stage an instance reached.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceStage {
    /// Listed by the provider.
    Discover,
    /// Device mappings indexed; terminal when no EBS device exists.
    IndexDevices,
    /// Volumes described and split into root and data.
    ClassifyVolumes,
    /// Snapshot candidates chosen; terminal in plan mode.
    SelectCandidates,
    /// Snapshot requests issued.
    RequestSnapshots,
    /// Processing finished.
    Done,
}

/// What happened to one instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceReport {
    /// Instance identifier.
    pub instance_id: String,
    /// Instance `Name` tag.
    pub name: Option<String>,
    /// Stage at which processing stopped.
    pub stage: InstanceStage,
    /// Boot volume.
    pub root: Option<VolumeDescriptor>,
    /// Data volumes.
    pub data: Vec<VolumeDescriptor>,
    /// Candidates and exception records.
    pub selection: Selection,
    /// Per-candidate snapshot outcomes; empty in plan mode.
    pub snapshots: Vec<SnapshotReport>,
}

impl InstanceReport {
    fn discovered(instance: &Instance) -> Self {
        Self {
            instance_id: instance.id.clone(),
            name: instance.name().map(str::to_owned),
            stage: InstanceStage::Discover,
            root: None,
            data: Vec::new(),
            selection: Selection::default(),
            snapshots: Vec::new(),
        }
    }
}

/// Aggregated result of a run.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RunSummary {
    /// One report per listed instance, in listing order.
    pub instances: Vec<InstanceReport>,
}

impl RunSummary {
    /// Instances without any EBS-backed device.
    #[must_use]
    pub fn skipped_instances(&self) -> usize {
        self.instances
            .iter()
            .filter(|report| report.stage == InstanceStage::IndexDevices)
            .count()
    }

    /// Total snapshot candidates.
    #[must_use]
    pub fn candidates(&self) -> usize {
        self.instances
            .iter()
            .map(|report| report.selection.candidates.len())
            .sum()
    }

    /// Total exception records.
    #[must_use]
    pub fn exceptions(&self) -> usize {
        self.instances
            .iter()
            .map(|report| report.selection.exceptions.len())
            .sum()
    }

    /// All snapshot outcomes across instances.
    pub fn outcomes(&self) -> impl Iterator<Item = &SnapshotOutcome> {
        self.instances
            .iter()
            .flat_map(|report| report.snapshots.iter().map(|snapshot| &snapshot.outcome))
    }

    /// Snapshots actually created.
    #[must_use]
    pub fn created(&self) -> usize {
        self.outcomes()
            .filter(|outcome| matches!(outcome, SnapshotOutcome::Created { .. }))
            .count()
    }

    /// Dry runs the provider accepted.
    #[must_use]
    pub fn dry_run_accepted(&self) -> usize {
        self.outcomes()
            .filter(|outcome| matches!(outcome, SnapshotOutcome::DryRunAccepted))
            .count()
    }

    /// Dry runs refused for lack of permission.
    #[must_use]
    pub fn dry_run_denied(&self) -> usize {
        self.outcomes()
            .filter(|outcome| matches!(outcome, SnapshotOutcome::DryRunDenied { .. }))
            .count()
    }

    /// Snapshot requests that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes().filter(|outcome| outcome.is_failure()).count()
    }
}

/// Fatal errors that abort a run.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum WorkerError {
    /// Raised when instances cannot be listed.
    #[error("failed to list instances tagged {tag_key}: {source}")]
    List {
        /// Lifecycle tag key used for the listing.
        tag_key: String,
        /// Provider failure.
        #[source]
        source: ProviderError,
    },
    /// Raised when an instance's volumes cannot be classified.
    #[error(transparent)]
    Classify(#[from] ClassifyError),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Mode {
    Snapshot,
    Plan,
}

/// Runs discovery, classification, selection, and snapshot requests.
#[derive(Clone, Debug)]
pub struct SnapshotWorker<P: Ec2Api> {
    api: P,
    settings: WorkerSettings,
}

impl<P: Ec2Api> SnapshotWorker<P> {
    /// Creates a worker over the given provider client.
    #[must_use]
    pub const fn new(api: P, settings: WorkerSettings) -> Self {
        Self { api, settings }
    }

    /// Returns the worker settings.
    #[must_use]
    pub const fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    /// Processes every tagged instance and issues snapshot requests.
    ///
    /// Per-candidate snapshot failures are reported in the summary and do
    /// not stop the run.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError`] when listing or describing fails, or when the
    /// provider describes a volume that no device mapping references.
    pub fn run(&self) -> Result<RunSummary, WorkerError> {
        self.execute(Mode::Snapshot)
    }

    /// Like [`SnapshotWorker::run`] but stops after candidate selection, so no
    /// create-snapshot call is made.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError`] under the same conditions as
    /// [`SnapshotWorker::run`].
    pub fn plan(&self) -> Result<RunSummary, WorkerError> {
        self.execute(Mode::Plan)
    }

    fn execute(&self, mode: Mode) -> Result<RunSummary, WorkerError> {
        let tag_key = self.settings.lifecycle_tag_key.as_str();
        let instances = self
            .api
            .list_instances_by_tag(tag_key, &LIFECYCLE_VALUES)
            .map_err(|source| WorkerError::List {
                tag_key: tag_key.to_owned(),
                source,
            })?;
        info!(tag_key, count = instances.len(), "discovered tagged instances");

        let mut summary = RunSummary::default();
        for instance in &instances {
            summary.instances.push(self.process(instance, mode)?);
        }
        Ok(summary)
    }

    fn process(&self, instance: &Instance, mode: Mode) -> Result<InstanceReport, WorkerError> {
        let _span = info_span!("instance", instance_id = %instance.id).entered();
        let mut report = InstanceReport::discovered(instance);

        report.stage = InstanceStage::IndexDevices;
        let index = DeviceIndex::build(&instance.block_device_mappings);
        if index.is_empty() {
            warn!("no EBS-backed devices; skipping instance");
            return Ok(report);
        }

        let classification = classify_instance(&self.api, instance, &index)?;
        report.stage = InstanceStage::ClassifyVolumes;
        report.root = classification.volumes.root;
        report.data = classification.volumes.data;

        report.selection = select_candidates(
            &report.data,
            &classification.metadata,
            &self.settings.lifecycle_tag_key,
            &self.settings.copy_tags,
        );
        report.stage = InstanceStage::SelectCandidates;
        for exception in &report.selection.exceptions {
            warn!(
                volume_id = %exception.volume_id,
                lifecycle = %exception.lifecycle,
                "volume carries the lifecycle tag but no Name tag; not snapshotting"
            );
        }
        for volume_id in &report.selection.untagged {
            warn!(
                volume_id = %volume_id,
                "volume missing from the describe answer; not snapshotting"
            );
        }
        info!(
            data_volumes = report.data.len(),
            candidates = report.selection.candidates.len(),
            "selected snapshot candidates"
        );
        if mode == Mode::Plan {
            return Ok(report);
        }

        report.stage = InstanceStage::RequestSnapshots;
        report.snapshots = request_snapshots(
            &self.api,
            &report.selection.candidates,
            &self.settings.description,
            self.settings.dry_run,
        );
        report.stage = InstanceStage::Done;
        Ok(report)
    }
}
