//! Snapshot engine for lifecycle-tagged EBS volumes.
//!
//! The crate lists EC2 instances carrying a lifecycle tag, splits each
//! instance's attached volumes into the boot volume and data volumes, picks
//! the data volumes that carry the tag themselves, and requests a snapshot of
//! each, tagged with the volume's `Name`.

pub mod classify;
pub mod command;
pub mod config;
pub mod logging;
pub mod model;
pub mod provider;
pub mod select;
pub mod snapshot;
pub mod tags;
pub mod test_support;
pub mod worker;

pub use classify::{ClassifiedVolumes, ClassifyError, DeviceIndex, is_root};
pub use command::{CommandError, CommandOutput, CommandRunner, ProcessCommandRunner};
pub use config::{ConfigError, SnapperConfig};
pub use model::{DeviceMapping, EbsAttachment, Instance, VolumeDescriptor, VolumeMetadata};
pub use provider::{AwsCli, AwsCliSettings, Ec2Api, ProviderError, SnapshotResult};
pub use select::{MissingNameTag, Selection, SnapshotCandidate};
pub use snapshot::{SnapshotOutcome, SnapshotReport, SnapshotRequest};
pub use tags::{LIFECYCLE_VALUES, NAME_TAG_KEY, TagSet};
pub use worker::{InstanceReport, InstanceStage, RunSummary, SnapshotWorker, WorkerError, WorkerSettings};
