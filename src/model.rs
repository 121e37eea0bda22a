//! Provider resources consumed by the snapshot engine.
//!
//! The structs decode directly from the JSON emitted by
//! `aws ec2 describe-instances` and `aws ec2 describe-volumes`; fields the
//! engine does not need are ignored.

use serde::{Deserialize, Deserializer};

use crate::tags::{NAME_TAG_KEY, TagSet};

/// A compute instance selected by the lifecycle tag.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Instance {
    /// Provider instance identifier.
    #[serde(rename = "InstanceId")]
    pub id: String,
    /// Device name of the boot volume, when the provider reports one.
    #[serde(default)]
    pub root_device_name: Option<String>,
    /// Block devices in the order the provider lists them.
    #[serde(default)]
    pub block_device_mappings: Vec<DeviceMapping>,
    /// Instance tags.
    #[serde(default)]
    pub tags: TagSet,
}

impl Instance {
    /// Creates an instance with no devices and no tags.
    #[must_use]
    pub fn new(id: impl Into<String>, root_device_name: Option<&str>) -> Self {
        Self {
            id: id.into(),
            root_device_name: root_device_name.map(str::to_owned),
            block_device_mappings: Vec::new(),
            tags: TagSet::new(),
        }
    }

    /// Appends a device mapping, returning the updated instance.
    #[must_use]
    pub fn with_mapping(mut self, mapping: DeviceMapping) -> Self {
        self.block_device_mappings.push(mapping);
        self
    }

    /// Replaces the instance tags, returning the updated instance.
    #[must_use]
    pub fn with_tags(mut self, tags: TagSet) -> Self {
        self.tags = tags;
        self
    }

    /// The instance `Name` tag, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.tags.get(NAME_TAG_KEY)
    }
}

/// Association between a device name on an instance and a backing volume.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceMapping {
    /// Device name as seen by the instance (for example `/dev/sda1`).
    #[serde(default)]
    pub device_name: Option<String>,
    /// EBS backing volume; absent for instance-store and ephemeral devices.
    #[serde(default)]
    pub ebs: Option<EbsAttachment>,
}

impl DeviceMapping {
    /// Mapping backed by an EBS volume.
    #[must_use]
    pub fn ebs(
        device_name: impl Into<String>,
        volume_id: impl Into<String>,
        delete_on_termination: bool,
    ) -> Self {
        Self {
            device_name: Some(device_name.into()),
            ebs: Some(EbsAttachment {
                volume_id: volume_id.into(),
                delete_on_termination,
            }),
        }
    }

    /// Mapping without a backing volume.
    #[must_use]
    pub fn ephemeral(device_name: impl Into<String>) -> Self {
        Self {
            device_name: Some(device_name.into()),
            ebs: None,
        }
    }
}

/// EBS side of a device mapping.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct EbsAttachment {
    /// Attached volume identifier.
    pub volume_id: String,
    /// Whether the volume is deleted when the instance terminates.
    #[serde(default)]
    pub delete_on_termination: bool,
}

/// Volume attributes returned by the describe call.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct VolumeMetadata {
    /// Volume identifier.
    pub volume_id: String,
    /// Size in GiB.
    pub size: u64,
    /// Volume type (`gp3`, `io2`, ...).
    pub volume_type: String,
    /// Provisioned IOPS, when the type reports them.
    #[serde(default)]
    pub iops: Option<u64>,
    /// Whether the volume is encrypted.
    #[serde(default)]
    pub encrypted: bool,
    /// Snapshot the volume was created from.
    #[serde(default, deserialize_with = "non_empty_string")]
    pub snapshot_id: Option<String>,
    /// Volume tags.
    #[serde(default)]
    pub tags: TagSet,
}

impl VolumeMetadata {
    /// Creates metadata for an unencrypted, untagged `gp3` volume.
    #[must_use]
    pub fn new(volume_id: impl Into<String>, size: u64) -> Self {
        Self {
            volume_id: volume_id.into(),
            size,
            volume_type: String::from("gp3"),
            iops: None,
            encrypted: false,
            snapshot_id: None,
            tags: TagSet::new(),
        }
    }

    /// Replaces the volume tags, returning the updated metadata.
    #[must_use]
    pub fn with_tags(mut self, tags: TagSet) -> Self {
        self.tags = tags;
        self
    }
}

/// Normalised view of one attached volume, merged from the device mapping
/// and the volume metadata.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VolumeDescriptor {
    /// Volume identifier.
    pub volume_id: String,
    /// Device name on the owning instance.
    pub device_name: Option<String>,
    /// Delete-on-termination flag from the mapping.
    pub delete_on_termination: bool,
    /// Size in GiB.
    pub size: u64,
    /// Volume type.
    pub volume_type: String,
    /// Provisioned IOPS.
    pub iops: Option<u64>,
    /// Encryption flag.
    pub encrypted: bool,
    /// Source snapshot lineage.
    pub snapshot_id: Option<String>,
}

impl VolumeDescriptor {
    /// Builds a descriptor from the two typed sources.
    #[must_use]
    pub fn merge(mapping: &DeviceMapping, metadata: &VolumeMetadata) -> Self {
        Self {
            volume_id: metadata.volume_id.clone(),
            device_name: mapping.device_name.clone(),
            delete_on_termination: mapping
                .ebs
                .as_ref()
                .is_some_and(|ebs| ebs.delete_on_termination),
            size: metadata.size,
            volume_type: metadata.volume_type.clone(),
            iops: metadata.iops,
            encrypted: metadata.encrypted,
            snapshot_id: metadata.snapshot_id.clone(),
        }
    }
}

// describe-volumes reports `"SnapshotId": ""` for blank volumes.
fn non_empty_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|text| !text.is_empty()))
}
