//! Root/data classification of the volumes attached to an instance.
//!
//! The device index maps each EBS volume id to the mapping that attached it.
//! Volume metadata fetched for exactly those ids is merged with the mappings
//! into [`VolumeDescriptor`]s, one of which may be the boot volume.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, warn};

use crate::model::{DeviceMapping, Instance, VolumeDescriptor, VolumeMetadata};
use crate::provider::{Ec2Api, ProviderError};

/// Volume id to device mapping for one instance.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DeviceIndex<'a> {
    entries: BTreeMap<&'a str, &'a DeviceMapping>,
}

impl<'a> DeviceIndex<'a> {
    /// Indexes the EBS-backed mappings of `mappings`.
    ///
    /// Mappings without a backing volume (instance store, NVMe ephemeral)
    /// are skipped.
    #[must_use]
    pub fn build(mappings: &'a [DeviceMapping]) -> Self {
        let entries = mappings
            .iter()
            .filter_map(|mapping| {
                mapping
                    .ebs
                    .as_ref()
                    .map(|ebs| (ebs.volume_id.as_str(), mapping))
            })
            .collect();
        Self { entries }
    }

    /// Returns `true` when the instance has no EBS-backed devices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of indexed volumes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Mapping that attached `volume_id`.
    #[must_use]
    pub fn get(&self, volume_id: &str) -> Option<&'a DeviceMapping> {
        self.entries.get(volume_id).copied()
    }

    /// Indexed volume ids in sorted order.
    #[must_use]
    pub fn volume_ids(&self) -> Vec<String> {
        self.entries.keys().map(|id| (*id).to_owned()).collect()
    }
}

/// Returns `true` when `mapping` names the instance's boot device.
///
/// A missing device name on either side yields `false`.
#[must_use]
pub fn is_root(mapping: &DeviceMapping, instance: &Instance) -> bool {
    match (
        mapping.device_name.as_deref(),
        instance.root_device_name.as_deref(),
    ) {
        (Some(device), Some(root)) => device == root,
        _ => false,
    }
}

/// Volumes of one instance split into the boot volume and data volumes.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ClassifiedVolumes {
    /// Boot volume, when the instance declares a boot device that is attached.
    pub root: Option<VolumeDescriptor>,
    /// Remaining volumes in describe order.
    pub data: Vec<VolumeDescriptor>,
}

impl ClassifiedVolumes {
    /// Total number of descriptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len() + usize::from(self.root.is_some())
    }

    /// Returns `true` when no volume was classified.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_none() && self.data.is_empty()
    }
}

/// Classified volumes together with the metadata they were built from.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Classification {
    /// Root/data partition.
    pub volumes: ClassifiedVolumes,
    /// Metadata returned by the describe call, reused for tag lookups.
    pub metadata: Vec<VolumeMetadata>,
}

/// Errors raised while classifying an instance's volumes.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ClassifyError {
    /// Raised when describe returns a volume the index never asked for.
    #[error("volume {volume_id} returned by describe-volumes is not attached to instance {instance_id}")]
    UnindexedVolume {
        /// Instance being classified.
        instance_id: String,
        /// Volume missing from the device index.
        volume_id: String,
    },
    /// Raised when the describe call itself fails.
    #[error("failed to describe volumes of instance {instance_id}: {source}")]
    Describe {
        /// Instance being classified.
        instance_id: String,
        /// Provider failure.
        #[source]
        source: ProviderError,
    },
}

/// Merges fetched metadata with the device index and partitions the result.
///
/// When several mappings match the boot device the last one described
/// replaces the earlier root.
///
/// # Errors
///
/// Returns [`ClassifyError::UnindexedVolume`] when a metadata entry has no
/// mapping in `index`.
pub fn merge(
    instance: &Instance,
    index: &DeviceIndex<'_>,
    volumes: &[VolumeMetadata],
) -> Result<ClassifiedVolumes, ClassifyError> {
    let mut classified = ClassifiedVolumes::default();
    for volume in volumes {
        let mapping =
            index
                .get(&volume.volume_id)
                .ok_or_else(|| ClassifyError::UnindexedVolume {
                    instance_id: instance.id.clone(),
                    volume_id: volume.volume_id.clone(),
                })?;
        let descriptor = VolumeDescriptor::merge(mapping, volume);
        if is_root(mapping, instance) {
            if let Some(previous) = classified.root.replace(descriptor) {
                warn!(
                    instance_id = %instance.id,
                    replaced = %previous.volume_id,
                    root = %volume.volume_id,
                    "multiple mappings match the boot device; keeping the last"
                );
            }
        } else {
            classified.data.push(descriptor);
        }
    }
    Ok(classified)
}

/// Describes and classifies the volumes of `instance` listed in `index`.
///
/// An empty index yields an empty classification without a describe call.
///
/// # Errors
///
/// Returns [`ClassifyError::Describe`] when the provider call fails and
/// [`ClassifyError::UnindexedVolume`] when its answer is inconsistent with
/// the index.
pub fn classify_instance<P: Ec2Api>(
    api: &P,
    instance: &Instance,
    index: &DeviceIndex<'_>,
) -> Result<Classification, ClassifyError> {
    if index.is_empty() {
        debug!(instance_id = %instance.id, "no EBS-backed devices");
        return Ok(Classification::default());
    }

    let metadata =
        api.describe_volumes(&index.volume_ids())
            .map_err(|source| ClassifyError::Describe {
                instance_id: instance.id.clone(),
                source,
            })?;
    let volumes = merge(instance, index, &metadata)?;
    Ok(Classification { volumes, metadata })
}
