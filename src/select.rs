//! Selection of data volumes that qualify for a snapshot.

use serde::Serialize;

use crate::model::{VolumeDescriptor, VolumeMetadata};
use crate::tags::{LIFECYCLE_VALUES, NAME_TAG_KEY, TagSet, matches, value_of};

/// Data volume selected for a snapshot.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct SnapshotCandidate {
    /// Volume to snapshot.
    pub volume_id: String,
    /// Value of the volume `Name` tag, propagated to the snapshot.
    pub display_name: String,
    /// Extra tags copied from the volume onto the snapshot.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub copied_tags: Vec<(String, String)>,
}

/// Data-quality exception: the volume carries the lifecycle tag but no name.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct MissingNameTag {
    /// Volume that was skipped.
    pub volume_id: String,
    /// Lifecycle value found on the volume.
    pub lifecycle: String,
}

/// Outcome of candidate selection for one instance.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Selection {
    /// Volumes to snapshot, in data-volume order.
    pub candidates: Vec<SnapshotCandidate>,
    /// Lifecycle-tagged volumes excluded for lacking a `Name` tag.
    pub exceptions: Vec<MissingNameTag>,
    /// Data volumes whose tags were absent from the describe answer.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub untagged: Vec<String>,
}

/// Walks `data` and keeps the volumes whose own tags carry an accepted
/// lifecycle value under `lifecycle_key`.
///
/// Tags are read from `metadata`, the describe output the descriptors were
/// built from; a descriptor missing from it is listed in
/// [`Selection::untagged`]. Keys listed in `copy_tags` are carried onto the
/// candidate when the volume has them. Root volumes never reach this
/// function.
#[must_use]
pub fn select_candidates(
    data: &[VolumeDescriptor],
    metadata: &[VolumeMetadata],
    lifecycle_key: &str,
    copy_tags: &[String],
) -> Selection {
    let mut selection = Selection::default();
    for descriptor in data {
        let Some(tags) = tags_for(metadata, &descriptor.volume_id) else {
            selection.untagged.push(descriptor.volume_id.clone());
            continue;
        };
        if !matches(tags, lifecycle_key, &LIFECYCLE_VALUES) {
            continue;
        }
        match value_of(tags, NAME_TAG_KEY).filter(|name| !name.is_empty()) {
            Some(name) => selection.candidates.push(SnapshotCandidate {
                volume_id: descriptor.volume_id.clone(),
                display_name: name.to_owned(),
                copied_tags: copied(tags, copy_tags),
            }),
            None => selection.exceptions.push(MissingNameTag {
                volume_id: descriptor.volume_id.clone(),
                lifecycle: value_of(tags, lifecycle_key).unwrap_or_default().to_owned(),
            }),
        }
    }
    selection
}

fn tags_for<'a>(metadata: &'a [VolumeMetadata], volume_id: &str) -> Option<&'a TagSet> {
    metadata
        .iter()
        .find(|volume| volume.volume_id == volume_id)
        .map(|volume| &volume.tags)
}

fn copied(tags: &TagSet, keys: &[String]) -> Vec<(String, String)> {
    keys.iter()
        .filter(|key| key.as_str() != NAME_TAG_KEY)
        .filter_map(|key| tags.get(key).map(|value| (key.clone(), value.to_owned())))
        .collect()
}
