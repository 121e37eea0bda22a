//! Tag matching for instances and volumes.
//!
//! AWS reports tags as a list of `{Key, Value}` pairs; [`TagSet`] folds them
//! into a map so lookups are by key. Keys are unique per resource.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Lifecycle values that mark a resource as eligible for snapshotting.
pub const LIFECYCLE_VALUES: [&str; 3] = ["daily", "weekly", "monthly"];

/// Tag key carrying the human readable resource name.
pub const NAME_TAG_KEY: &str = "Name";

/// A single tag as it appears in EC2 API payloads.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    /// Tag key.
    pub key: String,
    /// Tag value.
    pub value: String,
}

/// Key to value mapping of resource tags.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(from = "Vec<Tag>")]
pub struct TagSet(BTreeMap<String, String>);

impl TagSet {
    /// Creates an empty tag set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a tag, returning the updated set.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Adds or replaces a tag.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Returns the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Returns `true` when no tags are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of tags in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates tags in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Converts the set back into the EC2 list representation.
    #[must_use]
    pub fn to_tags(&self) -> Vec<Tag> {
        self.iter()
            .map(|(key, value)| Tag {
                key: key.to_owned(),
                value: value.to_owned(),
            })
            .collect()
    }
}

impl From<Vec<Tag>> for TagSet {
    fn from(value: Vec<Tag>) -> Self {
        Self(value.into_iter().map(|tag| (tag.key, tag.value)).collect())
    }
}

impl<K, V> FromIterator<(K, V)> for TagSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

/// Returns `true` when `tags[key]` exists and is one of `accepted`.
///
/// Comparison is exact and case-sensitive: `Daily` does not match `daily`.
#[must_use]
pub fn matches(tags: &TagSet, key: &str, accepted: &[&str]) -> bool {
    tags.get(key).is_some_and(|value| accepted.contains(&value))
}

/// Returns the value of `key`, if the tag is present.
#[must_use]
pub fn value_of<'a>(tags: &'a TagSet, key: &str) -> Option<&'a str> {
    tags.get(key)
}
