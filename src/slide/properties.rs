//! Slide property table.
//!
//! A read-only string map filled once at open. Keys are namespaced:
//! `tiff.*` for raw TIFF tags, `aperio.*` for vendor metadata and
//! `openslide.*` for values computed by the reader.

use std::collections::BTreeMap;

use serde::Serialize;

pub const PROPERTY_VENDOR: &str = "openslide.vendor";
pub const PROPERTY_COMMENT: &str = "openslide.comment";
pub const PROPERTY_LEVEL_COUNT: &str = "openslide.level-count";
pub const PROPERTY_MPP_X: &str = "openslide.mpp-x";
pub const PROPERTY_MPP_Y: &str = "openslide.mpp-y";
pub const PROPERTY_OBJECTIVE_POWER: &str = "openslide.objective-power";
pub const PROPERTY_QUICKHASH: &str = "openslide.quickhash-1";

/// Key for a per-level property such as `openslide.level[2].width`.
pub fn level_property(level: usize, field: &str) -> String {
    format!("openslide.level[{level}].{field}")
}

/// Sorted, unique string keys to string values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PropertyTable {
    entries: BTreeMap<String, String>,
}

impl PropertyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a property, replacing any earlier value for the key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Insert a property unless the key is already set.
    pub fn insert_if_absent(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.entry(key.into()).or_insert_with(|| value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Keys in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PropertyTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut table = PropertyTable::new();
        for (key, value) in iter {
            table.insert(key, value);
        }
        table
    }
}
