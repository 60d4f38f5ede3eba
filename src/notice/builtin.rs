use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::Notice;

/// Something in the host changed. Carries no payload and collapses to a
/// single notice per transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentsChanged;

impl Notice for ContentsChanged {}

/// Objects of the host were modified.
///
/// `resynced` lists paths whose whole subtree must be considered new;
/// `changed_info` lists paths where only metadata fields changed, with the
/// names of those fields in `changed_fields` when known.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectsChanged {
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    resynced: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    changed_info: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    changed_fields: BTreeMap<String, BTreeSet<String>>,
}

impl ObjectsChanged {
    /// Build a notice from resynced and info-only paths.
    pub fn new<R, C>(resynced: R, changed_info: C) -> Self
    where
        R: IntoIterator,
        R::Item: Into<String>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self {
            resynced: resynced.into_iter().map(Into::into).collect(),
            changed_info: changed_info.into_iter().map(Into::into).collect(),
            changed_fields: BTreeMap::new(),
        }
    }

    /// Record that `field` changed on `path`, marking the path info-only.
    #[must_use]
    pub fn with_changed_field(mut self, path: impl Into<String>, field: impl Into<String>) -> Self {
        let path = path.into();
        self.changed_info.insert(path.clone());
        self.changed_fields.entry(path).or_default().insert(field.into());
        self
    }

    /// Paths whose subtree was resynced.
    #[must_use]
    pub fn resynced(&self) -> &BTreeSet<String> {
        &self.resynced
    }

    /// Paths with info-only changes.
    #[must_use]
    pub fn changed_info(&self) -> &BTreeSet<String> {
        &self.changed_info
    }

    /// Names of the fields changed on `path`. Empty if none are known.
    #[must_use]
    pub fn changed_fields(&self, path: &str) -> BTreeSet<String> {
        self.changed_fields.get(path).cloned().unwrap_or_default()
    }

    /// Returns true if field names were recorded for `path`.
    #[must_use]
    pub fn has_changed_fields(&self, path: &str) -> bool {
        self.changed_fields.get(path).is_some_and(|f| !f.is_empty())
    }

    /// Returns true if `path` or one of its ancestors was resynced.
    #[must_use]
    pub fn is_resynced(&self, path: &str) -> bool {
        self.resynced.iter().any(|root| is_within(path, root))
    }

    /// Returns true if `path` had an info-only change.
    #[must_use]
    pub fn is_changed_info_only(&self, path: &str) -> bool {
        self.changed_info.contains(path)
    }

    /// Returns true if `path` is affected in any way.
    #[must_use]
    pub fn affects(&self, path: &str) -> bool {
        self.is_resynced(path) || self.is_changed_info_only(path)
    }
}

impl Notice for ObjectsChanged {
    fn merge(&mut self, other: Self) {
        self.resynced.extend(other.resynced);
        self.changed_info.extend(other.changed_info);
        for (path, fields) in other.changed_fields {
            self.changed_fields.entry(path).or_default().extend(fields);
        }
    }

    fn post_process(&mut self) {
        // Keep only the topmost resynced roots.
        let all = self.resynced.clone();
        self.resynced
            .retain(|path| !all.iter().any(|root| root != path && is_within(path, root)));

        let resynced = &self.resynced;
        let covered = |path: &String| resynced.iter().any(|root| is_within(path, root));
        self.changed_info.retain(|path| !covered(path));
        self.changed_fields.retain(|path, _| !covered(path));
    }
}

/// True if `path` equals `root` or lies below it in a `/`-separated hierarchy.
fn is_within(path: &str, root: &str) -> bool {
    if root == "/" {
        return path.starts_with('/');
    }
    match path.strip_prefix(root) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
