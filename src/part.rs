//! Part/version data model
//!
//! A [`PartGroup`] holds the persisted facts about one edited sample range:
//! its versions, which one is active, and the settings recorded the last
//! time it was applied. It contains no composition logic; overlap
//! resolution lives in [`crate::compose`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::store::VersionStore;

/// One entry in a part's version list.
///
/// The original-range pass-through and explicit silence are sentinels, not
/// stored audio: the base is recomputed from the parts underneath on every
/// use, and silence is materialized as zeros of the part's length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "handle", rename_all = "snake_case")]
pub enum Version {
    /// Converted audio stored in the version store under this handle.
    Stored(String),
    /// Pass through whatever the underlying parts produce in this range.
    ComputedBase,
    /// Explicit zero signal.
    Silent,
}

/// Opaque parameter set recorded per version.
///
/// The engine never interprets these; they exist for display, logging, and
/// round-tripping through the project document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConvertParams {
    #[serde(flatten)]
    pub params: HashMap<String, serde_json::Value>,
}

impl ConvertParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_param<V: Serialize>(mut self, key: &str, value: V) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.params.insert(key.to_string(), v);
        }
        self
    }

    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.params
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Compact `key=value` summary for log lines.
    pub fn summary(&self) -> String {
        let mut entries: Vec<_> = self.params.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// One edited half-open sample range `[start, end)` with its versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartGroup {
    /// Opaque unique identifier, stable for the lifetime of the part.
    pub id: String,

    /// Inclusive start sample offset.
    pub start: usize,

    /// Exclusive end sample offset.
    pub end: usize,

    /// Ordered version list; index 0 is the base sentinel when `has_base`.
    pub versions: Vec<Version>,

    /// Parameter set used to produce each version, parallel to `versions`.
    pub version_params: Vec<Option<ConvertParams>>,

    /// Index of the version currently selected for composition.
    pub active_idx: usize,

    /// True if `versions[0]` is the computed-base sentinel.
    pub has_base: bool,

    /// Total order of application; reassigned on every (re)apply.
    /// Later-applied parts take precedence on overlap.
    pub apply_order: u64,

    /// Crossfade length (ms) used the last time this part was applied.
    pub last_blend_ms: u32,

    /// Nested-preservation flag used the last time this part was applied.
    pub last_preserve: bool,

    /// Additive gain applied to this part's contribution.
    pub volume_db: f32,

    /// Derived display stacking row; not used by composition.
    #[serde(default)]
    pub level: usize,

    /// Derived sub-ranges hidden by later-applied parts; display only.
    #[serde(default)]
    pub overwritten_ranges: Vec<(usize, usize)>,
}

impl PartGroup {
    /// Create an empty part over `[start, end)`.
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start < end, "part range must be non-empty");
        Self {
            id: Uuid::new_v4().simple().to_string()[..8].to_string(),
            start,
            end,
            versions: Vec::new(),
            version_params: Vec::new(),
            active_idx: 0,
            has_base: false,
            apply_order: 0,
            last_blend_ms: 0,
            last_preserve: true,
            volume_db: 0.0,
            level: 0,
            overwritten_ranges: Vec::new(),
        }
    }

    /// Range length in samples.
    pub fn size(&self) -> usize {
        self.end - self.start
    }

    /// True if the currently active version is the base pass-through.
    pub fn active_is_base(&self) -> bool {
        matches!(self.versions.get(self.active_idx), Some(Version::ComputedBase))
    }

    /// Number of real (non-base) versions.
    pub fn real_version_count(&self) -> usize {
        self.versions.len() - usize::from(self.has_base)
    }

    /// Insert the computed-base sentinel as version 0.
    ///
    /// No-op once the part has any versions, which keeps double-basing
    /// impossible.
    pub fn set_base(&mut self) {
        if !self.versions.is_empty() {
            return;
        }
        self.versions.push(Version::ComputedBase);
        self.version_params.push(None);
        self.has_base = true;
        self.active_idx = 0;
    }

    /// Store `audio` as a new version and make it active.
    ///
    /// Returns the new active index. Only storage I/O can fail, and the
    /// part is left unchanged when it does.
    pub fn add_version(
        &mut self,
        audio: &[f32],
        params: Option<ConvertParams>,
        store: &mut dyn VersionStore,
    ) -> Result<usize> {
        let idx = self.versions.len();
        let handle = store.save(&self.id, idx, audio)?;
        self.versions.push(Version::Stored(handle));
        self.version_params.push(params);
        self.active_idx = idx;
        Ok(idx)
    }

    /// Append the silent sentinel and make it active.
    pub fn add_silent_version(&mut self, params: Option<ConvertParams>) -> usize {
        self.versions.push(Version::Silent);
        self.version_params.push(params);
        self.active_idx = self.versions.len() - 1;
        self.active_idx
    }

    /// Resolve a version to a sample array.
    ///
    /// The base sentinel resolves to `None` (the caller must compute it);
    /// the silent sentinel resolves to zeros of the part's length.
    pub fn get_data(&self, idx: usize, store: &dyn VersionStore) -> Result<Option<Vec<f32>>> {
        match self.versions.get(idx) {
            None => Ok(None),
            Some(Version::ComputedBase) => Ok(None),
            Some(Version::Silent) => Ok(Some(vec![0.0; self.size()])),
            Some(Version::Stored(handle)) => store.load(handle).map(Some),
        }
    }

    /// Cyclically switch the active version by `delta`.
    ///
    /// Returns false when there is nothing to switch to.
    pub fn switch(&mut self, delta: isize) -> bool {
        let n = self.versions.len() as isize;
        if n <= 1 {
            return false;
        }
        let new_idx = (self.active_idx as isize + delta).rem_euclid(n) as usize;
        if new_idx == self.active_idx {
            return false;
        }
        self.active_idx = new_idx;
        true
    }

    /// Remove the active version.
    ///
    /// Rejected (returns false) when only one version remains, or when the
    /// active version is the base sentinel while other versions still
    /// exist: the minimum viable state after a deletion is "base only" or
    /// "one real version only".
    pub fn delete_current(&mut self, store: &mut dyn VersionStore) -> bool {
        if self.versions.len() <= 1 {
            return false;
        }
        if self.has_base && self.active_idx == 0 {
            return false;
        }
        let removed = self.versions.remove(self.active_idx);
        self.version_params.remove(self.active_idx);
        if let Version::Stored(handle) = removed {
            store.remove(&handle);
        }
        self.active_idx = self.active_idx.min(self.versions.len() - 1);
        true
    }

    /// Collapse to the active version, keeping the base sentinel as
    /// version 0 when the part has one and the active version is real.
    pub fn delete_others(&mut self, store: &mut dyn VersionStore) {
        if self.versions.len() <= 1 {
            return;
        }
        let keep = self.versions[self.active_idx].clone();
        let keep_params = self.version_params[self.active_idx].clone();
        let keep_base = self.has_base && !matches!(keep, Version::ComputedBase);

        for (i, version) in self.versions.iter().enumerate() {
            if i == self.active_idx {
                continue;
            }
            if keep_base && i == 0 {
                continue;
            }
            if let Version::Stored(handle) = version {
                store.remove(handle);
            }
        }

        if keep_base {
            self.versions = vec![Version::ComputedBase, keep];
            self.version_params = vec![None, keep_params];
            self.active_idx = 1;
        } else {
            self.versions = vec![keep];
            self.version_params = vec![keep_params];
            self.active_idx = 0;
            self.has_base = self.versions[0] == Version::ComputedBase;
        }
    }

    /// Remove all stored version files. Used when the part is destroyed.
    pub fn cleanup(&mut self, store: &mut dyn VersionStore) {
        for version in &self.versions {
            if let Version::Stored(handle) = version {
                store.remove(handle);
            }
        }
        self.versions.clear();
        self.version_params.clear();
    }

    /// Display label for a version ("Original" for the base sentinel,
    /// "Version N" counted over real versions).
    pub fn version_label(&self, idx: usize) -> String {
        if self.has_base && idx == 0 {
            return "Original".to_string();
        }
        let offset = usize::from(self.has_base);
        format!("Version {}", idx - offset + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn part_with_versions(n: usize, store: &mut MemoryStore) -> PartGroup {
        let mut part = PartGroup::new(0, 100);
        for i in 0..n {
            part.add_version(&vec![i as f32; 100], None, store).unwrap();
        }
        part
    }

    #[test]
    fn test_set_base_only_when_empty() {
        let mut part = PartGroup::new(0, 100);
        part.set_base();
        assert!(part.has_base);
        assert_eq!(part.versions, vec![Version::ComputedBase]);

        // Guard against double-basing.
        part.set_base();
        assert_eq!(part.versions.len(), 1);

        let mut store = MemoryStore::new();
        let mut part2 = part_with_versions(1, &mut store);
        part2.set_base();
        assert!(!part2.has_base);
    }

    #[test]
    fn test_add_version_activates() {
        let mut store = MemoryStore::new();
        let mut part = PartGroup::new(0, 100);
        part.set_base();

        let idx = part.add_version(&[0.5; 100], None, &mut store).unwrap();
        assert_eq!(idx, 1);
        assert_eq!(part.active_idx, 1);
        assert_eq!(part.real_version_count(), 1);
    }

    #[test]
    fn test_get_data_sentinels() {
        let mut store = MemoryStore::new();
        let mut part = PartGroup::new(10, 20);
        part.set_base();
        part.add_silent_version(None);

        // Base resolves to None: the caller computes it.
        assert_eq!(part.get_data(0, &store).unwrap(), None);
        // Silent resolves to zeros of the part length.
        assert_eq!(part.get_data(1, &store).unwrap(), Some(vec![0.0; 10]));

        part.add_version(&[0.7; 10], None, &mut store).unwrap();
        assert_eq!(part.get_data(2, &store).unwrap(), Some(vec![0.7; 10]));
    }

    #[test]
    fn test_delete_current_guards() {
        let mut store = MemoryStore::new();

        // Sole version is never deletable at the part level.
        let mut part = part_with_versions(1, &mut store);
        assert!(!part.delete_current(&mut store));

        // Base is never deleted while other versions remain.
        let mut based = PartGroup::new(0, 100);
        based.set_base();
        based.add_version(&[0.5; 100], None, &mut store).unwrap();
        based.active_idx = 0;
        assert!(!based.delete_current(&mut store));

        // Deleting the real version of a based part leaves base only.
        based.active_idx = 1;
        assert!(based.delete_current(&mut store));
        assert_eq!(based.versions, vec![Version::ComputedBase]);
        assert_eq!(based.active_idx, 0);
    }

    #[test]
    fn test_delete_current_removes_from_store() {
        let mut store = MemoryStore::new();
        let mut part = part_with_versions(2, &mut store);
        assert_eq!(store.len(), 2);

        assert!(part.delete_current(&mut store));
        assert_eq!(store.len(), 1);
        assert_eq!(part.versions.len(), 1);
    }

    #[test]
    fn test_delete_others_keeps_base() {
        let mut store = MemoryStore::new();
        let mut part = PartGroup::new(0, 100);
        part.set_base();
        part.add_version(&[0.1; 100], None, &mut store).unwrap();
        part.add_version(&[0.2; 100], None, &mut store).unwrap();
        part.add_version(&[0.3; 100], None, &mut store).unwrap();
        part.active_idx = 2;

        part.delete_others(&mut store);

        assert!(part.has_base);
        assert_eq!(part.versions.len(), 2);
        assert_eq!(part.active_idx, 1);
        assert_eq!(store.len(), 1);
        assert_eq!(
            part.get_data(1, &store).unwrap().unwrap(),
            vec![0.2; 100]
        );
    }

    #[test]
    fn test_delete_others_without_base() {
        let mut store = MemoryStore::new();
        let mut part = part_with_versions(3, &mut store);
        part.active_idx = 0;

        part.delete_others(&mut store);

        assert_eq!(part.versions.len(), 1);
        assert_eq!(store.len(), 1);
        assert!(!part.has_base);
    }

    #[test]
    fn test_switch_wraps() {
        let mut store = MemoryStore::new();
        let mut part = part_with_versions(3, &mut store);
        assert_eq!(part.active_idx, 2);

        assert!(part.switch(1));
        assert_eq!(part.active_idx, 0);
        assert!(part.switch(-1));
        assert_eq!(part.active_idx, 2);

        let mut single = part_with_versions(1, &mut store);
        assert!(!single.switch(1));
    }

    #[test]
    fn test_version_labels() {
        let mut store = MemoryStore::new();
        let mut part = PartGroup::new(0, 100);
        part.set_base();
        part.add_version(&[0.1; 100], None, &mut store).unwrap();

        assert_eq!(part.version_label(0), "Original");
        assert_eq!(part.version_label(1), "Version 1");
    }

    #[test]
    fn test_params_summary() {
        let params = ConvertParams::new()
            .with_param("pitch", 2)
            .with_param("f0_method", "rmvpe");
        assert_eq!(params.summary(), "f0_method=\"rmvpe\" pitch=2");
        assert_eq!(params.get::<i32>("pitch"), Some(2));
    }
}
