//! Snapshot undo history
//!
//! Whole-state snapshots of the part set plus markers, taken after every
//! mutating operation. Undo and redo move a cursor over the snapshot list;
//! pushing after an undo discards the redo branch (linear history, no
//! tree). Audio version data is not snapshotted, only the handles inside
//! each part, so deleted versions are unrecoverable once their files are
//! gone; the part set itself always restores exactly.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::part::PartGroup;

/// Default cap on retained snapshots.
pub const DEFAULT_MAX_SNAPSHOTS: usize = 100;

/// One recorded state of the editing session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub parts: Vec<PartGroup>,
    pub markers: Vec<usize>,
    pub timestamp: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(parts: Vec<PartGroup>, markers: Vec<usize>) -> Self {
        Self {
            parts,
            markers,
            timestamp: Utc::now(),
        }
    }
}

/// Persisted form of the history, restored across application restarts.
#[derive(Debug, Serialize, Deserialize)]
struct HistoryDocument {
    snapshots: Vec<Snapshot>,
    position: isize,
}

/// Linear snapshot history with a movable cursor.
#[derive(Debug)]
pub struct HistoryManager {
    snapshots: Vec<Snapshot>,
    /// Index of the current snapshot; -1 before anything is recorded.
    position: isize,
    max_snapshots: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SNAPSHOTS)
    }
}

impl HistoryManager {
    pub fn new(max_snapshots: usize) -> Self {
        Self {
            snapshots: Vec::new(),
            position: -1,
            max_snapshots: max_snapshots.max(1),
        }
    }

    /// Record a new snapshot at the cursor.
    ///
    /// Any snapshots past the cursor (the redo branch) are discarded first;
    /// the oldest snapshot is evicted once the cap is reached.
    pub fn push(&mut self, parts: Vec<PartGroup>, markers: Vec<usize>) {
        self.snapshots.truncate((self.position + 1) as usize);
        self.snapshots.push(Snapshot::new(parts, markers));
        self.position += 1;

        if self.snapshots.len() > self.max_snapshots {
            self.snapshots.remove(0);
            self.position -= 1;
        }
        debug!(
            position = self.position,
            total = self.snapshots.len(),
            "snapshot recorded"
        );
    }

    pub fn can_undo(&self) -> bool {
        self.position > 0
    }

    pub fn can_redo(&self) -> bool {
        self.position + 1 < self.snapshots.len() as isize
    }

    /// Step the cursor back and return the snapshot to restore.
    pub fn undo(&mut self) -> Option<&Snapshot> {
        if !self.can_undo() {
            return None;
        }
        self.position -= 1;
        self.snapshots.get(self.position as usize)
    }

    /// Step the cursor forward and return the snapshot to restore.
    pub fn redo(&mut self) -> Option<&Snapshot> {
        if !self.can_redo() {
            return None;
        }
        self.position += 1;
        self.snapshots.get(self.position as usize)
    }

    /// Snapshot at the cursor, if any.
    pub fn current(&self) -> Option<&Snapshot> {
        if self.position < 0 {
            return None;
        }
        self.snapshots.get(self.position as usize)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn position(&self) -> isize {
        self.position
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.position = -1;
    }

    /// Write the history to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let doc = HistoryDocument {
            snapshots: self.snapshots.clone(),
            position: self.position,
        };
        let json = serde_json::to_string(&doc)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load a history from a JSON file.
    ///
    /// A missing or unparseable file yields an empty history: losing undo
    /// depth is preferable to refusing to open the project.
    pub fn load(path: &Path, max_snapshots: usize) -> Self {
        let mut history = Self::new(max_snapshots);
        let data = match fs::read_to_string(path) {
            Ok(d) => d,
            Err(err) => {
                debug!(path = %path.display(), %err, "no history file, starting empty");
                return history;
            }
        };
        match serde_json::from_str::<HistoryDocument>(&data) {
            Ok(doc) => {
                let clamp = doc.snapshots.len() as isize - 1;
                history.position = doc.position.min(clamp).max(-1);
                history.snapshots = doc.snapshots;
                // Honor the cap even if the file was written with a larger one.
                while history.snapshots.len() > history.max_snapshots {
                    history.snapshots.remove(0);
                    history.position -= 1;
                }
                history.position = history.position.max(-1);
            }
            Err(err) => {
                warn!(path = %path.display(), %err, "corrupt history file, starting empty");
            }
        }
        history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn snap(history: &mut HistoryManager, n: usize) {
        let parts = (0..n).map(|i| PartGroup::new(i * 10, i * 10 + 5)).collect();
        history.push(parts, vec![n]);
    }

    #[test]
    fn test_undo_redo_walk() {
        let mut history = HistoryManager::new(10);
        snap(&mut history, 0);
        snap(&mut history, 1);
        snap(&mut history, 2);

        assert!(history.can_undo());
        assert!(!history.can_redo());

        let s = history.undo().unwrap();
        assert_eq!(s.parts.len(), 1);
        let s = history.undo().unwrap();
        assert_eq!(s.parts.len(), 0);
        assert!(!history.can_undo());
        assert!(history.undo().is_none());

        let s = history.redo().unwrap();
        assert_eq!(s.parts.len(), 1);
        let s = history.redo().unwrap();
        assert_eq!(s.parts.len(), 2);
        assert!(history.redo().is_none());
    }

    #[test]
    fn test_push_discards_redo_branch() {
        let mut history = HistoryManager::new(10);
        snap(&mut history, 0);
        snap(&mut history, 1);
        snap(&mut history, 2);

        history.undo();
        history.undo();
        assert!(history.can_redo());

        snap(&mut history, 5);
        assert!(!history.can_redo());
        assert_eq!(history.len(), 2);
        assert_eq!(history.current().unwrap().parts.len(), 5);
    }

    #[test]
    fn test_eviction_at_cap() {
        let mut history = HistoryManager::new(3);
        for i in 0..5 {
            snap(&mut history, i);
        }
        assert_eq!(history.len(), 3);
        // Oldest reachable state is the third snapshot.
        history.undo();
        let s = history.undo().unwrap();
        assert_eq!(s.parts.len(), 2);
        assert!(!history.can_undo());
    }

    #[test]
    fn test_markers_snapshotted() {
        let mut history = HistoryManager::new(10);
        history.push(Vec::new(), vec![100, 200]);
        history.push(Vec::new(), vec![100]);

        let s = history.undo().unwrap();
        assert_eq!(s.markers, vec![100, 200]);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");

        let mut history = HistoryManager::new(10);
        snap(&mut history, 1);
        snap(&mut history, 2);
        history.undo();
        history.save(&path).unwrap();

        let restored = HistoryManager::load(&path, 10);
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.position(), 0);
        assert!(restored.can_redo());
        assert_eq!(restored.current().unwrap().parts.len(), 1);
    }

    #[test]
    fn test_load_missing_or_corrupt() {
        let dir = TempDir::new().unwrap();

        let missing = HistoryManager::load(&dir.path().join("nope.json"), 10);
        assert!(missing.is_empty());
        assert_eq!(missing.position(), -1);

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{not json").unwrap();
        let corrupt = HistoryManager::load(&bad, 10);
        assert!(corrupt.is_empty());
    }
}
