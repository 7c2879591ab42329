//! Version storage
//!
//! The persistence collaborator for per-part version audio. Each stored
//! version is a named mono buffer keyed by a string handle; the part set
//! only ever holds handles, never audio. [`MemoryStore`] backs tests and
//! ephemeral sessions, [`DirStore`] persists versions as WAV files in a
//! parts directory.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::audio;
use crate::error::{Result, RetakeError};

/// Storage for named version buffers.
///
/// Implementations surface I/O errors rather than retrying; callers decide
/// whether to fall back (the composition engine substitutes the computed
/// base for an unreadable version).
pub trait VersionStore: Send {
    /// Store a version buffer, returning its handle.
    fn save(&mut self, part_id: &str, index: usize, samples: &[f32]) -> Result<String>;

    /// Load a version buffer by handle.
    fn load(&self, handle: &str) -> Result<Vec<f32>>;

    /// Whether a handle currently resolves.
    fn contains(&self, handle: &str) -> bool;

    /// Remove a stored version. Missing handles are a no-op.
    fn remove(&mut self, handle: &str);
}

/// In-memory version store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    buffers: HashMap<String, Vec<f32>>,
    counter: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored versions.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

impl VersionStore for MemoryStore {
    fn save(&mut self, part_id: &str, index: usize, samples: &[f32]) -> Result<String> {
        // The counter keeps handles unique even when a version index is
        // reused after a deletion.
        self.counter += 1;
        let handle = format!("{}_v{}_{}", part_id, index, self.counter);
        self.buffers.insert(handle.clone(), samples.to_vec());
        Ok(handle)
    }

    fn load(&self, handle: &str) -> Result<Vec<f32>> {
        self.buffers
            .get(handle)
            .cloned()
            .ok_or_else(|| RetakeError::VersionNotFound {
                handle: handle.to_string(),
            })
    }

    fn contains(&self, handle: &str) -> bool {
        self.buffers.contains_key(handle)
    }

    fn remove(&mut self, handle: &str) {
        self.buffers.remove(handle);
    }
}

/// WAV-file-backed version store.
///
/// Handles are file names relative to the parts directory, so a project
/// directory can be relocated without rewriting the part set.
#[derive(Debug)]
pub struct DirStore {
    parts_dir: PathBuf,
    sample_rate: u32,
    counter: u64,
}

impl DirStore {
    /// Open (creating if needed) a parts directory.
    pub fn new(parts_dir: &Path, sample_rate: u32) -> Result<Self> {
        fs::create_dir_all(parts_dir).map_err(|e| RetakeError::FileWriteError {
            path: parts_dir.to_path_buf(),
            source: e,
        })?;
        Ok(Self {
            parts_dir: parts_dir.to_path_buf(),
            sample_rate,
            counter: 0,
        })
    }

    pub fn parts_dir(&self) -> &Path {
        &self.parts_dir
    }

    fn path_for(&self, handle: &str) -> PathBuf {
        self.parts_dir.join(handle)
    }
}

impl VersionStore for DirStore {
    fn save(&mut self, part_id: &str, index: usize, samples: &[f32]) -> Result<String> {
        self.counter += 1;
        let handle = format!("{}_v{}_{}.wav", part_id, index, self.counter);
        let path = self.path_for(&handle);
        audio::write_wav(&path, samples, self.sample_rate)?;
        debug!(handle, samples = samples.len(), "stored version");
        Ok(handle)
    }

    fn load(&self, handle: &str) -> Result<Vec<f32>> {
        let path = self.path_for(handle);
        if !path.exists() {
            return Err(RetakeError::VersionNotFound {
                handle: handle.to_string(),
            });
        }
        let (channels, _) = audio::read_wav(&path)?;
        Ok(audio::downmix(&channels))
    }

    fn contains(&self, handle: &str) -> bool {
        self.path_for(handle).exists()
    }

    fn remove(&mut self, handle: &str) {
        let path = self.path_for(handle);
        if let Err(err) = fs::remove_file(&path) {
            // A vanished file is already in the state we want.
            debug!(handle, %err, "could not remove version file");
        }
    }
}
