//! Editing session
//!
//! The orchestrator that owns the buffers, the part set, history, and the
//! version store, and drives the composition engine on every mutating
//! operation. Single-writer: all mutations run on one logical editing
//! thread. Playback readers take the published `Arc` snapshot of the
//! result buffer, which is swapped atomically after each recomposition and
//! never mutated in place.
//!
//! Every mutating operation pushes exactly one history snapshot after
//! composition finishes, so history always points at a consistent,
//! renderable state.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::audio::{self, is_silent};
use crate::compose::{ApplySettings, Composer, FadeLaw, SILENCE_EPS};
use crate::convert::Converter;
use crate::error::{Result, RetakeError};
use crate::history::{HistoryManager, DEFAULT_MAX_SNAPSHOTS};
use crate::mipmap::Mipmap;
use crate::part::{ConvertParams, PartGroup, Version};
use crate::store::VersionStore;

/// Smallest range a conversion may target, in samples.
pub const MIN_PART_SAMPLES: usize = 128;

/// Project manifest file name inside a project directory.
pub const PROJECT_MANIFEST: &str = "project.json";

/// Per-apply settings recorded on the part and replayed on every rebuild.
#[derive(Debug, Clone, Copy)]
pub struct ApplyOptions {
    /// Crossfade length against the base, in milliseconds.
    pub blend_ms: u32,
    /// Write around parts fully nested inside the target range.
    pub preserve_nested: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            blend_ms: 10,
            preserve_nested: true,
        }
    }
}

/// Options for a conversion request.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConvertOptions {
    pub apply: ApplyOptions,
    /// Trailing source samples fed to the converter past the range end,
    /// for conversion quality; never written to the result.
    pub context_pad: usize,
}

/// Which buffer an envelope query reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Track {
    Source,
    Result,
}

/// Durable form of the part set; round-trips exactly through
/// `rebuild_result_from_parts`.
#[derive(Debug, Serialize, Deserialize)]
struct ProjectDocument {
    sample_rate: u32,
    markers: Vec<usize>,
    parts: Vec<PartGroup>,
}

impl std::fmt::Debug for EditingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditingSession")
            .field("sample_rate", &self.sample_rate)
            .field("parts", &self.parts)
            .field("markers", &self.markers)
            .finish_non_exhaustive()
    }
}

/// One editing session over a loaded source buffer.
pub struct EditingSession {
    sample_rate: u32,
    source: Vec<f32>,
    result: Vec<f32>,
    result_display: Vec<f32>,
    parts: Vec<PartGroup>,
    markers: Vec<usize>,
    history: HistoryManager,
    store: Box<dyn VersionStore>,
    composer: Composer,
    next_apply_order: u64,
    published: Arc<Vec<f32>>,
    source_mipmap: Option<Mipmap>,
    result_mipmap: Option<Mipmap>,
}

impl EditingSession {
    /// Start a session over a mono source buffer.
    ///
    /// The result buffer starts silent; it only carries what parts
    /// compose into it.
    pub fn new(source: Vec<f32>, sample_rate: u32, store: Box<dyn VersionStore>) -> Self {
        let total = source.len();
        let mut session = Self {
            sample_rate,
            source,
            result: vec![0.0; total],
            result_display: vec![0.0; total],
            parts: Vec::new(),
            markers: Vec::new(),
            history: HistoryManager::new(DEFAULT_MAX_SNAPSHOTS),
            store,
            composer: Composer::new(sample_rate),
            next_apply_order: 0,
            published: Arc::new(vec![0.0; total]),
            source_mipmap: None,
            result_mipmap: None,
        };
        // The pristine state is itself a snapshot, so the first real edit
        // can be undone back to it.
        session.snapshot();
        session
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn total_samples(&self) -> usize {
        self.source.len()
    }

    pub fn source(&self) -> &[f32] {
        &self.source
    }

    pub fn result(&self) -> &[f32] {
        &self.result
    }

    pub fn result_display(&self) -> &[f32] {
        &self.result_display
    }

    pub fn parts(&self) -> &[PartGroup] {
        &self.parts
    }

    pub fn part(&self, id: &str) -> Option<&PartGroup> {
        self.parts.iter().find(|p| p.id == id)
    }

    pub fn markers(&self) -> &[usize] {
        &self.markers
    }

    pub fn fade_law(&self) -> FadeLaw {
        self.composer.fade_law
    }

    /// Select the crossfade law and recompose with it.
    ///
    /// A rendering preference, not an edit: no snapshot is pushed, and
    /// undo never changes it back.
    pub fn set_fade_law(&mut self, law: FadeLaw) {
        if self.composer.fade_law == law {
            return;
        }
        self.composer.fade_law = law;
        self.rebuild();
        self.publish();
        info!(?law, "fade law changed");
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Consistent result buffer for concurrent playback readers. The
    /// returned `Arc` is immutable; edits swap in a fresh buffer.
    pub fn published(&self) -> Arc<Vec<f32>> {
        Arc::clone(&self.published)
    }

    // ------------------------------------------------------------------
    // Conversion
    // ------------------------------------------------------------------

    /// Convert `[start, end)` of the source through the external backend
    /// and apply the output as a new version. Returns the part id.
    ///
    /// The converter runs synchronously here; callers wanting a
    /// responsive editing thread run it elsewhere and deliver the output
    /// through [`apply_conversion`](Self::apply_conversion).
    pub fn convert_range(
        &mut self,
        converter: &dyn Converter,
        start: usize,
        end: usize,
        params: ConvertParams,
        options: ConvertOptions,
    ) -> Result<String> {
        self.validate_range(start, end)?;

        let padded_end = end.saturating_add(options.context_pad).min(self.source.len());
        let excerpt = &self.source[start..padded_end];

        info!(
            backend = converter.name(),
            start,
            end,
            context_pad = padded_end - end,
            params = %params.summary(),
            "converting range"
        );

        let mut converted = converter.convert(excerpt, self.sample_rate, &params)?;
        converted.truncate(end - start);

        self.apply_conversion(start, end, converted, params, options.apply)
    }

    /// Apply already-converted audio as a new version over `[start, end)`.
    ///
    /// The single atomic "apply this new version" event: find or create
    /// the part, store the version, re-apply with a fresh precedence
    /// order, snapshot, publish. Empty audio is rejected with the part
    /// set unchanged.
    pub fn apply_conversion(
        &mut self,
        start: usize,
        end: usize,
        mut audio: Vec<f32>,
        params: ConvertParams,
        options: ApplyOptions,
    ) -> Result<String> {
        self.validate_range(start, end)?;
        if audio.is_empty() {
            return Err(RetakeError::EmptyConversion);
        }
        audio.truncate(end - start);

        let existing = self.parts.iter().position(|p| p.start == start && p.end == end);
        let idx = match existing {
            Some(idx) => {
                self.parts[idx].add_version(&audio, Some(params), &mut *self.store)?;
                idx
            }
            None => {
                let mut part = PartGroup::new(start, end);
                // Converting over audible composed audio keeps the old
                // signal reachable as the "Original" version.
                if !is_silent(&self.result[start..end], SILENCE_EPS) {
                    part.set_base();
                }
                part.add_version(&audio, Some(params), &mut *self.store)?;
                self.parts.push(part);
                self.parts.len() - 1
            }
        };

        let id = self.parts[idx].id.clone();
        self.reapply(idx, options);
        self.finish_edit();

        info!(part = %id, start, end, "conversion applied");
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Version management
    // ------------------------------------------------------------------

    /// Cyclically step a part's active version by `delta` and re-apply it
    /// with top precedence. Returns false when there is nothing to
    /// switch to.
    pub fn switch_version(&mut self, id: &str, delta: isize, options: ApplyOptions) -> Result<bool> {
        let idx = self.part_index(id)?;
        if !self.parts[idx].switch(delta) {
            return Ok(false);
        }
        self.reapply(idx, options);
        self.finish_edit();
        info!(part = %id, version = self.parts[idx].active_idx, "switched version");
        Ok(true)
    }

    /// Select a specific version index and re-apply. Returns false for an
    /// out-of-range index or a no-op selection.
    pub fn set_active_version(&mut self, id: &str, version: usize, options: ApplyOptions) -> Result<bool> {
        let idx = self.part_index(id)?;
        let part = &mut self.parts[idx];
        if version >= part.versions.len() || version == part.active_idx {
            return Ok(false);
        }
        part.active_idx = version;
        self.reapply(idx, options);
        self.finish_edit();
        info!(part = %id, version, "activated version");
        Ok(true)
    }

    /// Delete a part's active version.
    ///
    /// Removing the last real version removes the whole part (a part
    /// holding nothing but the base sentinel is pointless; the underlying
    /// composition takes over). Returns false when the deletion is
    /// rejected (active version is the base, or no part-level rule
    /// permits it).
    pub fn delete_current_version(&mut self, id: &str) -> Result<bool> {
        let idx = self.part_index(id)?;

        if self.parts[idx].active_is_base() {
            return Ok(false);
        }

        if self.parts[idx].real_version_count() <= 1 {
            let mut part = self.parts.remove(idx);
            part.cleanup(&mut *self.store);
            self.rebuild();
            self.finish_edit();
            info!(part = %id, "last version deleted, part removed");
            return Ok(true);
        }

        if !self.parts[idx].delete_current(&mut *self.store) {
            return Ok(false);
        }
        self.rebuild();
        self.finish_edit();
        info!(part = %id, "version deleted");
        Ok(true)
    }

    /// Collapse a part to its active version (plus the base sentinel when
    /// it has one).
    pub fn delete_other_versions(&mut self, id: &str) -> Result<()> {
        let idx = self.part_index(id)?;
        self.parts[idx].delete_others(&mut *self.store);
        // The active version did not change, so the audio is already
        // correct; only the snapshot needs to record the slimmer part.
        self.snapshot();
        info!(part = %id, "other versions deleted");
        Ok(())
    }

    /// Remove a part and its stored versions entirely.
    pub fn delete_part(&mut self, id: &str) -> Result<()> {
        let idx = self.part_index(id)?;
        let mut part = self.parts.remove(idx);
        part.cleanup(&mut *self.store);
        self.rebuild();
        self.finish_edit();
        info!(part = %id, "part deleted");
        Ok(())
    }

    /// Bake the current result in place and drop every part. The audio is
    /// untouched; only the editing structure on top of it goes away.
    pub fn flatten_parts(&mut self) {
        for part in &mut self.parts {
            part.cleanup(&mut *self.store);
        }
        let count = self.parts.len();
        self.parts.clear();
        self.snapshot();
        self.publish();
        info!(parts = count, "flattened");
    }

    // ------------------------------------------------------------------
    // Part mutation
    // ------------------------------------------------------------------

    /// Set a part's gain and recompose.
    pub fn set_volume(&mut self, id: &str, volume_db: f32) -> Result<()> {
        let idx = self.part_index(id)?;
        self.parts[idx].volume_db = volume_db;
        self.rebuild();
        self.finish_edit();
        info!(part = %id, volume_db, "volume changed");
        Ok(())
    }

    /// Move a part's range (drag-resize) and recompose. Stored versions
    /// keep their length; a grown range is tail-filled from the base and
    /// a shrunk one trims the data.
    pub fn resize_part(&mut self, id: &str, start: usize, end: usize) -> Result<()> {
        self.validate_range(start, end)?;
        let idx = self.part_index(id)?;
        self.parts[idx].start = start;
        self.parts[idx].end = end;
        self.rebuild();
        self.finish_edit();
        info!(part = %id, start, end, "part resized");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Markers
    // ------------------------------------------------------------------

    /// Place a marker, keeping the list sorted and duplicate-free.
    pub fn add_marker(&mut self, position: usize) {
        let position = position.min(self.total_samples());
        if let Err(slot) = self.markers.binary_search(&position) {
            self.markers.insert(slot, position);
            self.snapshot();
        }
    }

    /// Remove a marker at an exact position. Returns false when absent.
    pub fn remove_marker(&mut self, position: usize) -> bool {
        match self.markers.binary_search(&position) {
            Ok(slot) => {
                self.markers.remove(slot);
                self.snapshot();
                true
            }
            Err(_) => false,
        }
    }

    pub fn clear_markers(&mut self) {
        if self.markers.is_empty() {
            return;
        }
        self.markers.clear();
        self.snapshot();
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    /// Restore the previous snapshot. Returns false at the bottom of the
    /// history.
    pub fn undo(&mut self) -> bool {
        let snapshot = match self.history.undo() {
            Some(s) => (s.parts.clone(), s.markers.clone()),
            None => return false,
        };
        self.restore(snapshot.0, snapshot.1);
        info!("undo");
        true
    }

    /// Restore the next snapshot. Returns false at the top of the history.
    pub fn redo(&mut self) -> bool {
        let snapshot = match self.history.redo() {
            Some(s) => (s.parts.clone(), s.markers.clone()),
            None => return false,
        };
        self.restore(snapshot.0, snapshot.1);
        info!("redo");
        true
    }

    /// Replace the live state with a snapshot's and recompose. Parts
    /// whose versions have all become unresolvable are dropped rather
    /// than failing the whole restore.
    fn restore(&mut self, parts: Vec<PartGroup>, markers: Vec<usize>) {
        self.parts = parts
            .into_iter()
            .filter(|part| {
                let alive = part.versions.iter().any(|v| match v {
                    Version::Stored(handle) => self.store.contains(handle),
                    Version::ComputedBase | Version::Silent => true,
                });
                if !alive {
                    warn!(part = %part.id, "dropping part with no resolvable versions");
                }
                alive
            })
            .collect();
        self.markers = markers;
        self.next_apply_order = self
            .parts
            .iter()
            .map(|p| p.apply_order)
            .max()
            .unwrap_or(0);
        self.rebuild();
        self.publish();
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    /// Min/max display columns for `width` pixels over
    /// `[offset, offset + visible)` of a track. Mipmaps are built lazily
    /// and dropped whenever the result is recomposed.
    pub fn envelope(&mut self, track: Track, offset: usize, visible: usize, width: usize) -> Vec<(f32, f32)> {
        let end = offset.saturating_add(visible);
        match track {
            Track::Source => {
                let mipmap = self
                    .source_mipmap
                    .get_or_insert_with(|| Mipmap::build(&self.source));
                mipmap.query(&self.source, offset, end, width)
            }
            Track::Result => {
                let mipmap = self
                    .result_mipmap
                    .get_or_insert_with(|| Mipmap::build(&self.result_display));
                mipmap.query(&self.result_display, offset, end, width)
            }
        }
    }

    // ------------------------------------------------------------------
    // Project persistence
    // ------------------------------------------------------------------

    /// Write the project to a directory: JSON manifest, rendered result
    /// WAV, and the undo history.
    pub fn save_project(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).map_err(|e| RetakeError::FileWriteError {
            path: dir.to_path_buf(),
            source: e,
        })?;

        let doc = ProjectDocument {
            sample_rate: self.sample_rate,
            markers: self.markers.clone(),
            parts: self.parts.clone(),
        };
        let json = serde_json::to_string_pretty(&doc)?;
        fs::write(dir.join(PROJECT_MANIFEST), json)?;

        audio::write_wav(&dir.join("result.wav"), &self.result, self.sample_rate)?;
        self.history.save(&dir.join("history.json"))?;

        info!(dir = %dir.display(), parts = self.parts.len(), "project saved");
        Ok(())
    }

    /// Open a saved project over a (re)loaded source buffer.
    ///
    /// The result buffer is not read back from disk; it is rebuilt from
    /// the part set, which the manifest round-trips exactly.
    pub fn load_project(
        dir: &Path,
        source: Vec<f32>,
        sample_rate: u32,
        store: Box<dyn VersionStore>,
    ) -> Result<Self> {
        let manifest = dir.join(PROJECT_MANIFEST);
        if !manifest.exists() {
            return Err(RetakeError::ProjectNotFound { path: manifest });
        }
        let json = fs::read_to_string(&manifest).map_err(|e| RetakeError::FileReadError {
            path: manifest.clone(),
            source: e,
        })?;
        let doc: ProjectDocument = serde_json::from_str(&json)?;

        let total = source.len();
        let mut session = Self {
            sample_rate: doc.sample_rate,
            source,
            result: vec![0.0; total],
            result_display: vec![0.0; total],
            parts: Vec::new(),
            markers: Vec::new(),
            history: HistoryManager::load(&dir.join("history.json"), DEFAULT_MAX_SNAPSHOTS),
            store,
            composer: Composer::new(doc.sample_rate),
            next_apply_order: 0,
            published: Arc::new(vec![0.0; total]),
            source_mipmap: None,
            result_mipmap: None,
        };

        // restore() drops parts whose stored versions went missing and
        // recomposes from what survives.
        session.restore(doc.parts, doc.markers);
        if session.history.is_empty() {
            session.snapshot();
        }

        info!(dir = %dir.display(), parts = session.parts.len(), "project loaded");
        Ok(session)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn part_index(&self, id: &str) -> Result<usize> {
        self.parts
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| RetakeError::PartNotFound { id: id.to_string() })
    }

    fn validate_range(&self, start: usize, end: usize) -> Result<()> {
        let total = self.total_samples();
        if start >= end || end > total {
            return Err(RetakeError::InvalidRange { start, end, total });
        }
        if end - start < MIN_PART_SAMPLES {
            return Err(RetakeError::RangeTooShort {
                len: end - start,
                min: MIN_PART_SAMPLES,
            });
        }
        Ok(())
    }

    /// Give `parts[idx]` a fresh (highest) precedence order, record its
    /// apply settings, and compose it into the result incrementally.
    ///
    /// Because the part becomes the newest application, writing just its
    /// own range is equivalent to a full rebuild.
    fn reapply(&mut self, idx: usize, options: ApplyOptions) {
        self.next_apply_order += 1;
        let part = &mut self.parts[idx];
        part.apply_order = self.next_apply_order;
        part.last_blend_ms = options.blend_ms;
        part.last_preserve = options.preserve_nested;

        let settings = ApplySettings {
            blend_ms: options.blend_ms,
            preserve_nested: options.preserve_nested,
        };
        let parts: &[PartGroup] = &self.parts;
        self.composer.apply_part(
            parts,
            self.store.as_ref(),
            &parts[idx],
            settings,
            &mut self.result,
            &mut self.result_display,
        );

        crate::compose::assign_levels(&mut self.parts);
        crate::compose::compute_overwritten_ranges(&mut self.parts);
    }

    fn rebuild(&mut self) {
        self.composer.rebuild_result_from_parts(
            &mut self.parts,
            self.store.as_ref(),
            &mut self.result,
            &mut self.result_display,
        );
        debug!(parts = self.parts.len(), "result rebuilt");
    }

    fn snapshot(&mut self) {
        self.history.push(self.parts.clone(), self.markers.clone());
    }

    /// Snapshot + publish, in that order, after a completed mutation.
    fn finish_edit(&mut self) {
        self.snapshot();
        self.publish();
    }

    /// Swap a fresh immutable copy of the result in for playback readers
    /// and drop the stale display mipmap.
    fn publish(&mut self) {
        self.published = Arc::new(self.result.clone());
        self.result_mipmap = None;
    }
}
