//! Composition engine
//!
//! Flattens an ordered set of overlapping, versioned parts into the single
//! linear result buffer. Parts are replayed in ascending `apply_order`
//! (oldest application first), so the user's most recent edit in a region
//! always wins; z-order by nesting depth plays no role.
//!
//! A part's "base" at any sample is the still-visible contribution of the
//! parts applied before it, resolved recursively. Because `apply_order`
//! strictly decreases on every recursive step, recursion is bounded by the
//! part count; the bound is carried as an explicit budget argument.

use tracing::warn;

use crate::audio::{db_to_linear, is_silent};
use crate::part::{PartGroup, Version};
use crate::store::VersionStore;

/// Crossfade lower bound in samples, applied whenever a blend is requested.
pub const MIN_FADE_SAMPLES: usize = 20;

/// Amplitude below which a base region counts as silent (no fade target).
pub const SILENCE_EPS: f32 = 1e-6;

/// Fade law used at part boundaries; a global toggle, not per part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FadeLaw {
    /// `t` / `1 - t` gains.
    #[default]
    Linear,
    /// `sin` / `cos` gains (constant perceived power).
    EqualPower,
}

impl FadeLaw {
    /// (incoming, outgoing) gain pair at normalized position `t` in (0, 1).
    #[inline]
    fn gains(self, t: f32) -> (f32, f32) {
        match self {
            FadeLaw::Linear => (t, 1.0 - t),
            FadeLaw::EqualPower => {
                let a = t * std::f32::consts::FRAC_PI_2;
                (a.sin(), a.cos())
            }
        }
    }
}

/// Settings replayed for one application of a part.
#[derive(Debug, Clone, Copy)]
pub struct ApplySettings {
    /// Crossfade length in milliseconds; 0 disables blending.
    pub blend_ms: u32,
    /// Write around fully nested parts instead of overwriting them.
    pub preserve_nested: bool,
}

/// The composition engine. Stateless apart from its configuration; all
/// part and buffer state is passed in per call.
#[derive(Debug, Clone)]
pub struct Composer {
    pub fade_law: FadeLaw,
    pub sample_rate: u32,
}

impl Composer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            fade_law: FadeLaw::default(),
            sample_rate,
        }
    }

    pub fn with_fade_law(mut self, law: FadeLaw) -> Self {
        self.fade_law = law;
        self
    }

    // ------------------------------------------------------------------
    // Base resolution
    // ------------------------------------------------------------------

    /// Compute the base signal for `part`: the still-visible contribution
    /// of every earlier-applied part intersecting its range, with per-part
    /// gain applied. Samples no earlier part covers are silence.
    pub fn compute_base_for_part(
        &self,
        parts: &[PartGroup],
        store: &dyn VersionStore,
        part: &PartGroup,
    ) -> Vec<f32> {
        self.base_with_budget(parts, store, part, parts.len())
    }

    fn base_with_budget(
        &self,
        parts: &[PartGroup],
        store: &dyn VersionStore,
        part: &PartGroup,
        budget: usize,
    ) -> Vec<f32> {
        let mut base = vec![0.0_f32; part.size()];
        if budget == 0 {
            // Unreachable while apply_order values are unique; degrade to
            // silence instead of recursing forever if that invariant breaks.
            warn!(part = %part.id, "base recursion budget exhausted");
            return base;
        }

        let mut under: Vec<&PartGroup> = parts
            .iter()
            .filter(|q| {
                q.id != part.id
                    && q.apply_order < part.apply_order
                    && q.start < part.end
                    && q.end > part.start
                    && !q.versions.is_empty()
            })
            .collect();
        under.sort_by_key(|q| q.apply_order);

        for q in under {
            let out = self.resolve_contribution(parts, store, q, budget - 1);
            let lo = q.start.max(part.start);
            let hi = q.end.min(part.end);
            for s in lo..hi {
                base[s - part.start] = out[s - q.start];
            }
        }

        base
    }

    /// Resolve a part's own visible output over its full range: active
    /// version data with gain, short data padded with the part's base,
    /// sentinels resolved. Gain is not re-applied to a part sitting on
    /// unmodified base, which would double-amplify already-amplified audio.
    ///
    /// A part whose last apply preserved nested children wrote around
    /// their ranges, so its visible contribution carries the same holes,
    /// filled from its own base. Without this a pass-through or tail fill
    /// above it would resurrect audio the user explicitly kept hidden.
    fn resolve_contribution(
        &self,
        parts: &[PartGroup],
        store: &dyn VersionStore,
        part: &PartGroup,
        budget: usize,
    ) -> Vec<f32> {
        let size = part.size();
        let mut out = match part.versions.get(part.active_idx) {
            None => return vec![0.0; size],
            // The pass-through is the base itself; nested holes filled
            // from the base would be a no-op.
            Some(Version::ComputedBase) => {
                return self.base_with_budget(parts, store, part, budget)
            }
            Some(Version::Silent) => vec![0.0; size],
            Some(Version::Stored(handle)) => match store.load(handle) {
                Ok(data) => {
                    let write_len = data.len().min(size);
                    let gain = db_to_linear(part.volume_db);
                    let mut out = if write_len < size {
                        self.base_with_budget(parts, store, part, budget)
                    } else {
                        vec![0.0; size]
                    };
                    for i in 0..write_len {
                        out[i] = data[i] * gain;
                    }
                    out
                }
                Err(err) => {
                    warn!(part = %part.id, handle, %err, "version unavailable, using base");
                    return self.base_with_budget(parts, store, part, budget);
                }
            },
        };

        if part.last_preserve {
            let holes = nested_holes(parts, part);
            if !holes.is_empty() {
                let base = self.base_with_budget(parts, store, part, budget);
                for &(hs, he) in &holes {
                    out[hs..he].copy_from_slice(&base[hs..he]);
                }
            }
        }

        out
    }

    // ------------------------------------------------------------------
    // Applying one part
    // ------------------------------------------------------------------

    /// Apply one part's active version into `result` and `display`.
    ///
    /// Tolerates stored data shorter than the part range (the tail is
    /// filled from the computed base, never left as a silence gap) and an
    /// unreadable stored version (falls back to the base entirely).
    pub fn apply_part(
        &self,
        parts: &[PartGroup],
        store: &dyn VersionStore,
        part: &PartGroup,
        settings: ApplySettings,
        result: &mut [f32],
        display: &mut [f32],
    ) {
        let size = part.size();
        if size == 0 || part.versions.is_empty() || part.end > result.len() {
            return;
        }

        let base = self.compute_base_for_part(parts, store, part);

        // Resolve the active version; None means "pass the base through"
        // (either the base sentinel or an unreadable stored version).
        let data: Option<Vec<f32>> = match &part.versions[part.active_idx] {
            Version::Silent => Some(vec![0.0; size]),
            Version::ComputedBase => None,
            Version::Stored(handle) => match store.load(handle) {
                Ok(d) => Some(d),
                Err(err) => {
                    warn!(part = %part.id, handle, %err, "version unavailable, using base");
                    None
                }
            },
        };

        let (mut out, write_len) = match data {
            Some(d) => {
                let write_len = d.len().min(size);
                let gain = db_to_linear(part.volume_db);
                let mut out = base.clone();
                for i in 0..write_len {
                    out[i] = d[i] * gain;
                }
                (out, write_len)
            }
            None => (base.clone(), size),
        };

        // Segments of [0, size) that receive this part's data; fully
        // nested parts punch holes that keep the recomputed base instead,
        // so child edits are not silently overwritten.
        let segments = if settings.preserve_nested {
            let holes = nested_holes(parts, part);
            for &(hs, he) in &holes {
                out[hs..he].copy_from_slice(&base[hs..he]);
            }
            complement(&holes, size)
        } else {
            vec![(0, size)]
        };

        if settings.blend_ms > 0 && write_len > 0 {
            for &(seg_start, seg_end) in &segments {
                // Fades only make sense where real data was written.
                let seg_end = seg_end.min(write_len);
                if seg_start >= seg_end {
                    continue;
                }
                self.crossfade_segment(&mut out, &base, seg_start, seg_end, settings.blend_ms);
            }
        }

        result[part.start..part.end].copy_from_slice(&out);
        display[part.start..part.end].copy_from_slice(&out);
    }

    /// Crossfade both ends of `out[seg_start..seg_end]` against `base`,
    /// skipping an end whose underlying base is silent.
    fn crossfade_segment(
        &self,
        out: &mut [f32],
        base: &[f32],
        seg_start: usize,
        seg_end: usize,
        blend_ms: u32,
    ) {
        let seg_len = seg_end - seg_start;
        let requested = (blend_ms as usize * self.sample_rate as usize) / 1000;
        let fade = requested.max(MIN_FADE_SAMPLES).min(seg_len / 4);
        if fade == 0 {
            return;
        }

        // Leading edge: base fades out, data fades in.
        if !is_silent(&base[seg_start..seg_start + fade], SILENCE_EPS) {
            for i in 0..fade {
                let t = (i + 1) as f32 / (fade + 1) as f32;
                let (g_in, g_out) = self.fade_law.gains(t);
                let p = seg_start + i;
                out[p] = out[p] * g_in + base[p] * g_out;
            }
        }

        // Trailing edge: data fades out, base fades back in.
        if !is_silent(&base[seg_end - fade..seg_end], SILENCE_EPS) {
            for i in 0..fade {
                let t = (fade - i) as f32 / (fade + 1) as f32;
                let (g_in, g_out) = self.fade_law.gains(t);
                let p = seg_end - fade + i;
                out[p] = out[p] * g_in + base[p] * g_out;
            }
        }
    }

    // ------------------------------------------------------------------
    // Full rebuild
    // ------------------------------------------------------------------

    /// Rebuild the result buffer from scratch: zero it, reassign display
    /// levels, replay every part with its last recorded settings in
    /// ascending `apply_order`, and recompute the overwritten overlays.
    ///
    /// Deterministic and idempotent: rebuilding twice with no intervening
    /// mutation yields byte-identical buffers.
    pub fn rebuild_result_from_parts(
        &self,
        parts: &mut [PartGroup],
        store: &dyn VersionStore,
        result: &mut [f32],
        display: &mut [f32],
    ) {
        result.fill(0.0);
        display.fill(0.0);

        assign_levels(parts);

        let mut order: Vec<usize> = (0..parts.len()).collect();
        order.sort_by_key(|&i| parts[i].apply_order);

        for &i in &order {
            let settings = ApplySettings {
                blend_ms: parts[i].last_blend_ms,
                preserve_nested: parts[i].last_preserve,
            };
            let shared: &[PartGroup] = parts;
            self.apply_part(shared, store, &shared[i], settings, result, display);
        }

        compute_overwritten_ranges(parts);
    }
}

// ----------------------------------------------------------------------
// Derived display metadata
// ----------------------------------------------------------------------

/// Greedy interval stacking for display rows: sort by start then by
/// decreasing length, place each part on the first row whose last end is
/// at or before its start.
pub fn assign_levels(parts: &mut [PartGroup]) {
    let mut order: Vec<usize> = (0..parts.len()).collect();
    order.sort_by_key(|&i| (parts[i].start, std::cmp::Reverse(parts[i].size())));

    let mut level_ends: Vec<usize> = Vec::new();
    for idx in order {
        let (start, end) = (parts[idx].start, parts[idx].end);
        let slot = level_ends.iter().position(|&e| start >= e);
        match slot {
            Some(level) => {
                parts[idx].level = level;
                level_ends[level] = end;
            }
            None => {
                parts[idx].level = level_ends.len();
                level_ends.push(end);
            }
        }
    }
}

/// Recompute each part's overwritten sub-ranges: the intersections with
/// later-applied parts, except where the part is fully nested inside a
/// later part whose last apply preserved nested edits. Display metadata
/// only; never consulted by the audio path.
pub fn compute_overwritten_ranges(parts: &mut [PartGroup]) {
    let computed: Vec<Vec<(usize, usize)>> = parts
        .iter()
        .map(|p| {
            let mut intervals: Vec<(usize, usize)> = parts
                .iter()
                .filter(|q| q.id != p.id && q.apply_order > p.apply_order)
                .filter_map(|q| {
                    let lo = p.start.max(q.start);
                    let hi = p.end.min(q.end);
                    if lo >= hi {
                        return None;
                    }
                    let nested = p.start >= q.start && p.end <= q.end;
                    if nested && q.last_preserve {
                        return None;
                    }
                    Some((lo, hi))
                })
                .collect();
            merge_intervals(&mut intervals);
            intervals
        })
        .collect();

    for (part, ranges) in parts.iter_mut().zip(computed) {
        part.overwritten_ranges = ranges;
    }
}

/// Merge adjacent and overlapping intervals in place.
fn merge_intervals(intervals: &mut Vec<(usize, usize)>) {
    intervals.sort_unstable();
    let mut merged: Vec<(usize, usize)> = Vec::with_capacity(intervals.len());
    for &(lo, hi) in intervals.iter() {
        match merged.last_mut() {
            Some(last) if lo <= last.1 => last.1 = last.1.max(hi),
            _ => merged.push((lo, hi)),
        }
    }
    *intervals = merged;
}

/// Ranges (relative to `part.start`) covered by parts fully nested inside
/// `part`, merged.
fn nested_holes(parts: &[PartGroup], part: &PartGroup) -> Vec<(usize, usize)> {
    let mut holes: Vec<(usize, usize)> = parts
        .iter()
        .filter(|q| q.id != part.id && q.start >= part.start && q.end <= part.end)
        .map(|q| (q.start - part.start, q.end - part.start))
        .collect();
    merge_intervals(&mut holes);
    holes
}

/// Complement of sorted disjoint `holes` within `[0, size)`.
fn complement(holes: &[(usize, usize)], size: usize) -> Vec<(usize, usize)> {
    let mut segments = Vec::with_capacity(holes.len() + 1);
    let mut cursor = 0;
    for &(lo, hi) in holes {
        if cursor < lo {
            segments.push((cursor, lo));
        }
        cursor = cursor.max(hi);
    }
    if cursor < size {
        segments.push((cursor, size));
    }
    segments
}
