//! Min/max mipmap for waveform display
//!
//! Precomputed pyramid of per-block minimum and maximum sample values over
//! a buffer, so a display query touches O(width) blocks instead of every
//! sample in view. The mipmap holds no reference to the buffer it was
//! built from and does not track staleness; whoever mutates the buffer
//! rebuilds it.

use tracing::debug;

/// Default samples per block at the finest pyramid level.
pub const DEFAULT_BLOCK_SIZE: usize = 256;

#[derive(Debug, Clone)]
struct Level {
    mins: Vec<f32>,
    maxs: Vec<f32>,
}

/// Min/max pyramid over a sample buffer.
///
/// Level `k` summarizes blocks of `block_size << k` samples; levels halve
/// in length until a single block covers the whole buffer.
#[derive(Debug, Clone)]
pub struct Mipmap {
    block_size: usize,
    len: usize,
    levels: Vec<Level>,
}

impl Mipmap {
    /// Build a pyramid over `samples` with the default block size.
    pub fn build(samples: &[f32]) -> Self {
        Self::build_with_block_size(samples, DEFAULT_BLOCK_SIZE)
    }

    pub fn build_with_block_size(samples: &[f32], block_size: usize) -> Self {
        let block_size = block_size.max(2);
        let mut levels = Vec::new();

        if !samples.is_empty() {
            let mut mins = Vec::with_capacity(samples.len() / block_size + 1);
            let mut maxs = Vec::with_capacity(samples.len() / block_size + 1);
            for chunk in samples.chunks(block_size) {
                let (mut lo, mut hi) = (f32::INFINITY, f32::NEG_INFINITY);
                for &s in chunk {
                    lo = lo.min(s);
                    hi = hi.max(s);
                }
                mins.push(lo);
                maxs.push(hi);
            }
            levels.push(Level { mins, maxs });

            while let Some(prev) = levels.last().filter(|l| l.mins.len() > 1) {
                let n = prev.mins.len();
                let mut mins = Vec::with_capacity((n + 1) / 2);
                let mut maxs = Vec::with_capacity((n + 1) / 2);
                for i in (0..n).step_by(2) {
                    // An odd trailing block pairs with itself.
                    let j = (i + 1).min(n - 1);
                    mins.push(prev.mins[i].min(prev.mins[j]));
                    maxs.push(prev.maxs[i].max(prev.maxs[j]));
                }
                levels.push(Level { mins, maxs });
            }
        }

        debug!(
            samples = samples.len(),
            block_size,
            levels = levels.len(),
            "mipmap built"
        );

        Self {
            block_size,
            len: samples.len(),
            levels,
        }
    }

    /// Number of samples the pyramid was built over.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Samples summarized per block at pyramid level `k`.
    fn level_block(&self, k: usize) -> usize {
        self.block_size << k
    }

    /// Deepest level whose block still fits within `spp` samples per pixel.
    fn level_for(&self, spp: usize) -> usize {
        let mut level = 0;
        while level + 1 < self.levels.len() && self.level_block(level + 1) <= spp {
            level += 1;
        }
        level
    }

    /// Render `[start, end)` of `samples` into `width` (min, max) columns.
    ///
    /// When fewer samples than one block map to a pixel the query scans
    /// `samples` directly for exact extrema; otherwise it reads the
    /// coarsest level that still resolves a pixel, over-covering each
    /// pixel's range by at most one block on either side. Out-of-range
    /// pixels render as (0, 0).
    pub fn query(
        &self,
        samples: &[f32],
        start: usize,
        end: usize,
        width: usize,
    ) -> Vec<(f32, f32)> {
        let mut columns = vec![(0.0_f32, 0.0_f32); width];
        let end = end.min(self.len).min(samples.len());
        if width == 0 || start >= end || self.levels.is_empty() {
            return columns;
        }

        let visible = end - start;
        let spp = visible as f64 / width as f64;

        if (spp as usize) < self.block_size {
            for (px, column) in columns.iter_mut().enumerate() {
                let lo = start + (px as f64 * spp) as usize;
                let hi = (start + ((px + 1) as f64 * spp) as usize).max(lo + 1).min(end);
                if lo >= end {
                    break;
                }
                let (mut min, mut max) = (f32::INFINITY, f32::NEG_INFINITY);
                for &s in &samples[lo..hi] {
                    min = min.min(s);
                    max = max.max(s);
                }
                *column = (min, max);
            }
            return columns;
        }

        let level_idx = self.level_for(spp as usize);
        let level = &self.levels[level_idx];
        let block = self.level_block(level_idx);

        for (px, column) in columns.iter_mut().enumerate() {
            let lo = start + (px as f64 * spp) as usize;
            let hi = (start + ((px + 1) as f64 * spp) as usize).max(lo + 1).min(end);
            if lo >= end {
                break;
            }
            let b_lo = lo / block;
            let b_hi = ((hi + block - 1) / block).min(level.mins.len());
            let (mut min, mut max) = (f32::INFINITY, f32::NEG_INFINITY);
            for b in b_lo..b_hi {
                min = min.min(level.mins[b]);
                max = max.max(level.maxs[b]);
            }
            *column = (min, max);
        }

        columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn ramp(n: usize) -> Vec<f32> {
        (0..n).map(|i| i as f32 / n as f32).collect()
    }

    #[test]
    fn test_empty_buffer() {
        let samples: Vec<f32> = Vec::new();
        let mipmap = Mipmap::build(&samples);
        assert!(mipmap.is_empty());
        assert_eq!(mipmap.query(&samples, 0, 100, 4), vec![(0.0, 0.0); 4]);
    }

    #[test]
    fn test_pyramid_shape() {
        let samples = ramp(1024);
        let mipmap = Mipmap::build_with_block_size(&samples, 256);
        // 1024 samples: 4 blocks, then 2, then 1.
        assert_eq!(mipmap.levels.len(), 3);
        assert_eq!(mipmap.levels[0].mins.len(), 4);
        assert_eq!(mipmap.levels[2].mins.len(), 1);
    }

    #[test]
    fn test_coarse_level_covers_fine() {
        let samples: Vec<f32> = (0..10_000).map(|i| ((i * 37) % 101) as f32 - 50.0).collect();
        let mipmap = Mipmap::build_with_block_size(&samples, 64);

        for k in 1..mipmap.levels.len() {
            let coarse = &mipmap.levels[k];
            let fine = &mipmap.levels[k - 1];
            for (b, (&min, &max)) in coarse.mins.iter().zip(&coarse.maxs).enumerate() {
                let lo = 2 * b;
                let hi = (2 * b + 2).min(fine.mins.len());
                let fine_min = fine.mins[lo..hi].iter().cloned().fold(f32::INFINITY, f32::min);
                let fine_max = fine.maxs[lo..hi]
                    .iter()
                    .cloned()
                    .fold(f32::NEG_INFINITY, f32::max);
                assert_eq!(min, fine_min);
                assert_eq!(max, fine_max);
            }
        }
    }

    #[test_case(4; "few columns")]
    #[test_case(100; "typical width")]
    #[test_case(1000; "dense width")]
    fn test_query_bounds_contain_exact_extrema(width: usize) {
        let samples: Vec<f32> = (0..50_000)
            .map(|i| (i as f32 * 0.01).sin() * 0.8)
            .collect();
        let mipmap = Mipmap::build(&samples);
        let columns = mipmap.query(&samples, 0, samples.len(), width);
        assert_eq!(columns.len(), width);

        let spp = samples.len() as f64 / width as f64;
        for (px, &(min, max)) in columns.iter().enumerate() {
            let lo = (px as f64 * spp) as usize;
            let hi = (((px + 1) as f64 * spp) as usize).max(lo + 1).min(samples.len());
            let exact_min = samples[lo..hi].iter().cloned().fold(f32::INFINITY, f32::min);
            let exact_max = samples[lo..hi]
                .iter()
                .cloned()
                .fold(f32::NEG_INFINITY, f32::max);
            // Block-aligned reads may over-cover but never under-cover.
            assert!(min <= exact_min + 1e-6);
            assert!(max >= exact_max - 1e-6);
            assert!(min <= max);
        }
    }

    #[test]
    fn test_zoomed_in_query_is_exact() {
        let samples = ramp(100_000);
        let mipmap = Mipmap::build(&samples);

        // 1000 samples over 100 columns: 10 samples per pixel, well below
        // the block size, so the direct scan path produces exact extrema.
        let columns = mipmap.query(&samples, 5000, 6000, 100);
        for (px, &(min, max)) in columns.iter().enumerate() {
            let lo = 5000 + px * 10;
            assert_eq!(min, samples[lo]);
            assert_eq!(max, samples[lo + 9]);
        }
    }

    #[test]
    fn test_query_clamps_out_of_range() {
        let samples = ramp(1000);
        let mipmap = Mipmap::build(&samples);

        let columns = mipmap.query(&samples, 900, 5000, 10);
        assert_eq!(columns.len(), 10);
        // The view extends past the end; clamped range still renders.
        assert!(columns[0].1 >= 0.9);

        let past = mipmap.query(&samples, 2000, 3000, 10);
        assert_eq!(past, vec![(0.0, 0.0); 10]);
    }

    #[test]
    fn test_odd_tail_block() {
        // 300 samples with block 256: second block is a 44-sample tail.
        let mut samples = vec![0.0; 300];
        samples[299] = 0.9;
        let mipmap = Mipmap::build_with_block_size(&samples, 256);
        assert_eq!(mipmap.levels[0].maxs.len(), 2);
        assert_eq!(mipmap.levels[0].maxs[1], 0.9);
        // Odd block propagates to the top level unchanged.
        assert_eq!(mipmap.levels.last().unwrap().maxs[0], 0.9);
    }
}
