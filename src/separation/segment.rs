//! Fixed-window segmentation with overlap-add reassembly.

/// A window over the input, in frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// First frame covered.
    pub start: usize,
    /// Frames of real audio in the window (the rest is zero padding).
    pub len: usize,
}

/// How a long buffer is cut into fixed-length model windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentPlan {
    /// Window length in frames.
    pub segment: usize,
    /// Frames shared by consecutive windows.
    pub overlap: usize,
}

impl SegmentPlan {
    /// Plan from durations in seconds.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn from_secs(segment_secs: f32, overlap_secs: f32, sample_rate: u32) -> Self {
        let segment = (segment_secs * sample_rate as f32) as usize;
        let overlap = (overlap_secs * sample_rate as f32) as usize;
        Self {
            segment: segment.max(1),
            overlap: overlap.min(segment.saturating_sub(1)),
        }
    }

    /// Distance between window starts.
    pub fn stride(&self) -> usize {
        self.segment.saturating_sub(self.overlap).max(1)
    }

    /// Windows covering `total` frames.
    ///
    /// The final window ends exactly at `total`; windows never extend past
    /// the input except through padding.
    pub fn windows(&self, total: usize) -> Vec<Window> {
        let mut windows = Vec::new();
        if total == 0 {
            return windows;
        }

        let mut start = 0;
        loop {
            let end = (start + self.segment).min(total);
            windows.push(Window {
                start,
                len: end - start,
            });
            if end == total {
                break;
            }
            start += self.stride();
        }
        windows
    }
}

/// Linear crossfade weights for a window of `len` frames.
///
/// Ramps up over `overlap` frames unless `first`, and down unless `last`.
/// Adjacent ramps sum to one across each overlap.
#[allow(clippy::cast_precision_loss)]
pub fn crossfade_weights(len: usize, overlap: usize, first: bool, last: bool) -> Vec<f32> {
    let denom = (overlap + 1) as f32;
    (0..len)
        .map(|i| {
            let mut w = 1.0f32;
            if !first && i < overlap {
                w = w.min((i + 1) as f32 / denom);
            }
            if !last && i + overlap >= len {
                w = w.min((len - i) as f32 / denom);
            }
            w
        })
        .collect()
}

/// Accumulates per-window model output into full-length stems.
#[derive(Debug)]
pub struct OverlapAdd {
    /// `[source][channel][frame]`
    sums: Vec<Vec<Vec<f32>>>,
    weights: Vec<f32>,
    overlap: usize,
    window_count: usize,
    added: usize,
}

impl OverlapAdd {
    /// Accumulator for `sources` x `channels` x `total` frames over `window_count` windows.
    pub fn new(
        sources: usize,
        channels: usize,
        total: usize,
        overlap: usize,
        window_count: usize,
    ) -> Self {
        Self {
            sums: vec![vec![vec![0.0; total]; channels]; sources],
            weights: vec![0.0; total],
            overlap,
            window_count,
            added: 0,
        }
    }

    /// Add one window's output, indexed `[source][channel][frame]`.
    ///
    /// Only the first `window.len` frames of each output channel are used.
    pub fn add(&mut self, window: Window, output: &[Vec<Vec<f32>>]) {
        let first = self.added == 0;
        let last = self.added + 1 == self.window_count;
        let fade = crossfade_weights(window.len, self.overlap, first, last);

        for (source_sum, source_out) in self.sums.iter_mut().zip(output) {
            for (channel_sum, channel_out) in source_sum.iter_mut().zip(source_out) {
                let dest = &mut channel_sum[window.start..window.start + window.len];
                for ((d, s), w) in dest.iter_mut().zip(channel_out).zip(&fade) {
                    *d += s * w;
                }
            }
        }
        for (acc, w) in self.weights[window.start..window.start + window.len]
            .iter_mut()
            .zip(&fade)
        {
            *acc += w;
        }
        self.added += 1;
    }

    /// Normalise and return `[source][channel][frame]`.
    pub fn finish(mut self) -> Vec<Vec<Vec<f32>>> {
        for source in &mut self.sums {
            for channel in source {
                for (sample, weight) in channel.iter_mut().zip(&self.weights) {
                    if *weight > 1e-8 {
                        *sample /= weight;
                    }
                }
            }
        }
        self.sums
    }
}
