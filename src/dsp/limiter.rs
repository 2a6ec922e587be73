//! Limiter Effect
//!
//! Offline look-ahead soft-knee limiter for the master bus.
//!
//! The gain curve is built in three passes over the whole buffer:
//! 1. required gain per frame from a soft-knee, infinite-ratio gain computer
//! 2. a sliding minimum of the required gain over ±look-ahead
//! 3. a moving average of that minimum over the same window
//!
//! Every window that averages into frame `i` contains `i`, so the smoothed
//! gain never exceeds the gain frame `i` needs. A release follower can only
//! lower it further. The output therefore never passes the ceiling and is
//! never hard clipped.

use std::collections::VecDeque;

use super::effect::Effect;
use crate::engine::buffer::{db_to_linear, linear_to_db};
use crate::engine::AudioBuffer;
use crate::impl_effect_common;

// ============================================================================
// Constants
// ============================================================================

/// Peak level above which the master bus is limited (linear)
pub const DEFAULT_THRESHOLD: f32 = 0.95;

/// Default knee width in dB
const DEFAULT_KNEE_DB: f32 = 2.0;

/// Default look-ahead (half window) in ms
const DEFAULT_LOOKAHEAD_MS: f32 = 5.0;

/// Default release time in ms
const DEFAULT_RELEASE_MS: f32 = 80.0;

/// Calculate envelope coefficient from time constant
#[inline]
fn time_to_coeff(time_ms: f32, sample_rate: u32) -> f32 {
    let samples = time_ms * sample_rate as f32 / 1000.0;
    if samples <= 0.0 {
        0.0
    } else {
        (-1.0 / samples).exp()
    }
}

// ============================================================================
// Limiter Effect
// ============================================================================

/// Look-ahead soft-knee limiter
///
/// # Parameters
/// - `ceiling`: Maximum output level (linear)
/// - `knee_db`: Width of the soft knee centred on the ceiling
/// - `lookahead_ms`: Half-width of the gain smoothing window
/// - `release_ms`: Time constant for gain recovery
#[derive(Debug, Clone)]
pub struct Limiter {
    ceiling: f32,
    knee_db: f32,
    lookahead_ms: f32,
    release_ms: f32,
    sample_rate: u32,
    /// Deepest gain reduction applied by the last `process` call (dB, <= 0)
    last_reduction_db: f32,
}

impl Limiter {
    /// Create a limiter with the given linear ceiling
    pub fn new(ceiling: f32) -> Self {
        Self {
            ceiling: ceiling.clamp(0.01, 1.0),
            knee_db: DEFAULT_KNEE_DB,
            lookahead_ms: DEFAULT_LOOKAHEAD_MS,
            release_ms: DEFAULT_RELEASE_MS,
            sample_rate: crate::engine::buffer::DEFAULT_SAMPLE_RATE,
            last_reduction_db: 0.0,
        }
    }

    pub fn ceiling(&self) -> f32 {
        self.ceiling
    }

    /// Deepest gain reduction applied by the last `process` call, in dB
    pub fn last_reduction_db(&self) -> f32 {
        self.last_reduction_db
    }

    /// Gain (linear, <= 1) that brings a frame at `level` under the ceiling
    fn required_gain(&self, level: f32) -> f32 {
        let input_db = linear_to_db(level);
        let ceiling_db = linear_to_db(self.ceiling);
        let half_knee = self.knee_db / 2.0;

        let over = input_db - (ceiling_db - half_knee);
        if over <= 0.0 {
            return 1.0;
        }
        let output_db = if over >= self.knee_db {
            ceiling_db
        } else {
            // Infinite ratio knee: y = x - over²/(2·knee), never above the ceiling
            input_db - over * over / (2.0 * self.knee_db)
        };
        db_to_linear(output_db - input_db).min(1.0)
    }

    /// Build the per-frame gain curve for `buffer`
    fn gain_curve(&self, buffer: &AudioBuffer) -> Vec<f32> {
        let len = buffer.len();
        let reach = (self.lookahead_ms * self.sample_rate as f32 / 1000.0).round() as usize;

        let required: Vec<f32> = (0..len)
            .map(|i| {
                let level = buffer
                    .samples
                    .iter()
                    .map(|ch| ch[i].abs())
                    .fold(0.0_f32, f32::max);
                self.required_gain(level)
            })
            .collect();

        let floor = sliding_min(&required, reach);
        let smoothed = moving_average(&floor, reach);

        let release = time_to_coeff(self.release_ms, self.sample_rate);
        let mut current = 1.0_f32;
        smoothed
            .into_iter()
            .zip(required)
            .map(|(mean, needed)| {
                // Clamp away float rounding in the mean
                let target = mean.min(needed);
                current = if target < current {
                    target
                } else {
                    (current + (1.0 - release) * (target - current)).min(target)
                };
                current
            })
            .collect()
    }
}

impl Default for Limiter {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl Effect for Limiter {
    fn process(&mut self, buffer: &mut AudioBuffer) {
        self.sample_rate = buffer.sample_rate;
        let gains = self.gain_curve(buffer);

        let mut deepest = 1.0_f32;
        for (i, &gain) in gains.iter().enumerate() {
            deepest = deepest.min(gain);
            for channel in &mut buffer.samples {
                channel[i] *= gain;
            }
        }
        self.last_reduction_db = linear_to_db(deepest);
    }

    fn prepare(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
    }

    fn reset(&mut self) {
        self.last_reduction_db = 0.0;
    }

    impl_effect_common!(Limiter, "limiter", "Limiter");
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Minimum of `values` over the window `[i - reach, i + reach]` (clipped)
fn sliding_min(values: &[f32], reach: usize) -> Vec<f32> {
    let len = values.len();
    let mut out = Vec::with_capacity(len);
    // Indices with increasing values; front is the window minimum
    let mut window: VecDeque<usize> = VecDeque::new();
    let mut next = 0;

    for i in 0..len {
        let hi = (i + reach).min(len - 1);
        while next <= hi {
            while window.back().is_some_and(|&j| values[j] >= values[next]) {
                window.pop_back();
            }
            window.push_back(next);
            next += 1;
        }
        let lo = i.saturating_sub(reach);
        while window.front().is_some_and(|&j| j < lo) {
            window.pop_front();
        }
        out.push(window.front().map_or(1.0, |&j| values[j]));
    }
    out
}

/// Mean of `values` over the window `[i - reach, i + reach]` (clipped)
fn moving_average(values: &[f32], reach: usize) -> Vec<f32> {
    let len = values.len();
    let mut prefix = Vec::with_capacity(len + 1);
    prefix.push(0.0_f64);
    for &v in values {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + v as f64);
    }

    (0..len)
        .map(|i| {
            let lo = i.saturating_sub(reach);
            let hi = (i + reach).min(len - 1);
            ((prefix[hi + 1] - prefix[lo]) / (hi + 1 - lo) as f64) as f32
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::io::generate_test_tone;
    use crate::engine::ChannelLayout;

    #[test]
    fn test_sliding_min() {
        let values = [1.0, 0.5, 1.0, 1.0, 0.2, 1.0, 1.0];
        assert_eq!(
            sliding_min(&values, 1),
            vec![0.5, 0.5, 0.5, 0.2, 0.2, 0.2, 1.0]
        );
    }

    #[test]
    fn test_moving_average() {
        let values = [0.0, 3.0, 0.0, 3.0];
        let avg = moving_average(&values, 1);
        assert!((avg[0] - 1.5).abs() < 1e-6);
        assert!((avg[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_quiet_signal_untouched() {
        let mut tone = generate_test_tone(440.0, 0.2, 44100);
        tone.apply_gain_linear(0.5);
        let original = tone.clone();
        let mut limiter = Limiter::default();
        limiter.process(&mut tone);
        assert_eq!(tone, original);
        assert_eq!(limiter.last_reduction_db(), 0.0);
    }

    #[test]
    fn test_hot_signal_never_exceeds_ceiling() {
        let mut tone = generate_test_tone(220.0, 0.5, 44100).to_stereo();
        tone.apply_gain_linear(3.0);
        let mut limiter = Limiter::default();
        limiter.process(&mut tone);

        assert!(tone.peak() <= DEFAULT_THRESHOLD + 1e-5, "peak {}", tone.peak());
        assert!(limiter.last_reduction_db() < -9.0);
    }

    #[test]
    fn test_single_spike_is_smoothed() {
        let mut buffer = AudioBuffer::new(4410, ChannelLayout::Mono, 44100);
        buffer.samples[0].fill(0.5);
        buffer.samples[0][2000] = 2.0;
        Limiter::default().process(&mut buffer);

        assert!(buffer.peak() <= DEFAULT_THRESHOLD + 1e-5);
        // The gain ramps down ahead of the spike instead of stepping
        let before = &buffer.samples[0][1700..2000];
        let max_step = before
            .windows(2)
            .map(|w| (w[1] - w[0]).abs())
            .fold(0.0_f32, f32::max);
        assert!(max_step < 0.01, "max step {}", max_step);
    }
}
