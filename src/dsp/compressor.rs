//! Compressor effect
//!
//! A feed-forward dynamics processor used to even out category layers.
//! Features linked stereo peak detection, a gain computer with soft knee and
//! attack/release smoothing of the gain.

use serde::{Deserialize, Serialize};

use super::effect::Effect;
use crate::engine::buffer::{db_to_linear, linear_to_db};
use crate::engine::AudioBuffer;
use crate::error::ProfileViolation;
use crate::impl_effect_common;

/// Floor used when converting silence to dB
const SILENCE_FLOOR_DB: f32 = -96.0;

/// Compressor parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompressorParams {
    /// Threshold level in dB (-60 to 0 dB)
    pub threshold_db: f32,
    /// Compression ratio (1.0 to 20.0, representing 1:1 to 20:1)
    pub ratio: f32,
    /// Attack time in milliseconds (0.1 to 100 ms)
    pub attack_ms: f32,
    /// Release time in milliseconds (10 to 1000 ms)
    pub release_ms: f32,
    /// Knee width in dB (0 = hard knee, up to 12 dB for soft knee)
    pub knee_db: f32,
    /// Makeup gain in dB (0 to 24 dB)
    pub makeup_gain_db: f32,
}

impl Default for CompressorParams {
    /// Gentle 2:1 levelling at -20 dB
    fn default() -> Self {
        Self {
            threshold_db: -20.0,
            ratio: 2.0,
            attack_ms: 20.0,
            release_ms: 250.0,
            knee_db: 6.0,
            makeup_gain_db: 0.0,
        }
    }
}

impl CompressorParams {
    /// Collect every out-of-range parameter, prefixing field names with `path`
    pub fn violations(&self, path: &str) -> Vec<ProfileViolation> {
        let checks: [(&str, f32, f32, f32); 6] = [
            ("threshold_db", self.threshold_db, -60.0, 0.0),
            ("ratio", self.ratio, 1.0, 20.0),
            ("attack_ms", self.attack_ms, 0.1, 100.0),
            ("release_ms", self.release_ms, 10.0, 1000.0),
            ("knee_db", self.knee_db, 0.0, 12.0),
            ("makeup_gain_db", self.makeup_gain_db, 0.0, 24.0),
        ];

        checks
            .iter()
            .filter(|(_, value, min, max)| !(*min..=*max).contains(value))
            .map(|(name, value, min, max)| {
                ProfileViolation::new(
                    format!("{}.{}", path, name),
                    format!("{} is outside {} to {}", value, min, max),
                )
            })
            .collect()
    }

    /// Clamp parameters to valid ranges
    pub fn clamp(&mut self) {
        self.threshold_db = self.threshold_db.clamp(-60.0, 0.0);
        self.ratio = self.ratio.clamp(1.0, 20.0);
        self.attack_ms = self.attack_ms.clamp(0.1, 100.0);
        self.release_ms = self.release_ms.clamp(10.0, 1000.0);
        self.knee_db = self.knee_db.clamp(0.0, 12.0);
        self.makeup_gain_db = self.makeup_gain_db.clamp(0.0, 24.0);
    }
}

/// Compressor dynamics processor
#[derive(Debug, Clone)]
pub struct Compressor {
    params: CompressorParams,
    sample_rate: u32,
    attack_coeff: f32,
    release_coeff: f32,
    /// Current smoothed gain (linear), shared by all channels
    gain: f32,
    /// Deepest gain reduction seen since the last reset (dB, <= 0)
    max_reduction_db: f32,
}

impl Compressor {
    /// Create a new compressor with custom parameters (clamped)
    pub fn with_params(params: CompressorParams) -> Self {
        let mut comp = Self {
            params,
            sample_rate: crate::engine::buffer::DEFAULT_SAMPLE_RATE,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            gain: 1.0,
            max_reduction_db: 0.0,
        };
        comp.params.clamp();
        comp.update_coefficients();
        comp
    }

    pub fn params(&self) -> &CompressorParams {
        &self.params
    }

    /// Deepest gain reduction applied since the last reset, in dB
    pub fn max_gain_reduction_db(&self) -> f32 {
        self.max_reduction_db
    }

    /// Update attack/release coefficients based on sample rate and time constants
    fn update_coefficients(&mut self) {
        // coeff = exp(-1 / time_in_samples)
        let attack_samples = (self.params.attack_ms / 1000.0) * self.sample_rate as f32;
        let release_samples = (self.params.release_ms / 1000.0) * self.sample_rate as f32;

        self.attack_coeff = if attack_samples > 0.0 {
            (-1.0 / attack_samples).exp()
        } else {
            0.0
        };
        self.release_coeff = if release_samples > 0.0 {
            (-1.0 / release_samples).exp()
        } else {
            0.0
        };
    }

    /// Compute gain reduction for a given input level in dB
    /// Returns the gain reduction in dB (zero or negative)
    fn compute_gain_reduction_db(&self, input_db: f32) -> f32 {
        let threshold = self.params.threshold_db;
        let ratio = self.params.ratio;
        let knee = self.params.knee_db;

        if knee > 0.0 {
            let knee_start = threshold - knee / 2.0;
            let knee_end = threshold + knee / 2.0;

            if input_db <= knee_start {
                0.0
            } else if input_db >= knee_end {
                (threshold + (input_db - threshold) / ratio) - input_db
            } else {
                // Quadratic interpolation of the slope across the knee
                let over = input_db - knee_start;
                (1.0 / ratio - 1.0) * over * over / (2.0 * knee)
            }
        } else if input_db <= threshold {
            0.0
        } else {
            (threshold + (input_db - threshold) / ratio) - input_db
        }
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::with_params(CompressorParams::default())
    }
}

impl Effect for Compressor {
    fn process(&mut self, buffer: &mut AudioBuffer) {
        if buffer.sample_rate != self.sample_rate {
            self.prepare(buffer.sample_rate);
        }
        let makeup = db_to_linear(self.params.makeup_gain_db);

        for frame in 0..buffer.len() {
            // Linked detection: loudest channel drives all channels
            let level = buffer
                .samples
                .iter()
                .map(|channel| channel[frame].abs())
                .fold(0.0_f32, f32::max);
            let input_db = linear_to_db(level).max(SILENCE_FLOOR_DB);

            let target_db = self.compute_gain_reduction_db(input_db);
            let target = db_to_linear(target_db);

            let coeff = if target < self.gain {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.gain = coeff * self.gain + (1.0 - coeff) * target;
            self.max_reduction_db = self.max_reduction_db.min(linear_to_db(self.gain));

            let total = self.gain * makeup;
            for channel in &mut buffer.samples {
                channel[frame] *= total;
            }
        }
    }

    fn prepare(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
        self.update_coefficients();
    }

    fn reset(&mut self) {
        self.gain = 1.0;
        self.max_reduction_db = 0.0;
    }

    impl_effect_common!(Compressor, "compressor", "Compressor");
}

// ============================================================================
// Tests
// ============================================================================
