//! Reverb effect
//!
//! Freeverb-style room simulation for category layers:
//! - 8 parallel damped comb filters per ear
//! - 4 series allpass filters per ear for diffusion
//! - Stereo width control

use serde::{Deserialize, Serialize};

use super::effect::Effect;
use crate::engine::AudioBuffer;
use crate::error::ProfileViolation;
use crate::impl_effect_common;

// ============================================================================
// Freeverb Constants
// ============================================================================

/// Reference sample rate for Freeverb delays
const REFERENCE_SAMPLE_RATE: f64 = 44100.0;

/// Comb filter delays at 44100 Hz
const COMB_DELAYS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];

/// Allpass filter delays at 44100 Hz
const ALLPASS_DELAYS: [usize; 4] = [556, 441, 341, 225];

/// Extra delay of the right ear's filters, in reference samples
const STEREO_SPREAD: usize = 23;

/// Attenuation of the signal fed into the comb bank
const FIXED_GAIN: f32 = 0.015;

/// Fixed feedback for allpass filters
const ALLPASS_FEEDBACK: f32 = 0.5;

/// room_size 0..1 maps onto comb feedback ROOM_OFFSET..ROOM_OFFSET+ROOM_SCALE
const ROOM_SCALE: f32 = 0.28;
const ROOM_OFFSET: f32 = 0.7;

/// Scale factor for damping parameter
const DAMP_SCALE: f32 = 0.4;

// ============================================================================
// Parameters
// ============================================================================

/// Reverb parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReverbParams {
    /// Room size: 0 (tiny) to 1 (huge hall)
    pub room_size: f32,
    /// Damping: 0 (bright) to 1 (dark)
    pub damping: f32,
    /// Wet signal level: 0 to 1
    pub wet_level: f32,
    /// Dry signal level: 0 to 1
    pub dry_level: f32,
    /// Stereo width: 0 (mono) to 1 (full stereo)
    pub width: f32,
}

impl Default for ReverbParams {
    /// A soft, dark room that blurs clip edges without washing them out
    fn default() -> Self {
        Self {
            room_size: 0.5,
            damping: 0.6,
            wet_level: 0.2,
            dry_level: 0.9,
            width: 1.0,
        }
    }
}

impl ReverbParams {
    /// Collect every parameter outside 0..=1, prefixing field names with `path`
    pub fn violations(&self, path: &str) -> Vec<ProfileViolation> {
        [
            ("room_size", self.room_size),
            ("damping", self.damping),
            ("wet_level", self.wet_level),
            ("dry_level", self.dry_level),
            ("width", self.width),
        ]
        .iter()
        .filter(|(_, value)| !(0.0..=1.0).contains(value))
        .map(|(name, value)| {
            ProfileViolation::new(
                format!("{}.{}", path, name),
                format!("{} is outside 0 to 1", value),
            )
        })
        .collect()
    }
}

// ============================================================================
// Filter Components
// ============================================================================

/// Low-pass feedback comb filter
#[derive(Debug, Clone)]
struct CombFilter {
    line: Vec<f32>,
    pos: usize,
    filter_state: f32,
}

impl CombFilter {
    fn new(delay: usize) -> Self {
        Self {
            line: vec![0.0; delay.max(1)],
            pos: 0,
            filter_state: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32, damp1: f32, damp2: f32) -> f32 {
        let output = self.line[self.pos];
        // One-pole low-pass in the feedback path
        self.filter_state = output * damp1 + self.filter_state * damp2;
        self.line[self.pos] = input + self.filter_state * feedback;
        self.pos = (self.pos + 1) % self.line.len();
        output
    }

    fn clear(&mut self) {
        self.line.fill(0.0);
        self.pos = 0;
        self.filter_state = 0.0;
    }
}

/// Schroeder allpass filter
#[derive(Debug, Clone)]
struct AllpassFilter {
    line: Vec<f32>,
    pos: usize,
}

impl AllpassFilter {
    fn new(delay: usize) -> Self {
        Self {
            line: vec![0.0; delay.max(1)],
            pos: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let delayed = self.line[self.pos];
        let output = delayed - input;
        self.line[self.pos] = input + delayed * ALLPASS_FEEDBACK;
        self.pos = (self.pos + 1) % self.line.len();
        output
    }

    fn clear(&mut self) {
        self.line.fill(0.0);
        self.pos = 0;
    }
}

/// Comb bank plus diffusers for one ear
#[derive(Debug, Clone)]
struct Tank {
    combs: Vec<CombFilter>,
    allpasses: Vec<AllpassFilter>,
}

impl Tank {
    fn new(sample_rate: u32, spread: usize) -> Self {
        let scale = sample_rate as f64 / REFERENCE_SAMPLE_RATE;
        let scaled = |delay: usize| ((delay + spread) as f64 * scale).round() as usize;
        Self {
            combs: COMB_DELAYS.iter().map(|&d| CombFilter::new(scaled(d))).collect(),
            allpasses: ALLPASS_DELAYS
                .iter()
                .map(|&d| AllpassFilter::new(scaled(d)))
                .collect(),
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32, damp1: f32, damp2: f32) -> f32 {
        let mut out: f32 = self
            .combs
            .iter_mut()
            .map(|comb| comb.process(input, feedback, damp1, damp2))
            .sum();
        for allpass in &mut self.allpasses {
            out = allpass.process(out);
        }
        out
    }

    fn clear(&mut self) {
        self.combs.iter_mut().for_each(CombFilter::clear);
        self.allpasses.iter_mut().for_each(AllpassFilter::clear);
    }
}

// ============================================================================
// Reverb Effect
// ============================================================================

/// Freeverb reverb
///
/// The output keeps the input length; the decaying tail past the end of the
/// layer is dropped.
#[derive(Debug, Clone)]
pub struct Reverb {
    params: ReverbParams,
    sample_rate: u32,
    left: Tank,
    right: Tank,
}

impl Reverb {
    pub fn with_params(params: ReverbParams) -> Self {
        let sample_rate = crate::engine::buffer::DEFAULT_SAMPLE_RATE;
        Self {
            params,
            sample_rate,
            left: Tank::new(sample_rate, 0),
            right: Tank::new(sample_rate, STEREO_SPREAD),
        }
    }

    pub fn params(&self) -> &ReverbParams {
        &self.params
    }
}

impl Default for Reverb {
    fn default() -> Self {
        Self::with_params(ReverbParams::default())
    }
}

impl Effect for Reverb {
    fn process(&mut self, buffer: &mut AudioBuffer) {
        if buffer.sample_rate != self.sample_rate {
            self.prepare(buffer.sample_rate);
        }

        let feedback = self.params.room_size * ROOM_SCALE + ROOM_OFFSET;
        let damp2 = self.params.damping * DAMP_SCALE;
        let damp1 = 1.0 - damp2;
        let dry = self.params.dry_level;
        // Width: wet1 feeds the same ear, wet2 the opposite one
        let wet1 = self.params.wet_level * (1.0 + self.params.width) / 2.0;
        let wet2 = self.params.wet_level * (1.0 - self.params.width) / 2.0;

        let channels = buffer.channels();
        for i in 0..buffer.len() {
            let input_sum: f32 = buffer.samples.iter().map(|ch| ch[i]).sum();
            let input = input_sum / channels as f32 * FIXED_GAIN;

            let out_left = self.left.process(input, feedback, damp1, damp2);
            let out_right = self.right.process(input, feedback, damp1, damp2);

            if channels == 1 {
                let ch = &mut buffer.samples[0];
                ch[i] = ch[i] * dry + (out_left + out_right) * 0.5 * self.params.wet_level;
            } else {
                let l = buffer.samples[0][i];
                let r = buffer.samples[1][i];
                buffer.samples[0][i] = l * dry + out_left * wet1 + out_right * wet2;
                buffer.samples[1][i] = r * dry + out_right * wet1 + out_left * wet2;
            }
        }
    }

    fn prepare(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
        self.left = Tank::new(sample_rate, 0);
        self.right = Tank::new(sample_rate, STEREO_SPREAD);
    }

    fn reset(&mut self) {
        self.left.clear();
        self.right.clear();
    }

    impl_effect_common!(Reverb, "reverb", "Reverb");
}

// ============================================================================
// Tests
// ============================================================================
