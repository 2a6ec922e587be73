//! Mix Profiles
//!
//! A `MixProfile` is the resolved, validated bundle of parameters governing
//! one mix. Profiles are built by the resolver from a named base profile and
//! a typed set of overrides; nothing in the mixing pipeline reads any other
//! configuration.

pub mod overrides;
pub mod resolver;

use std::collections::BTreeMap;
use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::dsp::{CompressorParams, ReverbParams};
use crate::synth::{PhaseSchedule, Protocol, SynthSettings};

pub use overrides::ProfileOverrides;
pub use resolver::{base_profile, resolve_profile, resolve_unchecked, BASE_PROFILES};

/// Category weight used when the profile names none
pub const DEFAULT_WEIGHT: f32 = 1.0;

// ============================================================================
// Profile Components
// ============================================================================

/// Band limiting applied to every category layer
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterSpec {
    /// No filtering.
    #[default]
    None,

    /// Zero-phase low-pass.
    LowPass { cutoff_hz: f32 },

    /// Zero-phase high-pass at `low_hz` followed by low-pass at `high_hz`.
    BandPass { low_hz: f32, high_hz: f32 },
}

impl FilterSpec {
    pub fn is_none(&self) -> bool {
        matches!(self, FilterSpec::None)
    }
}

/// Gain contour applied over the whole mix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeCurve {
    #[default]
    Steady,
    /// Linear 1.0 → 0.3 over the mix.
    FadeDown,
    /// `0.8 + 0.2·sin(t)`, two full swells.
    GentleWave,
    /// `0.7 + 0.3·sin(t)·sin(0.1t)`, four swells under a slow envelope.
    Dynamic,
}

impl VolumeCurve {
    /// Gain at relative position `x` in `[0, 1]`
    pub fn gain_at(&self, x: f64) -> f32 {
        let x = x.clamp(0.0, 1.0);
        let gain = match self {
            VolumeCurve::Steady => 1.0,
            VolumeCurve::FadeDown => 1.0 - 0.7 * x,
            VolumeCurve::GentleWave => 0.8 + 0.2 * (4.0 * PI * x).sin(),
            VolumeCurve::Dynamic => {
                let t = 8.0 * PI * x;
                0.7 + 0.3 * t.sin() * (0.1 * t).sin()
            }
        };
        gain as f32
    }
}

/// Tonal emphasis of the master bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emphasis {
    /// Low shelf, 200 Hz, +2 dB.
    Low,
    /// Bell, 1 kHz, +1.5 dB, Q 0.7.
    Warm,
    /// High shelf, 3 kHz, +1.5 dB.
    Bright,
}

/// Order in which a category's clips are concatenated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipOrder {
    /// Round-robin in the order given.
    Sequential,
    /// Round-robin over a seeded permutation, reshuffled every round.
    #[default]
    Shuffled,
}

/// Relative balance of the binaural, noise and nature (recorded) layers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MixRatios {
    pub binaural: f32,
    pub noise: f32,
    pub nature: f32,
}

impl Default for MixRatios {
    fn default() -> Self {
        Self {
            binaural: 0.40,
            noise: 0.35,
            nature: 0.25,
        }
    }
}

impl MixRatios {
    pub fn sum(&self) -> f32 {
        self.binaural + self.noise + self.nature
    }

    /// All ratios finite and non-negative, and not all zero
    pub fn is_valid(&self) -> bool {
        [self.binaural, self.noise, self.nature]
            .iter()
            .all(|r| r.is_finite() && *r >= 0.0)
            && self.sum() > 0.0
    }

    /// Scale so the ratios sum to 1
    ///
    /// Ratios already summing to 1 are returned untouched, so normalising is
    /// idempotent bit for bit. Invalid ratios are returned as they are for
    /// validation to report.
    pub fn normalized(&self) -> Self {
        let sum = self.sum();
        if !self.is_valid() || (sum - 1.0).abs() <= 1e-6 {
            return *self;
        }
        Self {
            binaural: self.binaural / sum,
            noise: self.noise / sum,
            nature: self.nature / sum,
        }
    }

    /// Apply personalisation deltas and renormalise
    pub fn personalized(&self, prefs: &Personalization) -> Self {
        let mut ratios = *self;
        if prefs.prefer_nature {
            ratios.nature += 0.15;
            ratios.binaural -= 0.10;
            ratios.noise -= 0.05;
        }
        if prefs.sensitive_to_beats {
            ratios.binaural -= 0.15;
            ratios.noise += 0.10;
            ratios.nature += 0.05;
        }
        if prefs.focus_on_memory {
            ratios.noise += 0.15;
            ratios.binaural -= 0.05;
            ratios.nature -= 0.10;
        }
        // Deltas may push a small ratio below zero
        Self {
            binaural: ratios.binaural.max(0.0),
            noise: ratios.noise.max(0.0),
            nature: ratios.nature.max(0.0),
        }
        .normalized()
    }

    /// Multiplier for recorded category layers relative to the default balance
    pub fn nature_scale(&self) -> f32 {
        self.nature / MixRatios::default().nature
    }

    /// Multiplier for the binaural tones relative to the default balance
    pub fn binaural_scale(&self) -> f32 {
        self.binaural / MixRatios::default().binaural
    }

    /// Multiplier for the noise bed relative to the default balance
    pub fn noise_scale(&self) -> f32 {
        self.noise / MixRatios::default().noise
    }
}

/// Listener preferences folded into `MixRatios` at resolve time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Personalization {
    pub prefer_nature: bool,
    pub sensitive_to_beats: bool,
    pub focus_on_memory: bool,
}

impl Personalization {
    pub fn is_empty(&self) -> bool {
        !(self.prefer_nature || self.sensitive_to_beats || self.focus_on_memory)
    }
}

// ============================================================================
// MixProfile
// ============================================================================

/// Resolved parameters for one mix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixProfile {
    /// Name the profile was resolved from (`sleep`, `focus`, `relax`, or custom).
    pub mix_type: String,

    /// Sample rate of every layer and of the output.
    pub sample_rate: u32,

    /// Master fade-in, applied once to the whole mix.
    pub fade_in_ms: u64,

    /// Master fade-out, applied once to the whole mix.
    pub fade_out_ms: u64,

    /// Crossfade between consecutive clips of a category.
    pub crossfade_ms: u64,

    /// Per-category gain; categories not listed get 0 dB.
    pub volume_adjustment_db: BTreeMap<String, f32>,

    /// Per-category loudness multiplier; categories not listed get 1.0.
    pub category_weights: BTreeMap<String, f32>,

    /// Band limiting applied to every category layer.
    pub filter: FilterSpec,

    /// Gain contour over the whole mix.
    pub volume_curve: VolumeCurve,

    /// Master-bus tonal emphasis.
    pub emphasis: Option<Emphasis>,

    /// Gentle per-category compression.
    pub compression: Option<CompressorParams>,

    /// Per-category reverb.
    pub reverb: Option<ReverbParams>,

    /// Peak-normalise every clip before looping.
    pub normalize_clips: bool,

    /// Master peak normalisation target, in dBFS.
    pub normalize_peak_db: Option<f32>,

    /// Clip sequencing strategy.
    pub clip_order: ClipOrder,

    /// Balance between binaural, noise and recorded layers.
    pub mix_ratios: MixRatios,

    /// Levels and timing of the synthesized layer.
    pub synth: SynthSettings,

    /// Explicit synthesis schedule.
    pub synth_schedule: Option<PhaseSchedule>,

    /// Protocol to build a schedule from when none is given explicitly.
    pub protocol: Option<Protocol>,
}

impl MixProfile {
    /// Gain adjustment for `category`, in dB
    pub fn volume_db(&self, category: &str) -> f32 {
        self.volume_adjustment_db.get(category).copied().unwrap_or(0.0)
    }

    /// Loudness multiplier for `category`
    pub fn weight(&self, category: &str) -> f32 {
        self.category_weights
            .get(category)
            .copied()
            .unwrap_or(DEFAULT_WEIGHT)
    }

    /// The schedule to synthesize for a mix of `target_ms`, if any
    ///
    /// An explicit schedule wins over a protocol.
    pub fn schedule_for(&self, target_ms: u64) -> Option<PhaseSchedule> {
        match (&self.synth_schedule, self.protocol) {
            (Some(schedule), _) => Some(schedule.clone()),
            (None, Some(protocol)) => Some(protocol.schedule(target_ms)),
            (None, None) => None,
        }
    }

    /// Synth settings with levels scaled by the mix ratios
    pub fn effective_synth(&self) -> SynthSettings {
        let to_db = |scale: f32| if scale > 0.0 { 20.0 * scale.log10() } else { -96.0 };
        self.synth.with_level_offsets(
            to_db(self.mix_ratios.binaural_scale()),
            to_db(self.mix_ratios.noise_scale()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_volume_curves() {
        assert_eq!(VolumeCurve::Steady.gain_at(0.5), 1.0);
        assert_relative_eq!(VolumeCurve::FadeDown.gain_at(0.0), 1.0);
        assert_relative_eq!(VolumeCurve::FadeDown.gain_at(1.0), 0.3, epsilon = 1e-6);
        assert_relative_eq!(VolumeCurve::GentleWave.gain_at(0.125), 1.0, epsilon = 1e-6);
        for i in 0..=100 {
            let g = VolumeCurve::Dynamic.gain_at(i as f64 / 100.0);
            assert!((0.4..=1.0).contains(&g));
        }
    }

    #[test]
    fn test_personalized_ratios() {
        let prefs = Personalization {
            prefer_nature: true,
            ..Default::default()
        };
        let ratios = MixRatios::default().personalized(&prefs);
        assert_relative_eq!(ratios.nature, 0.40, epsilon = 1e-6);
        assert_relative_eq!(ratios.binaural, 0.30, epsilon = 1e-6);
        assert_relative_eq!(ratios.noise, 0.30, epsilon = 1e-6);
        assert_relative_eq!(ratios.sum(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_normalized_is_idempotent() {
        let ratios = MixRatios {
            binaural: 2.0,
            noise: 1.0,
            nature: 1.0,
        }
        .normalized();
        assert_eq!(ratios.normalized(), ratios);
        assert_relative_eq!(ratios.binaural, 0.5);
    }

    #[test]
    fn test_negative_ratios_are_not_floored() {
        let ratios = MixRatios {
            binaural: -0.5,
            noise: 0.5,
            nature: 0.5,
        };
        assert!(!ratios.is_valid());
        assert_eq!(ratios.normalized(), ratios);
    }

    #[test]
    fn test_personalized_floors_deltas() {
        let prefs = Personalization {
            prefer_nature: true,
            sensitive_to_beats: true,
            focus_on_memory: true,
        };
        let ratios = MixRatios {
            binaural: 0.1,
            noise: 0.45,
            nature: 0.45,
        }
        .personalized(&prefs);
        assert_eq!(ratios.binaural, 0.0);
        assert!(ratios.is_valid());
        assert_relative_eq!(ratios.sum(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_filter_spec_json() {
        let json = r#"{"kind": "band_pass", "low_hz": 500, "high_hz": 6000}"#;
        let spec: FilterSpec = serde_json::from_str(json).unwrap();
        assert_eq!(
            spec,
            FilterSpec::BandPass {
                low_hz: 500.0,
                high_hz: 6000.0
            }
        );
    }
}
