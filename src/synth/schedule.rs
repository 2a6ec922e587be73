//! Phase schedules for binaural and noise synthesis
//!
//! A schedule is an ordered list of phases, each with its own carrier, beat
//! and noise bed. Schedules are plain data; they are validated and fitted to
//! the mix duration by the resolver before anything is rendered.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::ProfileViolation;

// ============================================================================
// Constants
// ============================================================================

/// Upper bound of the audible-safe beat range, in Hz
pub const MAX_BEAT_HZ: f64 = 40.0;

/// Default carrier used by the built-in protocols, in Hz
pub const DEFAULT_CARRIER_HZ: f64 = 150.0;

/// Smallest total-duration mismatch the last phase may absorb, in ms
const MIN_FIT_TOLERANCE_MS: u64 = 1000;

// ============================================================================
// Phase types
// ============================================================================

/// Spectral color of a phase's noise bed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseColor {
    /// ≈ 1/f (Voss-McCartney)
    #[default]
    Pink,
    /// Flat spectrum
    White,
    /// ≈ 1/f² (leaky integrated white)
    Brown,
    /// No noise bed
    None,
}

/// Beat frequency of a phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BeatSpec {
    /// Constant beat
    Static { beat_frequency_hz: f64 },
    /// Beat swinging around `center_hz` by ±`range_hz / 2` at `modulation_hz`
    Dynamic {
        center_hz: f64,
        range_hz: f64,
        modulation_hz: f64,
        /// Optional hard limits applied to the swing
        #[serde(default, skip_serializing_if = "Option::is_none")]
        clamp_hz: Option<(f64, f64)>,
    },
}

impl BeatSpec {
    pub fn fixed(beat_frequency_hz: f64) -> Self {
        BeatSpec::Static { beat_frequency_hz }
    }

    /// Beat frequency `t` seconds after the phase start
    ///
    /// `t` may be negative or run past the phase end; the law simply extends.
    pub fn frequency_at(&self, t: f64) -> f64 {
        match *self {
            BeatSpec::Static { beat_frequency_hz } => beat_frequency_hz,
            BeatSpec::Dynamic {
                center_hz,
                range_hz,
                modulation_hz,
                clamp_hz,
            } => {
                let f = center_hz + range_hz / 2.0 * (2.0 * PI * modulation_hz * t).sin();
                match clamp_hz {
                    Some((lo, hi)) => f.clamp(lo, hi),
                    None => f,
                }
            }
        }
    }

    /// Lowest and highest beat this law can produce
    pub fn bounds(&self) -> (f64, f64) {
        match *self {
            BeatSpec::Static { beat_frequency_hz } => (beat_frequency_hz, beat_frequency_hz),
            BeatSpec::Dynamic {
                center_hz,
                range_hz,
                clamp_hz,
                ..
            } => {
                let swing = range_hz.abs() / 2.0;
                let (lo, hi) = (center_hz - swing, center_hz + swing);
                match clamp_hz {
                    Some((clo, chi)) => (lo.clamp(clo, chi), hi.clamp(clo, chi)),
                    None => (lo, hi),
                }
            }
        }
    }
}

/// One time segment of a schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub duration_ms: u64,
    pub carrier_frequency_hz: f64,
    pub beat: BeatSpec,
    #[serde(default)]
    pub noise_color: NoiseColor,
}

impl Phase {
    pub fn new(
        duration_ms: u64,
        carrier_frequency_hz: f64,
        beat: BeatSpec,
        noise_color: NoiseColor,
    ) -> Self {
        Self {
            duration_ms,
            carrier_frequency_hz,
            beat,
            noise_color,
        }
    }

    fn violations(&self, index: usize, sample_rate: u32) -> Vec<ProfileViolation> {
        let field = |name: &str| format!("synth_schedule.phases[{}].{}", index, name);
        let mut violations = Vec::new();

        if self.duration_ms == 0 {
            violations.push(ProfileViolation::new(field("duration_ms"), "must be greater than 0"));
        }

        let (lo, hi) = self.beat.bounds();
        if !lo.is_finite() || !hi.is_finite() || lo < 0.0 || hi > MAX_BEAT_HZ {
            violations.push(ProfileViolation::new(
                field("beat"),
                format!(
                    "beat range {:.3}..{:.3} Hz is outside 0..{} Hz",
                    lo, hi, MAX_BEAT_HZ
                ),
            ));
        }
        if let BeatSpec::Dynamic { modulation_hz, .. } = self.beat {
            if !(modulation_hz >= 0.0 && modulation_hz.is_finite()) {
                violations.push(ProfileViolation::new(field("beat.modulation_hz"), "must be >= 0"));
            }
        }

        let nyquist = sample_rate as f64 / 2.0;
        if !(self.carrier_frequency_hz > 0.0 && self.carrier_frequency_hz + hi.max(0.0) < nyquist) {
            violations.push(ProfileViolation::new(
                field("carrier_frequency_hz"),
                format!(
                    "{} Hz must be above 0 and leave room for the beat below {} Hz",
                    self.carrier_frequency_hz, nyquist
                ),
            ));
        }

        violations
    }
}

// ============================================================================
// Schedule
// ============================================================================

/// Ordered sequence of synthesis phases
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PhaseSchedule {
    pub phases: Vec<Phase>,
}

impl PhaseSchedule {
    pub fn new(phases: Vec<Phase>) -> Self {
        Self { phases }
    }

    /// Single static phase covering `duration_ms`
    pub fn constant(
        duration_ms: u64,
        carrier_hz: f64,
        beat_hz: f64,
        noise_color: NoiseColor,
    ) -> Self {
        Self::new(vec![Phase::new(
            duration_ms,
            carrier_hz,
            BeatSpec::fixed(beat_hz),
            noise_color,
        )])
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.phases.iter().map(|p| p.duration_ms).sum()
    }

    /// Largest total-duration mismatch the last phase may absorb
    pub fn fit_tolerance_ms(target_ms: u64) -> u64 {
        (target_ms / 100).max(MIN_FIT_TOLERANCE_MS)
    }

    /// Check every phase and the fit against `target_ms`
    pub fn violations(&self, target_ms: u64, sample_rate: u32) -> Vec<ProfileViolation> {
        if self.phases.is_empty() {
            return vec![ProfileViolation::new(
                "synth_schedule.phases",
                "must contain at least one phase",
            )];
        }

        let mut violations: Vec<ProfileViolation> = self
            .phases
            .iter()
            .enumerate()
            .flat_map(|(i, phase)| phase.violations(i, sample_rate))
            .collect();

        let total = self.total_duration_ms();
        let tolerance = Self::fit_tolerance_ms(target_ms);
        let last = self.phases[self.phases.len() - 1].duration_ms;
        if total.abs_diff(target_ms) > tolerance {
            violations.push(ProfileViolation::new(
                "synth_schedule",
                format!(
                    "phases last {} ms but the mix lasts {} ms (tolerance {} ms)",
                    total, target_ms, tolerance
                ),
            ));
        } else if total > target_ms && total - target_ms >= last {
            violations.push(ProfileViolation::new(
                "synth_schedule",
                "the last phase is too short to absorb the duration mismatch",
            ));
        }

        violations
    }

    /// Return a copy whose last phase absorbs the difference to `target_ms`
    ///
    /// Call after `violations` came back empty.
    pub fn fitted(&self, target_ms: u64) -> PhaseSchedule {
        let mut fitted = self.clone();
        let total = self.total_duration_ms();
        if let Some(last) = fitted.phases.last_mut() {
            let others = total - last.duration_ms;
            last.duration_ms = target_ms.saturating_sub(others).max(1);
        }
        fitted
    }
}

// ============================================================================
// Protocols
// ============================================================================

/// Built-in multi-phase programmes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// 0.25 Hz onset, dynamic 1-3 Hz consolidation, 3 Hz deep sleep
    OptimizedSleep,
    /// Gentle 2 Hz ± 0.2 Hz swing for the whole mix
    AnxietyReduction,
}

impl Protocol {
    pub fn name(&self) -> &'static str {
        match self {
            Protocol::OptimizedSleep => "optimized_sleep",
            Protocol::AnxietyReduction => "anxiety_reduction",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "optimized_sleep" => Some(Protocol::OptimizedSleep),
            "anxiety_reduction" => Some(Protocol::AnxietyReduction),
            _ => None,
        }
    }

    /// Build the schedule for a mix of `total_ms`
    pub fn schedule(&self, total_ms: u64) -> PhaseSchedule {
        let carrier = DEFAULT_CARRIER_HZ;
        let noise = NoiseColor::Pink;

        match self {
            Protocol::OptimizedSleep => {
                let onset = (15 * 60 * 1000).min(total_ms / 4);
                let consolidation = (30 * 60 * 1000).min(total_ms / 2);
                let deep = total_ms - onset - consolidation;

                let mut phases = vec![
                    Phase::new(onset, carrier, BeatSpec::fixed(0.25), noise),
                    Phase::new(
                        consolidation,
                        carrier,
                        BeatSpec::Dynamic {
                            center_hz: 2.0,
                            range_hz: 2.0,
                            modulation_hz: 0.03,
                            clamp_hz: Some((0.0, 3.0)),
                        },
                        noise,
                    ),
                    Phase::new(deep, carrier, BeatSpec::fixed(3.0), noise),
                ];
                phases.retain(|p| p.duration_ms > 0);
                PhaseSchedule::new(phases)
            }
            Protocol::AnxietyReduction => PhaseSchedule::new(vec![Phase::new(
                total_ms,
                carrier,
                BeatSpec::Dynamic {
                    center_hz: 2.0,
                    range_hz: 0.4,
                    modulation_hz: 0.02,
                    clamp_hz: Some((0.0, 3.0)),
                },
                noise,
            )]),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
