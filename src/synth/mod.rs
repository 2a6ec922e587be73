//! Binaural & Colored-Noise Synthesizer
//!
//! Renders a `PhaseSchedule` into a stereo layer:
//! - binaural pair with continuous phase and gliding phase transitions
//! - per-phase colored noise bed, adjacent beds joined by equal-power
//!   crossfades
//! - slow sin² onset/offset envelope over the whole layer

pub mod binaural;
pub mod noise;
pub mod schedule;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::dsp::envelope::{apply_sine_envelope, crossfade_append};
use crate::engine::buffer::{db_to_linear, ms_to_samples, AudioBuffer};
use crate::engine::CancellationToken;
use crate::error::{ProfileViolation, Result, SomniaError};

pub use binaural::{phase_spans, FrequencyPlan, PhaseSpan};
pub use schedule::{BeatSpec, NoiseColor, Phase, PhaseSchedule, Protocol, MAX_BEAT_HZ};

/// Level and timing of the synthesized layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SynthSettings {
    /// Peak level of each binaural tone, in dBFS
    pub binaural_level_db: f32,
    /// Gain applied to the noise bed on top of its fixed RMS, in dB
    pub noise_level_db: f32,
    /// Length of each phase transition, in ms
    pub transition_ms: u64,
    /// Length of the onset and offset envelope, in ms
    pub envelope_ms: u64,
    /// Slow amplitude swing of the noise bed
    pub noise_modulation: bool,
}

impl Default for SynthSettings {
    fn default() -> Self {
        Self {
            binaural_level_db: -12.0,
            noise_level_db: 0.0,
            transition_ms: 3000,
            envelope_ms: 5000,
            noise_modulation: true,
        }
    }
}

impl SynthSettings {
    /// Collect every invalid setting
    pub fn violations(&self) -> Vec<ProfileViolation> {
        let mut violations = Vec::new();
        for (name, value) in [
            ("binaural_level_db", self.binaural_level_db),
            ("noise_level_db", self.noise_level_db),
        ] {
            if !(-96.0..=0.0).contains(&value) {
                violations.push(ProfileViolation::new(
                    format!("synth.{}", name),
                    format!("{} dB is outside -96 to 0 dB", value),
                ));
            }
        }
        violations
    }

    /// Copy with both levels offset by the given dB amounts
    pub fn with_level_offsets(&self, binaural_db: f32, noise_db: f32) -> Self {
        Self {
            binaural_level_db: self.binaural_level_db + binaural_db,
            noise_level_db: self.noise_level_db + noise_db,
            ..self.clone()
        }
    }
}

/// Synthesize `schedule` with default settings and a fixed seed
///
/// The layer lasts exactly the schedule's total duration.
pub fn synthesize(schedule: &PhaseSchedule, sample_rate: u32) -> Result<AudioBuffer> {
    synthesize_with(
        schedule,
        &SynthSettings::default(),
        sample_rate,
        0,
        &CancellationToken::new(),
    )
}

/// Synthesize `schedule` into a stereo layer
///
/// `seed` drives every noise generator; the same inputs always render the
/// same samples.
///
/// # Errors
/// * `EmptyBuffer` - If the schedule renders to zero samples
/// * `Cancelled` - If `cancel` fires between phases
pub fn synthesize_with(
    schedule: &PhaseSchedule,
    settings: &SynthSettings,
    sample_rate: u32,
    seed: u64,
    cancel: &CancellationToken,
) -> Result<AudioBuffer> {
    let transition = ms_to_samples(settings.transition_ms, sample_rate);
    let plan = FrequencyPlan::new(schedule, sample_rate, transition);
    if plan.is_empty() {
        return Err(SomniaError::empty_buffer("synthesis of an empty schedule"));
    }

    log::info!(
        "Synthesizing {} phase(s), {:.1}s at {} Hz",
        schedule.phases.len(),
        plan.len() as f64 / sample_rate as f64,
        sample_rate
    );

    let mut layer = binaural::render(&plan, db_to_linear(settings.binaural_level_db), cancel)?;

    if schedule.phases.iter().any(|p| p.noise_color != NoiseColor::None) {
        let bed = render_noise_bed(schedule, plan.spans(), settings, sample_rate, seed, cancel)?;
        layer.mix_in(&bed, db_to_linear(settings.noise_level_db));
    }

    let envelope = ms_to_samples(settings.envelope_ms, sample_rate);
    apply_sine_envelope(&mut layer, envelope, envelope)?;

    if !layer.is_finite() {
        return Err(SomniaError::filter_instability("binaural/noise synthesis"));
    }
    Ok(layer)
}

/// Noise beds for every phase, joined with equal-power crossfades
///
/// Every phase but the last renders `overlap` extra samples, which the
/// crossfade into the next phase consumes, so the bed keeps the exact total
/// length.
fn render_noise_bed(
    schedule: &PhaseSchedule,
    spans: &[PhaseSpan],
    settings: &SynthSettings,
    sample_rate: u32,
    seed: u64,
    cancel: &CancellationToken,
) -> Result<AudioBuffer> {
    let mut rng = StdRng::seed_from_u64(seed);
    let transition = ms_to_samples(settings.transition_ms, sample_rate);
    let mut bed: Option<AudioBuffer> = None;
    // Extra samples the bed carries past the last rendered phase
    let mut pending = 0;

    for (k, (phase, span)) in schedule.phases.iter().zip(spans).enumerate() {
        cancel.check(&format!("noise synthesis of phase {}", k))?;
        if span.len == 0 {
            continue;
        }

        let overlap = spans
            .get(k + 1)
            .map_or(0, |next| transition.min(next.len));
        let mut samples = noise::generate(phase.noise_color, span.len + overlap, &mut rng);
        if settings.noise_modulation {
            noise::apply_modulation(&mut samples, span.start, sample_rate);
        }
        log::debug!("Phase {}: {:?} noise, {} samples", k, phase.noise_color, samples.len());

        let piece = AudioBuffer::from_channels(vec![samples.clone(), samples], sample_rate)?;
        match bed.as_mut() {
            None => bed = Some(piece),
            Some(acc) => {
                crossfade_append(acc, &piece, pending)?;
            }
        }
        pending = overlap;
    }

    bed.ok_or_else(|| SomniaError::empty_buffer("noise bed"))
}
