//! Mix creation entry points
//!
//! `create_mix` runs the whole pipeline for one call:
//! resolve → (loop + effects per category ‖ synthesis) → compose.
//! Category layers and the synthesized layer are built on the rayon pool
//! and joined before composition. Nothing outlives the call except the
//! returned `MixResult`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use super::composer::{compose_with_stats, MasterStats};
use super::effects::apply_profile_effects;
use super::looper::{
    build_category_layer_with, derive_seed, CategoryLayer, LoopSettings, LoopStrategy,
};
use crate::engine::buffer::{
    calculate_peak, calculate_rms, ms_to_samples, samples_to_ms, AudioBuffer,
};
use crate::engine::io::{export_wav, ExportFormat};
use crate::engine::{CancellationToken, CategoryClips};
use crate::error::{Result, SomniaError};
use crate::profile::{resolve_profile, resolve_unchecked, MixProfile, ProfileOverrides};
use crate::synth::{synthesize_with, PhaseSchedule};

/// Default length of a preview render
pub const DEFAULT_PREVIEW_MS: u64 = 30_000;

/// Fraction of a preview that fades and crossfades may take at most
const PREVIEW_FADE_FRACTION: u64 = 10;

// ============================================================================
// Request
// ============================================================================

/// Everything one mix-creation call needs
#[derive(Debug, Clone)]
pub struct MixRequest<'a> {
    /// Category label → decoded clips. Borrowed for the duration of the call.
    pub category_clips: &'a CategoryClips,
    /// `sleep`, `focus`, `relax` or a custom name.
    pub mix_type: String,
    pub target_duration_ms: u64,
    pub overrides: ProfileOverrides,
    /// Takes precedence over any schedule or protocol in the profile.
    pub synth_schedule: Option<PhaseSchedule>,
}

impl<'a> MixRequest<'a> {
    pub fn new(
        category_clips: &'a CategoryClips,
        mix_type: impl Into<String>,
        target_duration_ms: u64,
    ) -> Self {
        Self {
            category_clips,
            mix_type: mix_type.into(),
            target_duration_ms,
            overrides: ProfileOverrides::default(),
            synth_schedule: None,
        }
    }

    pub fn with_overrides(mut self, overrides: ProfileOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_synth_schedule(mut self, schedule: PhaseSchedule) -> Self {
        self.synth_schedule = Some(schedule);
        self
    }
}

// ============================================================================
// Result
// ============================================================================

/// Per-category summary of a finished mix
#[derive(Debug, Clone, Serialize)]
pub struct LayerSummary {
    pub category: String,
    pub clip_count: usize,
    pub strategy: LoopStrategy,
    pub placements: usize,
    pub weight: f32,
    pub peak_db: f32,
    pub rms_db: f32,
}

/// Output of one mix-creation call
#[derive(Debug, Clone)]
pub struct MixResult {
    /// Final stereo mix.
    pub buffer: AudioBuffer,
    /// The resolved profile actually used.
    pub profile: MixProfile,
    pub target_duration_ms: u64,
    /// Achieved duration, in milliseconds.
    pub actual_duration_ms: f64,
    pub layers: Vec<LayerSummary>,
    /// The fitted schedule that was synthesized, if any.
    pub synth_schedule: Option<PhaseSchedule>,
    pub master: MasterStats,
}

/// Serialisable account of a mix, written next to exported audio
#[derive(Debug, Clone, Serialize)]
pub struct MixReport {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub mix_type: String,
    pub target_duration_ms: u64,
    pub actual_duration_ms: f64,
    pub sample_rate: u32,
    pub channels: usize,
    pub peak_db: f32,
    pub rms_db: f32,
    pub layers: Vec<LayerSummary>,
    pub synth_phases: usize,
    pub master: MasterStats,
    pub profile: MixProfile,
}

impl MixResult {
    /// Build a report with a fresh id and timestamp
    pub fn report(&self) -> MixReport {
        MixReport {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            mix_type: self.profile.mix_type.clone(),
            target_duration_ms: self.target_duration_ms,
            actual_duration_ms: self.actual_duration_ms,
            sample_rate: self.buffer.sample_rate,
            channels: self.buffer.channels(),
            peak_db: calculate_peak(&self.buffer),
            rms_db: calculate_rms(&self.buffer),
            layers: self.layers.clone(),
            synth_phases: self.synth_schedule.as_ref().map_or(0, |s| s.phases.len()),
            master: self.master,
            profile: self.profile.clone(),
        }
    }

    /// Write the mix as WAV plus a `.json` report beside it
    ///
    /// # Returns
    /// Path of the report file
    pub fn export(&self, path: &Path, format: ExportFormat) -> Result<PathBuf> {
        export_wav(&self.buffer, path, format)?;

        let report_path = path.with_extension("json");
        let json = serde_json::to_string_pretty(&self.report())?;
        fs::write(&report_path, json)?;
        log::info!("Wrote mix report to {}", report_path.display());
        Ok(report_path)
    }
}

// ============================================================================
// Entry points
// ============================================================================

/// Create a mix
///
/// # Arguments
/// * `category_clips` - Category label → decoded clips; empty lists contribute silence
/// * `mix_type` - Base profile name (`sleep`, `focus`, `relax`) or a custom name
/// * `target_duration_ms` - Exact output duration
/// * `overrides` - Profile overrides
/// * `synth_schedule` - Optional binaural/noise schedule
///
/// # Errors
/// * `InvalidProfile` - Before any audio work, listing every violation
/// * `EmptyMix` - If no category has audio and nothing is synthesized
/// * `EmptyBuffer` - If a clip has no samples
/// * `FilterInstability` - If any stage produces NaN/Inf
pub fn create_mix(
    category_clips: &CategoryClips,
    mix_type: &str,
    target_duration_ms: u64,
    overrides: &ProfileOverrides,
    synth_schedule: Option<&PhaseSchedule>,
) -> Result<MixResult> {
    let request = MixRequest {
        category_clips,
        mix_type: mix_type.to_string(),
        target_duration_ms,
        overrides: overrides.clone(),
        synth_schedule: synth_schedule.cloned(),
    };
    create_mix_with(&request, &CancellationToken::new())
}

/// Create a mix, checking `cancel` between major steps
///
/// # Errors
/// As `create_mix`, plus `Cancelled` naming the stage that observed the
/// cancellation. Partial buffers are dropped.
pub fn create_mix_with(request: &MixRequest<'_>, cancel: &CancellationToken) -> Result<MixResult> {
    let target_ms = request.target_duration_ms;
    let (profile, mut violations) = resolve_unchecked(&request.mix_type, &request.overrides);
    violations.extend(profile.duration_violations(target_ms));

    // Only the schedule that will be synthesized has to fit the target
    let schedule = request
        .synth_schedule
        .clone()
        .or_else(|| profile.schedule_for(target_ms));
    if let Some(schedule) = &schedule {
        for violation in schedule.violations(target_ms, profile.sample_rate) {
            // A profile schedule's phase errors are already listed
            if !violations.contains(&violation) {
                violations.push(violation);
            }
        }
    }

    if !violations.is_empty() {
        log::warn!(
            "Mix '{}' rejected with {} violation(s)",
            profile.mix_type,
            violations.len()
        );
        return Err(SomniaError::InvalidProfile {
            mix_type: profile.mix_type,
            violations,
        });
    }
    let schedule = schedule.map(|s| s.fitted(target_ms));

    let has_audio = request.category_clips.values().any(|clips| !clips.is_empty());
    if !has_audio && schedule.is_none() {
        return Err(SomniaError::EmptyMix {
            categories: request.category_clips.keys().cloned().collect(),
        });
    }

    log::info!(
        "Creating '{}' mix: {:.1}s, {} categor(ies), synth: {}",
        profile.mix_type,
        target_ms as f64 / 1000.0,
        request.category_clips.len(),
        schedule.is_some()
    );

    let (layers, synth) = rayon::join(
        || build_layers(request.category_clips, &profile, target_ms, cancel),
        || {
            schedule
                .as_ref()
                .map(|s| {
                    synthesize_with(
                        s,
                        &profile.effective_synth(),
                        profile.sample_rate,
                        derive_seed("synth", target_ms),
                        cancel,
                    )
                })
                .transpose()
        },
    );
    let layers = layers?;
    let synth = synth?;

    cancel.check("composition")?;

    let buffers: BTreeMap<String, AudioBuffer> = layers
        .iter()
        .map(|layer| (layer.category.clone(), layer.buffer.clone()))
        .collect();
    let (buffer, master) = compose_with_stats(&buffers, synth.as_ref(), &profile, target_ms)?;

    let summaries = layers
        .iter()
        .map(|layer| LayerSummary {
            category: layer.category.clone(),
            clip_count: request.category_clips.get(&layer.category).map_or(0, Vec::len),
            strategy: layer.strategy,
            placements: layer.placements,
            weight: profile.weight(&layer.category),
            peak_db: calculate_peak(&layer.buffer),
            rms_db: calculate_rms(&layer.buffer),
        })
        .collect();

    let actual_duration_ms = samples_to_ms(buffer.len(), buffer.sample_rate);
    log::info!("Mix complete: {:.3}s", actual_duration_ms / 1000.0);

    Ok(MixResult {
        buffer,
        profile,
        target_duration_ms: target_ms,
        actual_duration_ms,
        layers: summaries,
        synth_schedule: schedule,
        master,
    })
}

/// Loop and process every category in parallel
fn build_layers(
    category_clips: &CategoryClips,
    profile: &MixProfile,
    target_ms: u64,
    cancel: &CancellationToken,
) -> Result<Vec<CategoryLayer>> {
    let settings = LoopSettings {
        target_duration_ms: target_ms,
        crossfade_ms: profile.crossfade_ms,
        sample_rate: profile.sample_rate,
        order: profile.clip_order,
        normalize_clips: profile.normalize_clips,
    };

    category_clips
        .par_iter()
        .map(|(category, clips)| {
            let mut layer = build_category_layer_with(category, clips, &settings, cancel)?;
            cancel.check(&format!("effects of category '{}'", category))?;
            layer.buffer = apply_profile_effects(layer.buffer, profile, category)?;
            Ok(layer)
        })
        .collect()
}

/// Render a short preview of a mix
///
/// The preview lasts `preview_duration_ms`; fades and the crossfade are
/// capped at a tenth of it, and an explicit schedule is scaled
/// proportionally.
pub fn create_preview(request: &MixRequest<'_>, preview_duration_ms: u64) -> Result<MixResult> {
    let profile = resolve_profile(&request.mix_type, &request.overrides)?;
    let cap = preview_duration_ms / PREVIEW_FADE_FRACTION;

    let overrides = ProfileOverrides {
        fade_in_ms: Some(profile.fade_in_ms.min(cap) as i64),
        fade_out_ms: Some(profile.fade_out_ms.min(cap) as i64),
        crossfade_ms: Some(profile.crossfade_ms.min(cap) as i64),
        synth_schedule: profile
            .synth_schedule
            .as_ref()
            .map(|s| Some(scale_schedule(s, preview_duration_ms))),
        ..request.overrides.clone()
    };

    let preview = MixRequest {
        category_clips: request.category_clips,
        mix_type: request.mix_type.clone(),
        target_duration_ms: preview_duration_ms,
        overrides,
        synth_schedule: request
            .synth_schedule
            .as_ref()
            .map(|s| scale_schedule(s, preview_duration_ms)),
    };

    log::info!("Rendering {:.0}s preview", preview_duration_ms as f64 / 1000.0);
    create_mix_with(&preview, &CancellationToken::new())
}

/// Stretch or squeeze every phase so the schedule lasts `total_ms`
fn scale_schedule(schedule: &PhaseSchedule, total_ms: u64) -> PhaseSchedule {
    let current = schedule.total_duration_ms().max(1);
    let mut scaled = schedule.clone();
    for phase in &mut scaled.phases {
        let scaled_ms = (phase.duration_ms as u128 * total_ms as u128) / current as u128;
        phase.duration_ms = scaled_ms.max(1) as u64;
    }
    scaled.fitted(total_ms)
}

/// Number of samples a mix of `target_ms` has at the profile's rate
pub fn expected_len(profile: &MixProfile, target_ms: u64) -> usize {
    ms_to_samples(target_ms, profile.sample_rate)
}
