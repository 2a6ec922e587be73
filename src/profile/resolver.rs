//! Profile & Parameter Resolver
//!
//! Looks up a named base profile, merges typed overrides onto it and
//! validates the result. Every violated constraint is collected so callers
//! can show complete feedback in one go.

use std::collections::BTreeMap;

use super::{
    ClipOrder, Emphasis, FilterSpec, MixProfile, MixRatios, ProfileOverrides, VolumeCurve,
};
use crate::engine::buffer::DEFAULT_SAMPLE_RATE;
use crate::error::{ProfileViolation, Result, SomniaError};
use crate::synth::SynthSettings;

/// Names of the built-in base profiles
pub const BASE_PROFILES: [&str; 3] = ["sleep", "focus", "relax"];

/// Base used for any mix type that is not built in
pub const CUSTOM_PROFILE: &str = "custom";

/// Supported output sample rates
const SAMPLE_RATE_RANGE: std::ops::RangeInclusive<u32> = 8000..=192_000;

/// Categories every base profile carries a gain for
const CATEGORIES: [&str; 6] = ["rain", "thunder", "white_noise", "nature", "water", "other"];

// ============================================================================
// Base Profiles
// ============================================================================

fn volume_table(db: [f32; 6]) -> BTreeMap<String, f32> {
    CATEGORIES
        .iter()
        .zip(db)
        .map(|(category, db)| (category.to_string(), db))
        .collect()
}

/// Canonical profile name for `mix_type`
fn canonical_name(mix_type: &str) -> &str {
    match mix_type {
        "relaxation" => "relax",
        other => other,
    }
}

/// The unmodified base profile for `mix_type`
///
/// `relaxation` is an alias of `relax`. Any other unknown name gets a neutral
/// base (short fades, no filter, 0 dB everywhere) that keeps the name.
pub fn base_profile(mix_type: &str) -> MixProfile {
    let name = canonical_name(mix_type);

    let neutral = MixProfile {
        mix_type: name.to_string(),
        sample_rate: DEFAULT_SAMPLE_RATE,
        fade_in_ms: 2000,
        fade_out_ms: 2000,
        crossfade_ms: 2000,
        volume_adjustment_db: volume_table([0.0; 6]),
        category_weights: BTreeMap::new(),
        filter: FilterSpec::None,
        volume_curve: VolumeCurve::Steady,
        emphasis: None,
        compression: None,
        reverb: None,
        normalize_clips: true,
        normalize_peak_db: Some(-1.0),
        clip_order: ClipOrder::Shuffled,
        mix_ratios: MixRatios::default(),
        synth: SynthSettings::default(),
        synth_schedule: None,
        protocol: None,
    };

    match name {
        "sleep" => MixProfile {
            fade_in_ms: 10_000,
            fade_out_ms: 10_000,
            crossfade_ms: 5000,
            volume_adjustment_db: volume_table([0.0, -6.0, -3.0, -2.0, 0.0, -4.0]),
            filter: FilterSpec::LowPass { cutoff_hz: 4000.0 },
            volume_curve: VolumeCurve::FadeDown,
            emphasis: Some(Emphasis::Low),
            ..neutral
        },
        "focus" => MixProfile {
            fade_in_ms: 5000,
            fade_out_ms: 5000,
            crossfade_ms: 3000,
            volume_adjustment_db: volume_table([-3.0, -10.0, 0.0, -4.0, -2.0, -5.0]),
            filter: FilterSpec::BandPass {
                low_hz: 500.0,
                high_hz: 6000.0,
            },
            ..neutral
        },
        "relax" => MixProfile {
            fade_in_ms: 8000,
            fade_out_ms: 8000,
            crossfade_ms: 4000,
            volume_adjustment_db: volume_table([-2.0, -8.0, -5.0, 0.0, 0.0, -3.0]),
            filter: FilterSpec::LowPass { cutoff_hz: 8000.0 },
            volume_curve: VolumeCurve::GentleWave,
            emphasis: Some(Emphasis::Warm),
            ..neutral
        },
        _ => neutral,
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Resolve `mix_type` with `overrides` into a validated profile
///
/// Scalar overrides replace the base value; `volume_adjustment_db` and
/// `category_weights` are merged key by key. Personalisation flags are
/// folded into `mix_ratios` and are not kept, so resolving a resolved
/// profile's `as_overrides()` again is a no-op.
///
/// # Arguments
/// * `mix_type` - `sleep`, `focus`, `relax` (alias `relaxation`) or any custom name
/// * `overrides` - Typed overrides; an empty set yields the base profile
///
/// # Errors
/// * `InvalidProfile` - Listing every violated constraint
pub fn resolve_profile(mix_type: &str, overrides: &ProfileOverrides) -> Result<MixProfile> {
    let (profile, violations) = resolve_unchecked(mix_type, overrides);

    if !violations.is_empty() {
        log::warn!(
            "Profile '{}' rejected with {} violation(s)",
            profile.mix_type,
            violations.len()
        );
        return Err(SomniaError::InvalidProfile {
            mix_type: profile.mix_type,
            violations,
        });
    }

    log::debug!("Resolved profile '{}'", profile.mix_type);
    Ok(profile)
}

/// Merge `overrides` into the base profile without failing
///
/// Returns the merged profile together with every duration-independent
/// violation, so callers with further checks can report everything at once.
pub fn resolve_unchecked(
    mix_type: &str,
    overrides: &ProfileOverrides,
) -> (MixProfile, Vec<ProfileViolation>) {
    let mut profile = base_profile(mix_type);
    let mut violations = Vec::new();

    merge(&mut profile, overrides, &mut violations);
    violations.extend(profile.violations());
    (profile, violations)
}

/// Convert a signed duration override, recording negative values
fn duration(field: &str, value: i64, violations: &mut Vec<ProfileViolation>) -> u64 {
    u64::try_from(value).unwrap_or_else(|_| {
        violations.push(ProfileViolation::new(
            field,
            format!("{} ms is negative", value),
        ));
        0
    })
}

fn merge(
    profile: &mut MixProfile,
    overrides: &ProfileOverrides,
    violations: &mut Vec<ProfileViolation>,
) {
    if let Some(rate) = overrides.sample_rate {
        profile.sample_rate = rate;
    }
    if let Some(ms) = overrides.fade_in_ms {
        profile.fade_in_ms = duration("fade_in_ms", ms, violations);
    }
    if let Some(ms) = overrides.fade_out_ms {
        profile.fade_out_ms = duration("fade_out_ms", ms, violations);
    }
    if let Some(ms) = overrides.crossfade_ms {
        profile.crossfade_ms = duration("crossfade_ms", ms, violations);
    }

    if let Some(table) = &overrides.volume_adjustment_db {
        profile
            .volume_adjustment_db
            .extend(table.iter().map(|(k, v)| (k.clone(), *v)));
    }
    if let Some(table) = &overrides.category_weights {
        profile
            .category_weights
            .extend(table.iter().map(|(k, v)| (k.clone(), *v)));
    }

    if let Some(filter) = overrides.filter {
        profile.filter = filter.unwrap_or_default();
    }
    if let Some(curve) = overrides.volume_curve {
        profile.volume_curve = curve;
    }
    if let Some(emphasis) = overrides.emphasis {
        profile.emphasis = emphasis;
    }
    if let Some(compression) = &overrides.compression {
        profile.compression = compression.clone();
    }
    if let Some(reverb) = &overrides.reverb {
        profile.reverb = reverb.clone();
    }
    if let Some(normalize) = overrides.normalize_clips {
        profile.normalize_clips = normalize;
    }
    if let Some(peak) = overrides.normalize_peak_db {
        profile.normalize_peak_db = peak;
    }
    if let Some(order) = overrides.clip_order {
        profile.clip_order = order;
    }

    if let Some(ratios) = overrides.mix_ratios {
        profile.mix_ratios = ratios.normalized();
    }
    if let Some(prefs) = &overrides.personalization {
        // Invalid ratios are left for validation to report
        if !prefs.is_empty() && profile.mix_ratios.is_valid() {
            profile.mix_ratios = profile.mix_ratios.personalized(prefs);
        }
    }

    if let Some(synth) = &overrides.synth {
        profile.synth = synth.clone();
    }
    if let Some(schedule) = &overrides.synth_schedule {
        profile.synth_schedule = schedule.clone();
    }
    if let Some(protocol) = overrides.protocol {
        profile.protocol = protocol;
    }
}

// ============================================================================
// Validation
// ============================================================================

impl MixProfile {
    /// Every violated duration-independent constraint
    pub fn violations(&self) -> Vec<ProfileViolation> {
        let mut violations = Vec::new();

        if !SAMPLE_RATE_RANGE.contains(&self.sample_rate) {
            violations.push(ProfileViolation::new(
                "sample_rate",
                format!(
                    "{} Hz is outside {} to {} Hz",
                    self.sample_rate,
                    SAMPLE_RATE_RANGE.start(),
                    SAMPLE_RATE_RANGE.end()
                ),
            ));
        }
        let nyquist = self.sample_rate as f32 / 2.0;

        for (category, db) in &self.volume_adjustment_db {
            if !(-96.0..=24.0).contains(db) {
                violations.push(ProfileViolation::new(
                    format!("volume_adjustment_db.{}", category),
                    format!("{} dB is outside -96 to 24 dB", db),
                ));
            }
        }
        for (category, weight) in &self.category_weights {
            if !(weight.is_finite() && *weight >= 0.0) {
                violations.push(ProfileViolation::new(
                    format!("category_weights.{}", category),
                    format!("{} must be a finite value >= 0", weight),
                ));
            }
        }

        match self.filter {
            FilterSpec::None => {}
            FilterSpec::LowPass { cutoff_hz } => {
                if !(cutoff_hz > 0.0 && cutoff_hz < nyquist) {
                    violations.push(ProfileViolation::new(
                        "filter.cutoff_hz",
                        format!("{} Hz must lie between 0 and {} Hz", cutoff_hz, nyquist),
                    ));
                }
            }
            FilterSpec::BandPass { low_hz, high_hz } => {
                if !(low_hz > 0.0 && low_hz < high_hz && high_hz < nyquist) {
                    violations.push(ProfileViolation::new(
                        "filter",
                        format!(
                            "band {}..{} Hz must satisfy 0 < low < high < {} Hz",
                            low_hz, high_hz, nyquist
                        ),
                    ));
                }
            }
        }

        if let Some(params) = &self.compression {
            violations.extend(params.violations("compression"));
        }
        if let Some(params) = &self.reverb {
            violations.extend(params.violations("reverb"));
        }
        if let Some(peak) = self.normalize_peak_db {
            if !(-60.0..=0.0).contains(&peak) {
                violations.push(ProfileViolation::new(
                    "normalize_peak_db",
                    format!("{} dBFS is outside -60 to 0 dBFS", peak),
                ));
            }
        }

        if !self.mix_ratios.is_valid() {
            violations.push(ProfileViolation::new(
                "mix_ratios",
                "ratios must be finite, non-negative and not all zero",
            ));
        }

        violations.extend(self.synth.violations());

        // Duration fit is checked once the target is known
        if let Some(schedule) = &self.synth_schedule {
            violations.extend(schedule.violations(schedule.total_duration_ms(), self.sample_rate));
        }

        violations
    }

    /// Violations of the target-dependent constraints, schedule excluded
    pub fn duration_violations(&self, target_duration_ms: u64) -> Vec<ProfileViolation> {
        let mut violations = Vec::new();

        if target_duration_ms == 0 {
            violations.push(ProfileViolation::new(
                "target_duration_ms",
                "must be greater than 0",
            ));
        } else if self.crossfade_ms >= target_duration_ms {
            violations.push(ProfileViolation::new(
                "crossfade_ms",
                format!(
                    "{} ms must be shorter than the {} ms mix",
                    self.crossfade_ms, target_duration_ms
                ),
            ));
        }
        violations
    }

    /// Check the constraints that depend on the mix duration
    ///
    /// # Errors
    /// * `InvalidProfile` - If the target is zero, the crossfade does not fit
    ///   in it, or the profile's own schedule cannot be fitted to it
    pub fn validate_for_duration(&self, target_duration_ms: u64) -> Result<()> {
        let mut violations = self.duration_violations(target_duration_ms);

        if let Some(schedule) = &self.synth_schedule {
            violations.extend(schedule.violations(target_duration_ms, self.sample_rate));
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(SomniaError::InvalidProfile {
                mix_type: self.mix_type.clone(),
                violations,
            })
        }
    }

    /// Overrides that reproduce this profile exactly when resolved against
    /// its own mix type
    pub fn as_overrides(&self) -> ProfileOverrides {
        ProfileOverrides {
            sample_rate: Some(self.sample_rate),
            fade_in_ms: Some(self.fade_in_ms as i64),
            fade_out_ms: Some(self.fade_out_ms as i64),
            crossfade_ms: Some(self.crossfade_ms as i64),
            volume_adjustment_db: Some(self.volume_adjustment_db.clone()),
            category_weights: Some(self.category_weights.clone()),
            filter: Some(Some(self.filter)),
            volume_curve: Some(self.volume_curve),
            emphasis: Some(self.emphasis),
            compression: Some(self.compression.clone()),
            reverb: Some(self.reverb.clone()),
            normalize_clips: Some(self.normalize_clips),
            normalize_peak_db: Some(self.normalize_peak_db),
            clip_order: Some(self.clip_order),
            mix_ratios: Some(self.mix_ratios),
            personalization: None,
            synth: Some(self.synth.clone()),
            synth_schedule: Some(self.synth_schedule.clone()),
            protocol: Some(self.protocol),
        }
    }
}
