//! Multi-Layer Mixer / Timeline Composer
//!
//! A straight pipeline over already-built layers:
//! 1. weighted sum of category layers plus the synthesized layer
//! 2. volume curve
//! 3. master fades, applied exactly once
//! 4. emphasis EQ
//! 5. soft limiting when the peak exceeds the threshold
//! 6. optional peak normalisation

use std::collections::BTreeMap;

use serde::Serialize;

use crate::dsp::envelope::apply_linear_fade;
use crate::dsp::{Effect, EffectChain, Limiter, DEFAULT_THRESHOLD};
use crate::engine::buffer::{db_to_linear, linear_to_db, ms_to_samples, AudioBuffer, ChannelLayout};
use crate::error::{Result, SomniaError};
use crate::profile::{MixProfile, VolumeCurve};

use super::effects::emphasis_band;

/// What the master stage did to the summed layers
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct MasterStats {
    /// Peak of the summed mix before limiting, in dBFS
    pub pre_limit_peak_db: f32,
    /// Deepest limiter gain reduction, if the limiter engaged (dB, <= 0)
    pub limiter_reduction_db: Option<f32>,
    /// Gain applied by peak normalisation, if enabled
    pub normalization_gain_db: Option<f32>,
}

/// Compose category layers and an optional synthesized layer into the final mix
///
/// Layers shorter than the target are zero-padded and longer ones are cut,
/// so the result always lasts exactly `target_duration_ms`.
///
/// # Errors
/// * `EmptyMix` - If every category layer is silent and there is no synth layer
/// * `FilterInstability` - If a master stage produces NaN/Inf
pub fn compose(
    category_layers: &BTreeMap<String, AudioBuffer>,
    synth_layer: Option<&AudioBuffer>,
    profile: &MixProfile,
    target_duration_ms: u64,
) -> Result<AudioBuffer> {
    compose_with_stats(category_layers, synth_layer, profile, target_duration_ms)
        .map(|(mix, _)| mix)
}

/// `compose`, also reporting what the master stage did
pub fn compose_with_stats(
    category_layers: &BTreeMap<String, AudioBuffer>,
    synth_layer: Option<&AudioBuffer>,
    profile: &MixProfile,
    target_duration_ms: u64,
) -> Result<(AudioBuffer, MasterStats)> {
    let audible = category_layers.values().any(|layer| !layer.is_silent());
    if !audible && synth_layer.is_none() {
        return Err(SomniaError::EmptyMix {
            categories: category_layers.keys().cloned().collect(),
        });
    }

    let sample_rate = profile.sample_rate;
    let target = ms_to_samples(target_duration_ms, sample_rate);
    let mut mix = AudioBuffer::new(target, ChannelLayout::Stereo, sample_rate);

    // Weights are independent multipliers; only the final sum is controlled
    let nature_scale = profile.mix_ratios.nature_scale();
    for (category, layer) in category_layers {
        if layer.is_silent() {
            continue;
        }
        let weight = profile.weight(category) * nature_scale;
        log::debug!("Mixing '{}' at weight {:.3}", category, weight);
        mix.mix_in(layer, weight);
    }
    if let Some(synth) = synth_layer {
        mix.mix_in(synth, 1.0);
    }

    apply_volume_curve(&mut mix, profile.volume_curve);

    let fade_in = ms_to_samples(profile.fade_in_ms, sample_rate);
    let fade_out = ms_to_samples(profile.fade_out_ms, sample_rate);
    apply_linear_fade(&mut mix, fade_in, fade_out)?;

    let stats = master(&mut mix, profile)?;
    Ok((mix, stats))
}

/// Multiply the mix by `curve`, evaluated per frame
fn apply_volume_curve(mix: &mut AudioBuffer, curve: VolumeCurve) {
    if curve == VolumeCurve::Steady || mix.len() < 2 {
        return;
    }
    let last = (mix.len() - 1) as f64;
    let gains: Vec<f32> = (0..mix.len()).map(|i| curve.gain_at(i as f64 / last)).collect();
    for channel in &mut mix.samples {
        for (sample, gain) in channel.iter_mut().zip(&gains) {
            *sample *= gain;
        }
    }
}

/// Emphasis, limiting and normalisation
fn master(mix: &mut AudioBuffer, profile: &MixProfile) -> Result<MasterStats> {
    let mut stats = MasterStats::default();

    if let Some(emphasis) = profile.emphasis {
        let mut chain = EffectChain::new().with(Box::new(emphasis_band(emphasis)));
        chain.prepare(profile.sample_rate);
        chain.process(mix, "master emphasis")?;
    }

    let peak = mix.peak();
    stats.pre_limit_peak_db = linear_to_db(peak).max(-96.0);
    if peak > DEFAULT_THRESHOLD {
        let mut limiter = Limiter::new(DEFAULT_THRESHOLD);
        limiter.prepare(profile.sample_rate);
        limiter.process(mix);
        if !mix.is_finite() {
            return Err(SomniaError::filter_instability("master limiter"));
        }
        let reduction = limiter.last_reduction_db();
        log::info!(
            "Limiter engaged: peak {:.2} dBFS, up to {:.2} dB reduction",
            stats.pre_limit_peak_db,
            reduction
        );
        stats.limiter_reduction_db = Some(reduction);
    }

    if let Some(target_db) = profile.normalize_peak_db {
        let peak = mix.peak();
        if peak > 0.0 {
            let gain = db_to_linear(target_db) / peak;
            mix.apply_gain_linear(gain);
            stats.normalization_gain_db = Some(linear_to_db(gain));
        }
    }

    Ok(stats)
}
