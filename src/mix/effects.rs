//! Layer Effects Processor
//!
//! Builds the per-category effect chain from a profile: gain, zero-phase
//! band limiting, then the optional compression and reverb stages. Master
//! fades are not applied here; the composer applies them once to the summed
//! mix.

use crate::dsp::{Compressor, EffectChain, EqBand, Gain, PassFilter, Reverb};
use crate::engine::AudioBuffer;
use crate::error::Result;
use crate::profile::{Emphasis, FilterSpec, MixProfile};

/// Effect chain for one category layer
pub fn layer_chain(profile: &MixProfile, category: &str) -> EffectChain {
    let mut chain = EffectChain::new();

    let gain = Gain::new(profile.volume_db(category));
    if !gain.is_unity() {
        chain.add(Box::new(gain));
    }

    match profile.filter {
        FilterSpec::None => {}
        FilterSpec::LowPass { cutoff_hz } => {
            chain.add(Box::new(PassFilter::low_pass(cutoff_hz as f64)));
        }
        FilterSpec::BandPass { low_hz, high_hz } => {
            chain.add(Box::new(PassFilter::band_pass(low_hz as f64, high_hz as f64)));
        }
    }

    if let Some(params) = &profile.compression {
        chain.add(Box::new(Compressor::with_params(params.clone())));
    }
    if let Some(params) = &profile.reverb {
        chain.add(Box::new(Reverb::with_params(params.clone())));
    }

    chain.prepare(profile.sample_rate);
    chain
}

/// EQ band realising a master-bus emphasis
pub fn emphasis_band(emphasis: Emphasis) -> EqBand {
    match emphasis {
        Emphasis::Low => EqBand::low_shelf(200.0, 2.0),
        Emphasis::Warm => EqBand::peak(1000.0, 1.5, 0.7),
        Emphasis::Bright => EqBand::high_shelf(3000.0, 1.5),
    }
}

/// Apply `category`'s gain, filter and optional dynamics/space effects
///
/// A silent layer is returned untouched; every stage maps silence to
/// silence.
///
/// # Errors
/// * `FilterInstability` - If a stage produces NaN/Inf, naming the category
pub fn apply_profile_effects(
    mut layer: AudioBuffer,
    profile: &MixProfile,
    category: &str,
) -> Result<AudioBuffer> {
    if layer.is_silent() {
        return Ok(layer);
    }

    let mut chain = layer_chain(profile, category);
    log::debug!(
        "Category '{}': effects [{}]",
        category,
        chain.effect_types().join(", ")
    );
    chain.process(&mut layer, &format!("category '{}'", category))?;
    Ok(layer)
}
