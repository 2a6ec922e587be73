//! Effect Chain management
//!
//! Effects are processed in chain order (index 0 first). Insertion keeps the
//! fixed stage order used for layers and the master bus:
//! 1. Gain
//! 2. Pass filter (zero-phase low/band-pass)
//! 3. EQ (emphasis shelves and peaks)
//! 4. Compression
//! 5. Reverb
//! 6. Limiter (always last)
//!
//! After every stage the buffer is checked for NaN/Inf so a corrupted stage
//! is reported by name instead of poisoning the rest of the mix.

use super::Effect;
use crate::engine::AudioBuffer;
use crate::error::{Result, SomniaError};

/// Order priority of each effect type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EffectPosition {
    Gain = 0,
    Filter = 1,
    Eq = 2,
    Compressor = 3,
    Reverb = 4,
    Limiter = 5,
}

impl EffectPosition {
    /// Get the position for an effect type
    pub fn for_effect_type(effect_type: &str) -> Self {
        match effect_type {
            "gain" => EffectPosition::Gain,
            "filter" => EffectPosition::Filter,
            "eq" => EffectPosition::Eq,
            "compressor" => EffectPosition::Compressor,
            "reverb" => EffectPosition::Reverb,
            "limiter" => EffectPosition::Limiter,
            _ => EffectPosition::Eq,
        }
    }
}

/// Chain of effects for processing
#[derive(Clone, Default)]
pub struct EffectChain {
    effects: Vec<Box<dyn Effect>>,
}

impl EffectChain {
    /// Create a new empty effect chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an effect at its position, after any effects of the same type
    pub fn add(&mut self, effect: Box<dyn Effect>) {
        let position = EffectPosition::for_effect_type(effect.effect_type());
        let index = self
            .effects
            .iter()
            .position(|e| EffectPosition::for_effect_type(e.effect_type()) > position)
            .unwrap_or(self.effects.len());
        self.effects.insert(index, effect);
    }

    /// Builder-style `add`
    pub fn with(mut self, effect: Box<dyn Effect>) -> Self {
        self.add(effect);
        self
    }

    /// Prepare all effects for processing
    pub fn prepare(&mut self, sample_rate: u32) {
        for effect in &mut self.effects {
            effect.prepare(sample_rate);
        }
    }

    /// Reset all effects
    pub fn reset(&mut self) {
        for effect in &mut self.effects {
            effect.reset();
        }
    }

    /// Process the entire chain
    ///
    /// # Errors
    /// * `FilterInstability` - naming `context` and the stage that produced
    ///   non-finite samples
    pub fn process(&mut self, buffer: &mut AudioBuffer, context: &str) -> Result<()> {
        for effect in &mut self.effects {
            effect.process(buffer);
            if !buffer.is_finite() {
                return Err(SomniaError::filter_instability(format!(
                    "{} ({})",
                    context,
                    effect.display_name()
                )));
            }
        }
        Ok(())
    }

    /// Get the number of effects in the chain
    pub fn len(&self) -> usize {
        self.effects.len()
    }

    /// Check if the chain is empty
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Effect type identifiers in processing order
    pub fn effect_types(&self) -> Vec<&'static str> {
        self.effects.iter().map(|e| e.effect_type()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::{Gain, Limiter, PassFilter, Reverb};
    use crate::engine::ChannelLayout;
    use crate::impl_effect_common;

    /// Effect that corrupts its input
    #[derive(Clone)]
    struct Explode;

    impl Effect for Explode {
        fn process(&mut self, buffer: &mut AudioBuffer) {
            buffer.samples[0][0] = f32::NAN;
        }
        fn prepare(&mut self, _sample_rate: u32) {}
        fn reset(&mut self) {}
        impl_effect_common!(Explode, "filter", "Exploding Filter");
    }

    #[test]
    fn test_effect_position_ordering() {
        assert!(EffectPosition::Gain < EffectPosition::Filter);
        assert!(EffectPosition::Compressor < EffectPosition::Reverb);
        assert!(EffectPosition::Reverb < EffectPosition::Limiter);
    }

    #[test]
    fn test_add_sorts_by_position() {
        let chain = EffectChain::new()
            .with(Box::new(Limiter::default()))
            .with(Box::new(Reverb::default()))
            .with(Box::new(Gain::new(-3.0)))
            .with(Box::new(PassFilter::low_pass(4000.0)));
        assert_eq!(chain.effect_types(), vec!["gain", "filter", "reverb", "limiter"]);
    }

    #[test]
    fn test_instability_names_stage() {
        let mut chain = EffectChain::new().with(Box::new(Explode));
        let mut buffer = AudioBuffer::new(16, ChannelLayout::Stereo, 44100);
        let err = chain.process(&mut buffer, "layer 'rain'").unwrap_err();
        assert!(matches!(err, SomniaError::FilterInstability { .. }));
        assert!(err.to_string().contains("rain"));
        assert!(err.to_string().contains("Exploding Filter"));
    }
}
