//! Gain Effect
//!
//! Static per-layer gain from a profile's `volume_adjustment_db` table.

use crate::dsp::effect::Effect;
use crate::engine::buffer::db_to_linear;
use crate::engine::AudioBuffer;
use crate::impl_effect_common;

// ============================================================================
// Constants
// ============================================================================

/// Minimum gain in dB (-96 dB = effectively silent)
const MIN_GAIN_DB: f32 = -96.0;

/// Maximum gain in dB (+24 dB)
const MAX_GAIN_DB: f32 = 24.0;

// ============================================================================
// Gain Effect
// ============================================================================

/// Simple gain adjustment effect
///
/// # Parameters
/// - `gain_db`: Gain in decibels (-96 to +24 dB)
#[derive(Debug, Clone)]
pub struct Gain {
    gain_db: f32,
    gain_linear: f32,
}

impl Gain {
    /// Create a new gain effect
    ///
    /// # Arguments
    /// * `gain_db` - Gain in decibels, clamped to -96..=24
    pub fn new(gain_db: f32) -> Self {
        let clamped = gain_db.clamp(MIN_GAIN_DB, MAX_GAIN_DB);
        Self {
            gain_db: clamped,
            gain_linear: db_to_linear(clamped),
        }
    }

    pub fn gain_db(&self) -> f32 {
        self.gain_db
    }

    pub fn gain_linear(&self) -> f32 {
        self.gain_linear
    }

    /// Check if this gain leaves the signal untouched
    pub fn is_unity(&self) -> bool {
        self.gain_db.abs() < 1e-6
    }
}

impl Default for Gain {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl Effect for Gain {
    fn process(&mut self, buffer: &mut AudioBuffer) {
        if self.is_unity() {
            return;
        }
        buffer.apply_gain_linear(self.gain_linear);
    }

    fn prepare(&mut self, _sample_rate: u32) {}

    fn reset(&mut self) {}

    impl_effect_common!(Gain, "gain", "Gain");
}

// ============================================================================
// Tests
// ============================================================================
