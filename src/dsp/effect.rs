//! Effect trait definition
//!
//! Base trait for every offline DSP stage applied to a layer or the master bus.

use crate::engine::AudioBuffer;

/// Base trait for all DSP effects
///
/// Effects process whole buffers in place. A layer is processed in one call,
/// so implementations may run look-ahead or two-pass algorithms.
pub trait Effect: Send + Sync {
    /// Process audio buffer in-place
    fn process(&mut self, buffer: &mut AudioBuffer);

    /// Prepare the effect for processing at `sample_rate`
    fn prepare(&mut self, sample_rate: u32);

    /// Reset effect state
    ///
    /// Clears any internal buffers/state (e.g., filter history, delay lines).
    fn reset(&mut self);

    /// Get the effect type identifier
    fn effect_type(&self) -> &'static str;

    /// Get human-readable display name
    fn display_name(&self) -> &str;

    /// Clone the effect into a boxed trait object
    fn box_clone(&self) -> Box<dyn Effect>;
}

impl Clone for Box<dyn Effect> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Helper macro to implement common Effect trait methods
#[macro_export]
macro_rules! impl_effect_common {
    ($type:ty, $effect_type:expr, $display_name:expr) => {
        fn effect_type(&self) -> &'static str {
            $effect_type
        }

        fn display_name(&self) -> &str {
            $display_name
        }

        fn box_clone(&self) -> Box<dyn Effect> {
            Box::new(self.clone())
        }
    };
}
