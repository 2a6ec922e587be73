//! DSP Library
//!
//! Envelope/crossfade kernel plus the offline effects applied to category
//! layers and the master bus. All effects implement the `Effect` trait and
//! are sequenced by an `EffectChain`.

pub mod envelope;

mod chain;
mod compressor;
mod effect;
mod filter;
mod gain;
mod limiter;
mod reverb;

pub use chain::{EffectChain, EffectPosition};
pub use compressor::{Compressor, CompressorParams};
pub use effect::Effect;
pub use envelope::{
    apply_linear_fade, apply_sine_envelope, crossfade_append, equal_power_crossfade,
    equal_power_gains, linear_fade, seamless_loop,
};
pub use filter::{BiquadCoeffs, EqBand, FilterType, PassFilter};
pub use gain::Gain;
pub use limiter::{Limiter, DEFAULT_THRESHOLD};
pub use reverb::{Reverb, ReverbParams};
