//! Somnia - Long-Duration Sleep Mix Composition Engine
//!
//! Somnia assembles hours-long ambient tracks from short source clips:
//! 1. Category looping - clips are chained with equal-power crossfades until
//!    the target duration is filled
//! 2. Layer effects - per-category gain, zero-phase filtering, optional
//!    compression and reverb
//! 3. Synthesis - binaural beats and colored noise following a multi-phase
//!    schedule
//! 4. Composition - weighted summation, master fades, emphasis and soft
//!    limiting
//!
//! # Architecture
//!
//! Every call is independent: parameters flow in through a resolved
//! `MixProfile`, randomness is seeded per call, and category layers are
//! rendered in parallel before a single composition step.

pub mod cli;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod mix;
pub mod profile;
pub mod synth;

pub use engine::{AudioBuffer, CancellationToken, CategoryClips, Clip};
pub use error::{ProfileViolation, Result, SomniaError};
pub use mix::{create_mix, create_mix_with, create_preview, MixReport, MixRequest, MixResult};
pub use profile::{resolve_profile, MixProfile, ProfileOverrides};
pub use synth::{synthesize, BeatSpec, NoiseColor, Phase, PhaseSchedule, Protocol};
