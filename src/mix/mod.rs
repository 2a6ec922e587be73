//! Mix Pipeline
//!
//! The five stages of mix creation, each a function over immutable inputs
//! producing a fresh buffer:
//! - `looper`: fill the target duration from a category's clips
//! - `effects`: per-category gain, band limiting, dynamics and space
//! - `composer`: weighted sum, master fades, emphasis, limiting
//! - `session`: `create_mix` and friends, tying the stages together

pub mod composer;
pub mod effects;
pub mod looper;
pub mod session;

pub use composer::{compose, compose_with_stats, MasterStats};
pub use effects::{apply_profile_effects, layer_chain};
pub use looper::{
    build_category_layer, build_category_layer_with, CategoryLayer, LoopSettings, LoopStrategy,
};
pub use session::{
    create_mix, create_mix_with, create_preview, expected_len, LayerSummary, MixReport, MixRequest,
    MixResult, DEFAULT_PREVIEW_MS,
};
