//! Profile overrides
//!
//! Every field is optional; an absent field keeps the base profile's value.
//! Fields that can be switched off take `null` to disable them, which is
//! why they are `Option<Option<T>>`.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use super::{ClipOrder, Emphasis, FilterSpec, MixRatios, Personalization, VolumeCurve};
use crate::dsp::{CompressorParams, ReverbParams};
use crate::error::Result;
use crate::synth::{PhaseSchedule, Protocol, SynthSettings};

/// Typed override set merged onto a base profile.
///
/// Durations are signed so that negative values reach validation and are
/// reported as violations rather than as parse errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fade_in_ms: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fade_out_ms: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub crossfade_ms: Option<i64>,

    /// Merged key by key into the base table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_adjustment_db: Option<BTreeMap<String, f32>>,

    /// Merged key by key into the base table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_weights: Option<BTreeMap<String, f32>>,

    #[serde(deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub filter: Option<Option<FilterSpec>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_curve: Option<VolumeCurve>,

    #[serde(deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub emphasis: Option<Option<Emphasis>>,

    #[serde(deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub compression: Option<Option<CompressorParams>>,

    #[serde(deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub reverb: Option<Option<ReverbParams>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalize_clips: Option<bool>,

    #[serde(deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub normalize_peak_db: Option<Option<f32>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub clip_order: Option<ClipOrder>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mix_ratios: Option<MixRatios>,

    /// Applied on top of `mix_ratios`; never part of a resolved profile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub personalization: Option<Personalization>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub synth: Option<SynthSettings>,

    #[serde(deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub synth_schedule: Option<Option<PhaseSchedule>>,

    #[serde(deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Option<Protocol>>,
}

impl ProfileOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse overrides from a JSON object
    ///
    /// # Errors
    /// * `Serialization` - On unknown keys or mistyped values
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Parse overrides from JSON text
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Set a single category's weight
    pub fn with_weight(mut self, category: impl Into<String>, weight: f32) -> Self {
        self.category_weights
            .get_or_insert_with(BTreeMap::new)
            .insert(category.into(), weight);
        self
    }

    /// Set a single category's gain adjustment
    pub fn with_volume_db(mut self, category: impl Into<String>, db: f32) -> Self {
        self.volume_adjustment_db
            .get_or_insert_with(BTreeMap::new)
            .insert(category.into(), db);
        self
    }
}

/// Distinguish an absent field (`None`) from an explicit `null` (`Some(None)`)
fn double_option<'de, T, D>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
