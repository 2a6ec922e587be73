//! Category Looper
//!
//! Fills a target duration from one category's clips by concatenating them
//! with equal-power crossfades, or by tiling a seamless loop when only one
//! clip is available.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::dsp::envelope::{apply_linear_fade, crossfade_append, seamless_loop};
use crate::engine::buffer::{db_to_linear, ms_to_samples, AudioBuffer, DEFAULT_SAMPLE_RATE};
use crate::engine::{CancellationToken, Clip};
use crate::error::{Result, SomniaError};
use crate::profile::ClipOrder;

/// Longest fade used when trimming an overshooting tail
const TRIM_FADE_MS: u64 = 1000;

/// Peak that clips are normalised to before looping, in dBFS
const CLIP_PEAK_DB: f32 = -1.0;

/// How a layer was assembled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopStrategy {
    /// No clips; the layer is silence.
    Silent,
    /// One clip long enough to cover the target.
    Trimmed,
    /// One short clip tiled with a self-crossfade.
    SeamlessLoop,
    /// Several clips chained with crossfades.
    Concatenated,
}

/// Parameters for building one category layer
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub target_duration_ms: u64,
    pub crossfade_ms: u64,
    pub sample_rate: u32,
    pub order: ClipOrder,
    pub normalize_clips: bool,
}

impl LoopSettings {
    pub fn new(target_duration_ms: u64, crossfade_ms: u64, sample_rate: u32) -> Self {
        Self {
            target_duration_ms,
            crossfade_ms,
            sample_rate,
            order: ClipOrder::Sequential,
            normalize_clips: false,
        }
    }
}

/// A built category layer and how it was made
#[derive(Debug, Clone)]
pub struct CategoryLayer {
    pub category: String,
    pub buffer: AudioBuffer,
    pub strategy: LoopStrategy,
    /// Number of clip placements (repeats included)
    pub placements: usize,
}

/// Stable seed for `label` and `target_duration_ms`
///
/// Derived from a SHA-256 digest so it does not depend on the standard
/// library's hasher.
pub fn derive_seed(label: &str, target_duration_ms: u64) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(label.as_bytes());
    hasher.update(target_duration_ms.to_le_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

/// Build a layer of exactly `target_duration_ms` from `clips`
///
/// Clips are used in the order given, at the first clip's sample rate.
/// An empty clip list yields silence.
///
/// # Errors
/// * `EmptyBuffer` - If any clip has no samples
pub fn build_category_layer(
    clips: &[Clip],
    target_duration_ms: u64,
    crossfade_ms: u64,
) -> Result<AudioBuffer> {
    let sample_rate = clips.first().map_or(DEFAULT_SAMPLE_RATE, Clip::sample_rate);
    let settings = LoopSettings::new(target_duration_ms, crossfade_ms, sample_rate);
    build_category_layer_with("category", clips, &settings, &CancellationToken::new())
        .map(|layer| layer.buffer)
}

/// Build the stereo layer for `category`
///
/// # Arguments
/// * `category` - Label used for seeding, logging and error context
/// * `clips` - The category's clips, in any sample rate and channel count
/// * `settings` - Target, crossfade, output rate and ordering
/// * `cancel` - Checked before every clip placement
///
/// # Errors
/// * `EmptyBuffer` - If any clip has no samples
/// * `Cancelled` - If `cancel` fires
pub fn build_category_layer_with(
    category: &str,
    clips: &[Clip],
    settings: &LoopSettings,
    cancel: &CancellationToken,
) -> Result<CategoryLayer> {
    let sample_rate = settings.sample_rate;
    let target = ms_to_samples(settings.target_duration_ms, sample_rate);
    let crossfade = ms_to_samples(settings.crossfade_ms, sample_rate);
    let stage = format!("looping category '{}'", category);

    if clips.is_empty() {
        log::debug!("Category '{}' has no clips, contributing silence", category);
        return Ok(CategoryLayer {
            category: category.to_string(),
            buffer: AudioBuffer::silent(settings.target_duration_ms, sample_rate),
            strategy: LoopStrategy::Silent,
            placements: 0,
        });
    }

    let prepared = clips
        .iter()
        .map(|clip| prepare_clip(category, clip, settings))
        .collect::<Result<Vec<_>>>()?;

    let (mut buffer, strategy, placements) = if prepared.len() == 1 {
        let clip = &prepared[0];
        if clip.len() >= target {
            (clip.clone(), LoopStrategy::Trimmed, 1)
        } else {
            let (looped, repeats) = tile_seamless(clip, target, crossfade, cancel, &stage)?;
            (looped, LoopStrategy::SeamlessLoop, repeats)
        }
    } else {
        let seed = derive_seed(category, settings.target_duration_ms);
        let (chained, placed) = chain_clips(
            &prepared,
            target,
            crossfade,
            settings.order,
            seed,
            cancel,
            &stage,
        )?;
        (chained, LoopStrategy::Concatenated, placed)
    };

    if buffer.len() > target {
        buffer.truncate(target);
        let fade = crossfade.min(ms_to_samples(TRIM_FADE_MS, sample_rate));
        if fade > 0 {
            apply_linear_fade(&mut buffer, 0, fade)?;
        }
    }

    log::info!(
        "Category '{}': {} clip(s), {:?}, {} placement(s)",
        category,
        clips.len(),
        strategy,
        placements
    );

    Ok(CategoryLayer {
        category: category.to_string(),
        buffer,
        strategy,
        placements,
    })
}

/// Resample, widen to stereo and optionally peak-normalise a clip
///
/// # Errors
/// * `EmptyBuffer` - If the clip has no samples
/// * `InvalidAudio` - If the clip reports a sample rate of 0 Hz
fn prepare_clip(category: &str, clip: &Clip, settings: &LoopSettings) -> Result<AudioBuffer> {
    if clip.is_empty() {
        return Err(SomniaError::empty_buffer(format!(
            "clip '{}' of category '{}'",
            clip.name(),
            category
        )));
    }
    if clip.sample_rate() == 0 {
        return Err(SomniaError::InvalidAudio {
            reason: format!(
                "clip '{}' of category '{}' has a sample rate of 0 Hz",
                clip.name(),
                category
            ),
            source: None,
        });
    }

    let mut buffer = clip.buffer().resampled(settings.sample_rate).to_stereo();
    if settings.normalize_clips {
        let peak = buffer.peak();
        if peak > 0.0 {
            buffer.apply_gain_linear(db_to_linear(CLIP_PEAK_DB) / peak);
        }
    }
    Ok(buffer)
}

/// Tile a single clip with its self-crossfaded loop unit
///
/// The clip's head plays untouched once; every repeat is the loop unit,
/// whose blended head continues the previous copy's body without a seam.
fn tile_seamless(
    clip: &AudioBuffer,
    target: usize,
    crossfade: usize,
    cancel: &CancellationToken,
    stage: &str,
) -> Result<(AudioBuffer, usize)> {
    let overlap = crossfade.min(clip.len() / 2);
    let unit = seamless_loop(clip, overlap)?;

    let mut out = clip.clone();
    out.truncate(clip.len() - overlap);
    let mut repeats = 1;

    while out.len() < target {
        cancel.check(stage)?;
        for (dest, src) in out.samples.iter_mut().zip(&unit.samples) {
            dest.extend_from_slice(src);
        }
        repeats += 1;
    }
    Ok((out, repeats))
}

/// Chain clips round-robin with crossfades until `target` is reached
fn chain_clips(
    clips: &[AudioBuffer],
    target: usize,
    crossfade: usize,
    order: ClipOrder,
    seed: u64,
    cancel: &CancellationToken,
    stage: &str,
) -> Result<(AudioBuffer, usize)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut sequence = ClipSequence::new(clips.len(), order);

    let first = sequence.next_index(&mut rng);
    let mut out = clips[first].clone();
    let mut previous_len = clips[first].len();
    let mut placements = 1;

    while out.len() < target {
        cancel.check(stage)?;
        let index = sequence.next_index(&mut rng);
        let next = &clips[index];

        // Short clips shrink the crossfade so no body goes negative
        let overlap = crossfade.min(next.len() / 2).min(previous_len / 2);
        crossfade_append(&mut out, next, overlap)?;

        previous_len = next.len();
        placements += 1;
    }
    Ok((out, placements))
}

/// Round-robin over clip indices, optionally shuffled every round
struct ClipSequence {
    order: ClipOrder,
    round: Vec<usize>,
    position: usize,
    last: Option<usize>,
}

impl ClipSequence {
    fn new(count: usize, order: ClipOrder) -> Self {
        Self {
            order,
            round: (0..count).collect(),
            position: count,
            last: None,
        }
    }

    fn next_index(&mut self, rng: &mut StdRng) -> usize {
        if self.position == self.round.len() {
            self.position = 0;
            if self.order == ClipOrder::Shuffled {
                self.round.shuffle(rng);
                // Never play the same clip twice in a row across rounds
                if self.round.len() > 1 && Some(self.round[0]) == self.last {
                    self.round.swap(0, 1);
                }
            }
        }
        let index = self.round[self.position];
        self.position += 1;
        self.last = Some(index);
        index
    }
}
