//! Envelope & Crossfade Kernel
//!
//! Pure numeric primitives used by every other stage: fade ramps, seam-safe
//! self-looping and equal-power crossfades between two signals.
//!
//! Every pure operation has an in-place twin (`apply_*`, `crossfade_append`)
//! so that multi-hour layers can be built without re-copying the whole
//! accumulated buffer at every clip boundary.

use std::f64::consts::FRAC_PI_2;

use crate::engine::buffer::AudioBuffer;
use crate::error::{Result, SomniaError};

// ============================================================================
// Curves
// ============================================================================

/// Equal-power gain pair at position `t` in [0, 1]
///
/// # Returns
/// `(fade_out, fade_in)` with `fade_out² + fade_in² = 1`
#[inline]
pub fn equal_power_gains(t: f64) -> (f32, f32) {
    let angle = t.clamp(0.0, 1.0) * FRAC_PI_2;
    (angle.cos() as f32, angle.sin() as f32)
}

/// Position of overlap sample `k` out of `overlap`, strictly inside (0, 1)
#[inline]
fn overlap_position(k: usize, overlap: usize) -> f64 {
    (k + 1) as f64 / (overlap + 1) as f64
}

/// Shrink a pair of fade lengths proportionally so they fit in `len`
fn fit_fades(len: usize, fade_in: usize, fade_out: usize) -> (usize, usize) {
    let total = fade_in + fade_out;
    if total <= len {
        return (fade_in, fade_out);
    }
    let scale = len as f64 / total as f64;
    let fade_in = (fade_in as f64 * scale).floor() as usize;
    let fade_out = ((fade_out as f64 * scale).floor() as usize).min(len - fade_in);
    (fade_in, fade_out)
}

/// Clamp a requested overlap to what two inputs of these lengths can share
fn clamp_overlap(overlap: usize, len_a: usize, len_b: usize) -> usize {
    let shortest = len_a.min(len_b);
    if overlap > shortest {
        shortest - 1
    } else {
        overlap
    }
}

// ============================================================================
// Fades
// ============================================================================

/// Apply linear fade-in/fade-out ramps in place
///
/// When `fade_in + fade_out` exceeds the buffer length both ramps are shrunk
/// proportionally. The first sample of a fade-in and the last sample of a
/// fade-out are exactly zero.
///
/// # Errors
/// * `EmptyBuffer` - If the buffer has no samples
pub fn apply_linear_fade(buffer: &mut AudioBuffer, fade_in: usize, fade_out: usize) -> Result<()> {
    let len = buffer.len();
    if len == 0 {
        return Err(SomniaError::empty_buffer("linear fade"));
    }
    let (fade_in, fade_out) = fit_fades(len, fade_in, fade_out);

    for channel in &mut buffer.samples {
        for (i, sample) in channel.iter_mut().take(fade_in).enumerate() {
            *sample *= i as f32 / fade_in as f32;
        }
        for i in (len - fade_out)..len {
            channel[i] *= (len - 1 - i) as f32 / fade_out as f32;
        }
    }
    Ok(())
}

/// Return a copy of `buffer` with linear fade-in/fade-out ramps applied
pub fn linear_fade(buffer: &AudioBuffer, fade_in: usize, fade_out: usize) -> Result<AudioBuffer> {
    let mut out = buffer.clone();
    apply_linear_fade(&mut out, fade_in, fade_out)?;
    Ok(out)
}

/// Apply a raised-sine (sin²) onset and offset in place
///
/// Used for synthesized tones, whose abrupt start is far more audible than
/// that of textured recordings. Lengths shrink to fit like `apply_linear_fade`.
pub fn apply_sine_envelope(
    buffer: &mut AudioBuffer,
    fade_in: usize,
    fade_out: usize,
) -> Result<()> {
    let len = buffer.len();
    if len == 0 {
        return Err(SomniaError::empty_buffer("sine envelope"));
    }
    let (fade_in, fade_out) = fit_fades(len, fade_in, fade_out);

    let curve = |i: usize, n: usize| -> f32 {
        let s = (i as f64 / n as f64 * FRAC_PI_2).sin();
        (s * s) as f32
    };

    for channel in &mut buffer.samples {
        for i in 0..fade_in {
            channel[i] *= curve(i, fade_in);
        }
        for i in (len - fade_out)..len {
            channel[i] *= curve(len - 1 - i, fade_out);
        }
    }
    Ok(())
}

// ============================================================================
// Crossfades
// ============================================================================

/// Append `next` to `dest`, overlapping `dest`'s tail with `next`'s head
///
/// The overlap is clamped to `min(len(dest), len(next)) - 1` when it exceeds
/// either input. The output keeps `dest`'s channel count; a mono `next` feeds
/// every channel.
///
/// # Returns
/// The overlap actually used, in samples
///
/// # Errors
/// * `EmptyBuffer` - If either input has no samples
pub fn crossfade_append(
    dest: &mut AudioBuffer,
    next: &AudioBuffer,
    overlap: usize,
) -> Result<usize> {
    if dest.is_empty() || next.is_empty() {
        return Err(SomniaError::empty_buffer("equal-power crossfade"));
    }
    let overlap = clamp_overlap(overlap, dest.len(), next.len());
    let start = dest.len() - overlap;
    let next_channels = next.channels();

    for (ch, channel) in dest.samples.iter_mut().enumerate() {
        let incoming = &next.samples[ch.min(next_channels - 1)];
        for k in 0..overlap {
            let (fade_out, fade_in) = equal_power_gains(overlap_position(k, overlap));
            channel[start + k] = channel[start + k] * fade_out + incoming[k] * fade_in;
        }
        channel.extend_from_slice(&incoming[overlap..]);
    }
    Ok(overlap)
}

/// Join `a` and `b` with an equal-power crossfade of `overlap` samples
///
/// # Returns
/// A buffer of `len(a) + len(b) - overlap` samples (after clamping)
pub fn equal_power_crossfade(
    a: &AudioBuffer,
    b: &AudioBuffer,
    overlap: usize,
) -> Result<AudioBuffer> {
    let mut out = if b.channels() > a.channels() {
        a.to_stereo()
    } else {
        a.clone()
    };
    crossfade_append(&mut out, b, overlap)?;
    Ok(out)
}

/// Self-crossfade a clip so copies of the result tile without a seam
///
/// The clip's last `overlap` samples are faded out over its first `overlap`
/// samples, producing a unit of `len - overlap` samples whose end runs
/// continuously into its own start. The overlap is limited to half the clip
/// so the untouched body never has negative length.
pub fn seamless_loop(clip: &AudioBuffer, overlap: usize) -> Result<AudioBuffer> {
    let len = clip.len();
    if len == 0 {
        return Err(SomniaError::empty_buffer("seamless loop"));
    }
    let overlap = overlap.min(len / 2);
    let tail_start = len - overlap;

    let samples = clip
        .samples
        .iter()
        .map(|channel| {
            let mut unit = Vec::with_capacity(tail_start);
            for k in 0..overlap {
                let (fade_out, fade_in) = equal_power_gains(overlap_position(k, overlap));
                unit.push(channel[tail_start + k] * fade_out + channel[k] * fade_in);
            }
            unit.extend_from_slice(&channel[overlap..tail_start]);
            unit
        })
        .collect();

    AudioBuffer::from_channels(samples, clip.sample_rate)
}

// ============================================================================
// Tests
// ============================================================================
