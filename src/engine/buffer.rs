//! Audio Buffer Management
//!
//! Provides the core audio buffer type and level utilities for Somnia.
//! All internal processing uses non-interleaved 32-bit float samples in [-1, 1].

use crate::error::{Result, SomniaError};

// ============================================================================
// Constants
// ============================================================================

/// Default sample rate for composed mixes (44.1kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert decibels to linear amplitude
///
/// # Arguments
/// * `db` - Value in decibels
///
/// # Returns
/// Linear amplitude (0.0 to 1.0+ range)
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert linear amplitude to decibels
///
/// # Arguments
/// * `linear` - Linear amplitude value
///
/// # Returns
/// Value in decibels. Returns -f32::INFINITY for zero input.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

/// Convert a duration in milliseconds to a sample count (rounded to nearest)
#[inline]
pub fn ms_to_samples(ms: u64, sample_rate: u32) -> usize {
    ((ms as f64 * sample_rate as f64) / 1000.0).round() as usize
}

/// Convert a sample count to milliseconds
#[inline]
pub fn samples_to_ms(samples: usize, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    samples as f64 * 1000.0 / sample_rate as f64
}

/// Calculate the RMS level of an audio buffer in dB
///
/// Returns -f32::INFINITY for empty or silent buffers.
pub fn calculate_rms(buffer: &AudioBuffer) -> f32 {
    let total_samples = buffer.num_channels() * buffer.num_samples();
    if total_samples == 0 {
        return f32::NEG_INFINITY;
    }

    let sum_squares: f64 = buffer
        .samples
        .iter()
        .flat_map(|channel| channel.iter())
        .map(|&s| (s as f64) * (s as f64))
        .sum();

    let rms = (sum_squares / total_samples as f64).sqrt() as f32;
    linear_to_db(rms)
}

/// Calculate the peak level of an audio buffer in dB
///
/// Returns -f32::INFINITY for empty buffers.
pub fn calculate_peak(buffer: &AudioBuffer) -> f32 {
    linear_to_db(buffer.peak())
}

// ============================================================================
// Channel Layout
// ============================================================================

/// Audio channel configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelLayout {
    /// Single channel (mono)
    Mono,
    /// Two channels (stereo: left, right)
    #[default]
    Stereo,
}

impl ChannelLayout {
    /// Returns the number of channels for this layout
    pub fn num_channels(&self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }

    /// Create a ChannelLayout from a channel count
    pub fn from_count(count: usize) -> Option<Self> {
        match count {
            1 => Some(ChannelLayout::Mono),
            2 => Some(ChannelLayout::Stereo),
            _ => None,
        }
    }
}

// ============================================================================
// Audio Buffer
// ============================================================================

/// Core audio buffer type for all processing in Somnia
///
/// Stores audio as non-interleaved 32-bit floating point samples.
/// Each channel is a separate `Vec<f32>`; all channels have equal length.
///
/// # Example
/// ```
/// use somnia::engine::buffer::{AudioBuffer, ChannelLayout};
///
/// // Create a 1-second stereo buffer at 44.1kHz
/// let buffer = AudioBuffer::new(44100, ChannelLayout::Stereo, 44100);
/// assert_eq!(buffer.channels(), 2);
/// assert_eq!(buffer.len(), 44100);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Sample data: outer Vec is channels, inner Vec is samples
    pub samples: Vec<Vec<f32>>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Create a new silent audio buffer
    ///
    /// # Arguments
    /// * `num_samples` - Number of samples per channel
    /// * `layout` - Channel configuration (Mono or Stereo)
    /// * `sample_rate` - Sample rate in Hz
    pub fn new(num_samples: usize, layout: ChannelLayout, sample_rate: u32) -> Self {
        Self {
            samples: vec![vec![0.0_f32; num_samples]; layout.num_channels()],
            sample_rate,
        }
    }

    /// Create a silent stereo buffer lasting `duration_ms`
    pub fn silent(duration_ms: u64, sample_rate: u32) -> Self {
        Self::new(
            ms_to_samples(duration_ms, sample_rate),
            ChannelLayout::Stereo,
            sample_rate,
        )
    }

    /// Create a buffer from per-channel sample vectors
    ///
    /// # Errors
    /// `InvalidAudio` if no channels are given, more than two are given,
    /// or the channels differ in length.
    pub fn from_channels(samples: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        if ChannelLayout::from_count(samples.len()).is_none() {
            return Err(SomniaError::InvalidAudio {
                reason: format!(
                    "{} channels given (only mono/stereo supported)",
                    samples.len()
                ),
                source: None,
            });
        }
        let len = samples[0].len();
        if samples.iter().any(|ch| ch.len() != len) {
            return Err(SomniaError::InvalidAudio {
                reason: "channels have different lengths".to_string(),
                source: None,
            });
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Create an audio buffer from interleaved sample data
    ///
    /// # Returns
    /// Result containing the AudioBuffer, or error if data length doesn't match layout
    pub fn from_interleaved(
        interleaved: &[f32],
        layout: ChannelLayout,
        sample_rate: u32,
    ) -> Result<Self> {
        let num_channels = layout.num_channels();

        if interleaved.len() % num_channels != 0 {
            return Err(SomniaError::InvalidAudio {
                reason: format!(
                    "Interleaved data length {} is not divisible by channel count {}",
                    interleaved.len(),
                    num_channels
                ),
                source: None,
            });
        }

        let num_samples = interleaved.len() / num_channels;
        let mut samples = vec![Vec::with_capacity(num_samples); num_channels];

        for frame in interleaved.chunks_exact(num_channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                samples[ch].push(sample);
            }
        }

        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Convert the buffer to interleaved format (L, R, L, R, ... for stereo)
    pub fn to_interleaved(&self) -> Vec<f32> {
        let num_channels = self.channels();
        let num_samples = self.len();

        let mut interleaved = Vec::with_capacity(num_channels * num_samples);
        for sample_idx in 0..num_samples {
            for channel in &self.samples {
                interleaved.push(channel[sample_idx]);
            }
        }
        interleaved
    }

    /// Get the number of channels
    #[inline]
    pub fn channels(&self) -> usize {
        self.samples.len()
    }

    /// Alias for channels() - returns the number of channels
    #[inline]
    pub fn num_channels(&self) -> usize {
        self.channels()
    }

    /// Get the number of samples per channel
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.first().map(|ch| ch.len()).unwrap_or(0)
    }

    /// Check if the buffer is empty (no samples)
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Alias for len() - returns the number of samples per channel
    #[inline]
    pub fn num_samples(&self) -> usize {
        self.len()
    }

    /// Get the duration in seconds
    #[inline]
    pub fn duration_secs(&self) -> f64 {
        samples_to_ms(self.len(), self.sample_rate) / 1000.0
    }

    /// Get the duration in milliseconds
    #[inline]
    pub fn duration_ms(&self) -> f64 {
        samples_to_ms(self.len(), self.sample_rate)
    }

    /// Get the channel layout
    pub fn channel_layout(&self) -> Option<ChannelLayout> {
        ChannelLayout::from_count(self.channels())
    }

    /// Get immutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.samples[index]
    }

    /// Get mutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.samples[index]
    }

    /// Get a sample at the specified channel and index
    #[inline]
    pub fn get_sample(&self, channel: usize, index: usize) -> Option<f32> {
        self.samples
            .get(channel)
            .and_then(|ch| ch.get(index).copied())
    }

    /// Peak absolute sample value across all channels (linear)
    pub fn peak(&self) -> f32 {
        self.samples
            .iter()
            .flat_map(|channel| channel.iter())
            .map(|&s| s.abs())
            .fold(0.0_f32, f32::max)
    }

    /// Check whether every sample is exactly zero (or the buffer is empty)
    pub fn is_silent(&self) -> bool {
        self.samples
            .iter()
            .flat_map(|channel| channel.iter())
            .all(|&s| s == 0.0)
    }

    /// Check if all samples are finite (not NaN or Infinity)
    ///
    /// Used for filter instability detection.
    pub fn is_finite(&self) -> bool {
        self.samples
            .iter()
            .flat_map(|ch| ch.iter())
            .all(|s| s.is_finite())
    }

    /// Apply gain in decibels to all samples
    pub fn apply_gain(&mut self, gain_db: f32) {
        self.apply_gain_linear(db_to_linear(gain_db));
    }

    /// Multiply all samples by a linear factor
    pub fn apply_gain_linear(&mut self, gain: f32) {
        if (gain - 1.0).abs() < f32::EPSILON {
            return;
        }
        for channel in &mut self.samples {
            for sample in channel.iter_mut() {
                *sample *= gain;
            }
        }
    }

    /// Shorten every channel to `num_samples` (no-op if already shorter)
    pub fn truncate(&mut self, num_samples: usize) {
        for channel in &mut self.samples {
            channel.truncate(num_samples);
        }
    }

    /// Zero-pad or truncate every channel to exactly `num_samples`
    pub fn resize(&mut self, num_samples: usize) {
        for channel in &mut self.samples {
            channel.resize(num_samples, 0.0);
        }
    }

    /// Return a stereo version of this buffer (mono is duplicated)
    pub fn to_stereo(&self) -> AudioBuffer {
        match self.channels() {
            1 => AudioBuffer {
                samples: vec![self.samples[0].clone(), self.samples[0].clone()],
                sample_rate: self.sample_rate,
            },
            _ => self.clone(),
        }
    }

    /// Return this buffer resampled to `target_rate` using linear interpolation
    ///
    /// A buffer without a usable rate (0 Hz on either side) is relabelled,
    /// not stretched.
    pub fn resampled(&self, target_rate: u32) -> AudioBuffer {
        if target_rate == self.sample_rate
            || self.is_empty()
            || target_rate == 0
            || self.sample_rate == 0
        {
            return AudioBuffer {
                samples: self.samples.clone(),
                sample_rate: target_rate,
            };
        }

        let ratio = target_rate as f64 / self.sample_rate as f64;
        let output_len = ((self.len() as f64) * ratio).round().max(1.0) as usize;

        let samples = self
            .samples
            .iter()
            .map(|input| {
                (0..output_len)
                    .map(|i| {
                        let src_pos = i as f64 / ratio;
                        let src_idx = src_pos.floor() as usize;
                        let frac = (src_pos - src_idx as f64) as f32;
                        match (input.get(src_idx), input.get(src_idx + 1)) {
                            (Some(&a), Some(&b)) => a + (b - a) * frac,
                            (Some(&a), None) => a,
                            _ => input.last().copied().unwrap_or(0.0),
                        }
                    })
                    .collect()
            })
            .collect();

        AudioBuffer {
            samples,
            sample_rate: target_rate,
        }
    }

    /// Add `other` into this buffer sample-wise, scaled by `gain`
    ///
    /// Samples beyond the end of `other` are treated as zero; samples of
    /// `other` beyond this buffer's length are ignored. A mono `other` is
    /// added to every channel.
    pub fn mix_in(&mut self, other: &AudioBuffer, gain: f32) {
        let other_channels = other.channels();
        if other_channels == 0 {
            return;
        }
        for (ch, dest) in self.samples.iter_mut().enumerate() {
            let src = &other.samples[ch.min(other_channels - 1)];
            for (d, &s) in dest.iter_mut().zip(src.iter()) {
                *d += s * gain;
            }
        }
    }
}

impl Default for AudioBuffer {
    fn default() -> Self {
        Self::new(0, ChannelLayout::Stereo, DEFAULT_SAMPLE_RATE)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // Helper to create a buffer with known content
    fn create_test_buffer(samples: Vec<Vec<f32>>) -> AudioBuffer {
        AudioBuffer {
            samples,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }

    // ------------------------------------------------------------------------
    // Unit conversion tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_db_to_linear() {
        assert!((db_to_linear(0.0) - 1.0).abs() < 1e-6);
        assert!((db_to_linear(-6.0206) - 0.5).abs() < 1e-4);
        assert!((db_to_linear(-20.0) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_linear_to_db() {
        assert!((linear_to_db(1.0) - 0.0).abs() < 1e-6);
        assert!((linear_to_db(0.1) - (-20.0)).abs() < 1e-4);
        assert!(linear_to_db(0.0).is_infinite() && linear_to_db(0.0).is_sign_negative());
    }

    #[test]
    fn test_ms_sample_conversion() {
        assert_eq!(ms_to_samples(1000, 44100), 44100);
        assert_eq!(ms_to_samples(10, 48000), 480);
        assert!((samples_to_ms(22050, 44100) - 500.0).abs() < 1e-9);
    }

    #[test]
    fn test_calculate_rms_sine() {
        // Sine wave with amplitude 1.0 has RMS of 1/sqrt(2) ~= -3.01 dB
        let num_samples = DEFAULT_SAMPLE_RATE as usize;
        let samples: Vec<f32> = (0..num_samples)
            .map(|i| {
                let t = i as f32 / DEFAULT_SAMPLE_RATE as f32;
                (2.0 * std::f32::consts::PI * 1000.0 * t).sin()
            })
            .collect();
        let buffer = create_test_buffer(vec![samples]);
        assert!((calculate_rms(&buffer) - (-3.01)).abs() < 0.1);
    }

    #[test]
    fn test_calculate_peak_negative() {
        let mut samples = vec![0.0; 1000];
        samples[500] = -0.5;
        let buffer = create_test_buffer(vec![samples]);
        assert!((calculate_peak(&buffer) - (-6.02)).abs() < 0.1);
        assert!((buffer.peak() - 0.5).abs() < 1e-6);
    }

    // ------------------------------------------------------------------------
    // AudioBuffer tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_buffer_silent_duration() {
        let buffer = AudioBuffer::silent(1500, 48000);
        assert_eq!(buffer.channels(), 2);
        assert_eq!(buffer.len(), 72000);
        assert!((buffer.duration_ms() - 1500.0).abs() < 1e-6);
        assert!(buffer.is_silent());
    }

    #[test]
    fn test_buffer_from_channels_mismatch() {
        let result = AudioBuffer::from_channels(vec![vec![0.0; 10], vec![0.0; 9]], 44100);
        assert!(result.is_err());
        let result = AudioBuffer::from_channels(vec![], 44100);
        assert!(result.is_err());
    }

    #[test]
    fn test_buffer_interleaved_roundtrip() {
        let original = vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8];
        let buffer =
            AudioBuffer::from_interleaved(&original, ChannelLayout::Stereo, 44100).unwrap();
        assert_eq!(buffer.get_sample(0, 1), Some(0.3));
        assert_eq!(buffer.get_sample(1, 1), Some(0.4));
        assert_eq!(buffer.to_interleaved(), original);
    }

    #[test]
    fn test_buffer_from_interleaved_invalid() {
        let result = AudioBuffer::from_interleaved(&[0.1, 0.2, 0.3], ChannelLayout::Stereo, 44100);
        assert!(result.is_err());
    }

    #[test]
    fn test_buffer_to_stereo() {
        let mono = create_test_buffer(vec![vec![0.25; 10]]);
        let stereo = mono.to_stereo();
        assert_eq!(stereo.channels(), 2);
        assert_eq!(stereo.channel(0), stereo.channel(1));
    }

    #[test]
    fn test_buffer_resampled_length() {
        let buffer = create_test_buffer(vec![vec![0.5; 48000]]);
        let resampled = AudioBuffer {
            sample_rate: 48000,
            ..buffer
        }
        .resampled(44100);
        assert_eq!(resampled.sample_rate, 44100);
        assert_eq!(resampled.len(), 44100);
        assert!(resampled.channel(0).iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_buffer_mix_in_pads_short_source() {
        let mut dest = create_test_buffer(vec![vec![0.1; 4], vec![0.1; 4]]);
        let src = create_test_buffer(vec![vec![1.0; 2]]);
        dest.mix_in(&src, 0.5);
        assert_eq!(dest.channel(0), &[0.6, 0.6, 0.1, 0.1]);
        assert_eq!(dest.channel(1), &[0.6, 0.6, 0.1, 0.1]);
    }

    #[test]
    fn test_buffer_is_finite() {
        assert!(create_test_buffer(vec![vec![0.5; 100]]).is_finite());
        assert!(!create_test_buffer(vec![vec![f32::NAN; 100]]).is_finite());
        assert!(!create_test_buffer(vec![vec![f32::INFINITY; 100]]).is_finite());
    }

    #[test]
    fn test_buffer_apply_gain() {
        let mut buffer = create_test_buffer(vec![vec![0.5; 100]]);
        buffer.apply_gain(-6.0206);
        let sample = buffer.get_sample(0, 0).unwrap();
        assert!((sample - 0.25).abs() < 0.01);
    }

    #[test]
    fn test_buffer_resize_and_truncate() {
        let mut buffer = create_test_buffer(vec![vec![1.0; 4], vec![1.0; 4]]);
        buffer.resize(6);
        assert_eq!(buffer.channel(1), &[1.0, 1.0, 1.0, 1.0, 0.0, 0.0]);
        buffer.truncate(2);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_resample_from_zero_rate_does_not_stretch() {
        let buffer = AudioBuffer::new(100, ChannelLayout::Mono, 0);
        let out = buffer.resampled(8000);
        assert_eq!(out.len(), 100);
        assert_eq!(out.sample_rate, 8000);
    }
}
