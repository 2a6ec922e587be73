//! Decoded source clips
//!
//! A clip is one decoded PCM file. It is immutable once constructed and the
//! engine only ever borrows it; every derived buffer is a fresh allocation.

use std::collections::BTreeMap;

use super::buffer::{samples_to_ms, AudioBuffer};

/// A decoded, fixed-length source clip
#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    name: String,
    buffer: AudioBuffer,
}

impl Clip {
    /// Wrap a decoded buffer as a clip
    pub fn new(name: impl Into<String>, buffer: AudioBuffer) -> Self {
        Self {
            name: name.into(),
            buffer,
        }
    }

    /// Source label (usually the file stem)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Decoded samples
    pub fn buffer(&self) -> &AudioBuffer {
        &self.buffer
    }

    pub fn sample_rate(&self) -> u32 {
        self.buffer.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.buffer.channels()
    }

    /// Number of sample frames
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Duration in whole milliseconds (truncated)
    pub fn duration_ms(&self) -> u64 {
        samples_to_ms(self.buffer.len(), self.buffer.sample_rate) as u64
    }
}

/// Category label mapped to its ordered clip list
///
/// A `BTreeMap` keeps iteration order stable so that logging and reports
/// are reproducible across runs.
pub type CategoryClips = BTreeMap<String, Vec<Clip>>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::buffer::ChannelLayout;

    #[test]
    fn test_clip_duration() {
        let clip = Clip::new(
            "drizzle",
            AudioBuffer::new(66150, ChannelLayout::Mono, 44100),
        );
        assert_eq!(clip.name(), "drizzle");
        assert_eq!(clip.duration_ms(), 1500);
        assert_eq!(clip.channels(), 1);
        assert!(!clip.is_empty());
    }
}
