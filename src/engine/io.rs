//! Audio file I/O for Somnia
//!
//! Thin adapters around the decoder/encoder collaborators: WAV clips in,
//! WAV mixes out. The composition core never calls into this module.
//!
//! Decoded clips keep their native sample rate; alignment to the mix rate
//! happens in the looper.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use walkdir::WalkDir;

use crate::engine::buffer::{AudioBuffer, ChannelLayout};
use crate::engine::clip::{CategoryClips, Clip};
use crate::error::{Result, SomniaError};

/// Export format configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportFormat {
    /// Target sample rate; `None` keeps the mix rate
    pub sample_rate: Option<u32>,
    /// Bit depth: 16, 24, or 32 (default: 16)
    pub bit_depth: u16,
}

impl Default for ExportFormat {
    fn default() -> Self {
        ExportFormat {
            sample_rate: None,
            bit_depth: 16,
        }
    }
}

impl ExportFormat {
    /// Create a new export format with the given sample rate and bit depth
    pub fn new(sample_rate: Option<u32>, bit_depth: u16) -> Self {
        ExportFormat {
            sample_rate,
            bit_depth,
        }
    }

    /// Create format for float masters (native rate, 32-bit float)
    pub fn float_master() -> Self {
        ExportFormat {
            sample_rate: None,
            bit_depth: 32,
        }
    }
}

/// Decode a WAV file into a clip
///
/// # Errors
/// * `FileNotFound` - If the file does not exist
/// * `InvalidAudio` - If the file is not a valid WAV file
/// * `UnsupportedFormat` - If the audio has more than 2 channels
pub fn import_clip(path: &Path) -> Result<Clip> {
    if !path.exists() {
        return Err(SomniaError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let reader = WavReader::open(path).map_err(|e| SomniaError::InvalidAudio {
        reason: format!("Failed to open WAV file {}: {}", path.display(), e),
        source: Some(Box::new(e)),
    })?;

    let spec = reader.spec();
    let channels = spec.channels as usize;
    let layout = ChannelLayout::from_count(channels).ok_or_else(|| {
        SomniaError::UnsupportedFormat {
            format: format!("{}-channel audio (only mono/stereo supported)", channels),
        }
    })?;

    let interleaved = read_samples_as_f32(reader, spec.bits_per_sample, spec.sample_format)?;
    let buffer = AudioBuffer::from_interleaved(&interleaved, layout, spec.sample_rate)?;

    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    log::debug!(
        "Imported clip '{}' ({} ch, {} Hz, {:.1}s)",
        name,
        channels,
        spec.sample_rate,
        buffer.duration_secs()
    );

    Ok(Clip::new(name, buffer))
}

/// Load a category library from a directory tree
///
/// Every immediate sub-directory of `root` is a category; every `.wav` file
/// below it (recursively) is a clip of that category. Files are loaded in
/// sorted path order so clip lists are reproducible. Empty sub-directories
/// produce empty categories.
pub fn load_category_dir(root: &Path) -> Result<CategoryClips> {
    if !root.is_dir() {
        return Err(SomniaError::FileNotFound {
            path: root.display().to_string(),
        });
    }

    let mut categories = CategoryClips::new();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| SomniaError::Io(std::io::Error::other(e.to_string())))?;
        if !entry.file_type().is_dir() {
            continue;
        }

        let category = entry.file_name().to_string_lossy().into_owned();
        let mut clips = Vec::new();

        for file in WalkDir::new(entry.path()).sort_by_file_name() {
            let file = file.map_err(|e| SomniaError::Io(std::io::Error::other(e.to_string())))?;
            let is_wav = file
                .path()
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("wav"))
                .unwrap_or(false);
            if file.file_type().is_file() && is_wav {
                clips.push(import_clip(file.path())?);
            }
        }

        log::info!("Category '{}': {} clip(s)", category, clips.len());
        categories.insert(category, clips);
    }

    Ok(categories)
}

/// Export an AudioBuffer to a WAV file
///
/// Resamples if the format requests a different rate than the buffer's.
pub fn export_wav(buffer: &AudioBuffer, path: &Path, format: ExportFormat) -> Result<()> {
    let target_rate = format.sample_rate.unwrap_or(buffer.sample_rate);

    let resampled;
    let source = if target_rate != buffer.sample_rate {
        resampled = buffer.resampled(target_rate);
        &resampled
    } else {
        buffer
    };

    let spec = WavSpec {
        channels: source.num_channels() as u16,
        sample_rate: target_rate,
        bits_per_sample: format.bit_depth,
        sample_format: if format.bit_depth == 32 {
            SampleFormat::Float
        } else {
            SampleFormat::Int
        },
    };

    if !matches!(format.bit_depth, 16 | 24 | 32) {
        return Err(SomniaError::UnsupportedFormat {
            format: format!("{}-bit audio (only 16, 24, 32 supported)", format.bit_depth),
        });
    }

    let mut writer = WavWriter::create(path, spec).map_err(hound_to_io)?;

    let interleaved = source.to_interleaved();
    match format.bit_depth {
        16 => {
            for sample in interleaved {
                let scaled = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
                writer.write_sample(scaled).map_err(hound_to_io)?;
            }
        }
        24 => {
            for sample in interleaved {
                // 24-bit stored as i32 in hound
                let scaled = (sample * 8388607.0).clamp(-8388608.0, 8388607.0) as i32;
                writer.write_sample(scaled).map_err(hound_to_io)?;
            }
        }
        _ => {
            for sample in interleaved {
                writer.write_sample(sample).map_err(hound_to_io)?;
            }
        }
    }

    writer.finalize().map_err(hound_to_io)?;
    log::info!("Exported {:.1}s mix to {}", source.duration_secs(), path.display());

    Ok(())
}

/// Generate a mono sine tone, mostly useful as test material
pub fn generate_test_tone(frequency: f32, duration_secs: f32, sample_rate: u32) -> AudioBuffer {
    let num_samples = (duration_secs * sample_rate as f32) as usize;
    let mut buffer = AudioBuffer::new(num_samples, ChannelLayout::Mono, sample_rate);

    let angular_freq = 2.0 * std::f64::consts::PI * frequency as f64 / sample_rate as f64;
    for (i, sample) in buffer.samples[0].iter_mut().enumerate() {
        *sample = (angular_freq * i as f64).sin() as f32;
    }

    buffer
}

// ============================================================================
// Internal helper functions
// ============================================================================

fn hound_to_io(e: hound::Error) -> SomniaError {
    match e {
        hound::Error::IoError(io) => SomniaError::Io(io),
        other => SomniaError::Io(std::io::Error::other(other.to_string())),
    }
}

/// Read samples from WAV reader and convert to f32
fn read_samples_as_f32<R: std::io::Read>(
    mut reader: WavReader<R>,
    bits_per_sample: u16,
    sample_format: SampleFormat,
) -> Result<Vec<f32>> {
    let invalid = |bits: u16| {
        move |e: hound::Error| SomniaError::InvalidAudio {
            reason: format!("Failed to read {}-bit samples: {}", bits, e),
            source: Some(Box::new(e)),
        }
    };

    match sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(invalid(32)),
        SampleFormat::Int => {
            let scale = match bits_per_sample {
                8 => 128.0,
                16 => 32768.0,
                24 => 8388608.0,
                32 => 2147483648.0,
                _ => {
                    return Err(SomniaError::UnsupportedFormat {
                        format: format!("{}-bit integer audio", bits_per_sample),
                    })
                }
            };
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(invalid(bits_per_sample))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_generate_test_tone() {
        let buffer = generate_test_tone(441.0, 1.0, 44100);
        assert_eq!(buffer.num_samples(), 44100);
        assert_eq!(buffer.num_channels(), 1);
        // 100 samples per cycle: half a cycle in, the tone crosses zero
        assert!(buffer.samples[0][50].abs() < 1e-3);
    }

    #[test]
    fn test_export_import_roundtrip_16bit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let tone = generate_test_tone(440.0, 0.5, 44100).to_stereo();

        export_wav(&tone, &path, ExportFormat::default()).unwrap();
        let clip = import_clip(&path).unwrap();

        assert_eq!(clip.name(), "tone");
        assert_eq!(clip.channels(), 2);
        assert_eq!(clip.len(), tone.len());
        for i in (0..tone.len()).step_by(97) {
            let diff = (clip.buffer().channel(0)[i] - tone.channel(0)[i]).abs();
            assert!(diff < 1e-3, "sample {} differs by {}", i, diff);
        }
    }

    #[test]
    fn test_export_resamples() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone48.wav");
        let tone = generate_test_tone(440.0, 1.0, 44100);

        export_wav(&tone, &path, ExportFormat::new(Some(48000), 24)).unwrap();
        let clip = import_clip(&path).unwrap();
        assert_eq!(clip.sample_rate(), 48000);
        assert_eq!(clip.len(), 48000);
    }

    #[test]
    fn test_export_rejects_bit_depth() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.wav");
        let tone = generate_test_tone(440.0, 0.1, 44100);
        let result = export_wav(&tone, &path, ExportFormat::new(None, 12));
        assert!(matches!(result, Err(SomniaError::UnsupportedFormat { .. })));
    }

    #[test]
    fn test_import_missing_file() {
        let result = import_clip(Path::new("/definitely/not/here.wav"));
        assert!(matches!(result, Err(SomniaError::FileNotFound { .. })));
    }

    #[test]
    fn test_load_category_dir() {
        let dir = tempdir().unwrap();
        let rain = dir.path().join("rain");
        let thunder = dir.path().join("thunder");
        std::fs::create_dir_all(&rain).unwrap();
        std::fs::create_dir_all(&thunder).unwrap();

        let tone = generate_test_tone(220.0, 0.2, 22050);
        export_wav(&tone, &rain.join("b.wav"), ExportFormat::default()).unwrap();
        export_wav(&tone, &rain.join("a.wav"), ExportFormat::default()).unwrap();
        std::fs::write(rain.join("notes.txt"), "not audio").unwrap();

        let categories = load_category_dir(dir.path()).unwrap();
        assert_eq!(categories.len(), 2);
        let names: Vec<&str> = categories["rain"].iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(categories["thunder"].is_empty());
    }
}
