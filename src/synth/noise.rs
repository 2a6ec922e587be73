//! Colored noise generation
//!
//! All colors are generated mono from a caller-seeded `StdRng`, normalised to
//! a fixed RMS and duplicated to both ears.

use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use super::schedule::NoiseColor;

/// RMS every noise bed is normalised to before its level is applied
pub const NOISE_RMS: f32 = 0.1;

/// Number of Voss-McCartney rows (octaves) summed for pink noise
const PINK_ROWS: usize = 12;

/// Per-sample leak of the brown noise integrator
const BROWN_LEAK: f32 = 0.998;

/// Frequency of the anti-habituation amplitude swing, in Hz
pub const MODULATION_HZ: f64 = 0.008;

/// Generate `len` samples of `color` noise normalised to `NOISE_RMS`
///
/// Returns silence for `NoiseColor::None`.
pub fn generate(color: NoiseColor, len: usize, rng: &mut StdRng) -> Vec<f32> {
    let mut samples = match color {
        NoiseColor::None => return vec![0.0; len],
        NoiseColor::White => white(len, rng),
        NoiseColor::Pink => pink(len, rng),
        NoiseColor::Brown => brown(len, rng),
    };
    normalize_rms(&mut samples, NOISE_RMS);
    samples
}

/// Apply `0.75 + 0.25·sin(2π·f·t)` where `t` counts from `offset` samples
pub fn apply_modulation(samples: &mut [f32], offset: usize, sample_rate: u32) {
    let step = 2.0 * std::f64::consts::PI * MODULATION_HZ / sample_rate as f64;
    for (i, sample) in samples.iter_mut().enumerate() {
        let gain = 0.75 + 0.25 * (step * (offset + i) as f64).sin();
        *sample *= gain as f32;
    }
}

fn gaussian(rng: &mut StdRng) -> f32 {
    StandardNormal.sample(rng)
}

fn white(len: usize, rng: &mut StdRng) -> Vec<f32> {
    (0..len).map(|_| gaussian(rng)).collect()
}

/// Voss-McCartney: row `k` is redrawn every 2^k samples
fn pink(len: usize, rng: &mut StdRng) -> Vec<f32> {
    let mut rows: [f32; PINK_ROWS] = std::array::from_fn(|_| gaussian(rng));

    (0..len)
        .map(|n| {
            // The row to update is the number of trailing zeros of the counter
            if n > 0 {
                let row = (n.trailing_zeros() as usize).min(PINK_ROWS - 1);
                rows[row] = gaussian(rng);
            }
            rows.iter().sum::<f32>() + gaussian(rng)
        })
        .collect()
}

fn brown(len: usize, rng: &mut StdRng) -> Vec<f32> {
    let mut level = 0.0_f32;
    (0..len)
        .map(|_| {
            let step: f32 = rng.gen_range(-1.0..1.0);
            level = level * BROWN_LEAK + step * 0.1;
            level
        })
        .collect()
}

fn normalize_rms(samples: &mut [f32], target: f32) {
    if samples.is_empty() {
        return;
    }
    let mean_square: f64 =
        samples.iter().map(|&s| s as f64 * s as f64).sum::<f64>() / samples.len() as f64;
    let rms = mean_square.sqrt() as f32;
    if rms > 0.0 {
        let gain = target / rms;
        samples.iter_mut().for_each(|s| *s *= gain);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    /// Mean power of first differences relative to signal power
    ///
    /// High for white noise, lower for pink, tiny for brown.
    fn roughness(samples: &[f32]) -> f32 {
        let diff: f32 = samples.windows(2).map(|w| (w[1] - w[0]).powi(2)).sum();
        let power: f32 = samples.iter().map(|s| s * s).sum();
        diff / power
    }

    #[test]
    fn test_colors_normalised() {
        let mut rng = StdRng::seed_from_u64(7);
        for color in [NoiseColor::White, NoiseColor::Pink, NoiseColor::Brown] {
            let noise = generate(color, 44100, &mut rng);
            assert_relative_eq!(rms(&noise), NOISE_RMS, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_spectral_tilt_ordering() {
        let mut rng = StdRng::seed_from_u64(11);
        let white = roughness(&generate(NoiseColor::White, 44100, &mut rng));
        let pink = roughness(&generate(NoiseColor::Pink, 44100, &mut rng));
        let brown = roughness(&generate(NoiseColor::Brown, 44100, &mut rng));
        assert!(white > pink, "white {} pink {}", white, pink);
        assert!(pink > brown, "pink {} brown {}", pink, brown);
    }

    #[test]
    fn test_seed_reproducible() {
        let a = generate(NoiseColor::Pink, 1000, &mut StdRng::seed_from_u64(3));
        let b = generate(NoiseColor::Pink, 1000, &mut StdRng::seed_from_u64(3));
        assert_eq!(a, b);
    }

    #[test]
    fn test_none_is_silent() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(generate(NoiseColor::None, 100, &mut rng).iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_modulation_range() {
        let mut samples = vec![1.0_f32; 44100 * 130];
        apply_modulation(&mut samples, 0, 44100);
        let max = samples.iter().cloned().fold(f32::MIN, f32::max);
        let min = samples.iter().cloned().fold(f32::MAX, f32::min);
        assert!((max - 1.0).abs() < 1e-3);
        assert!((min - 0.5).abs() < 1e-3);
    }
}
