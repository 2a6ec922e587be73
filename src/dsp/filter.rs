//! Biquad filters
//!
//! Second-order sections from the Audio EQ Cookbook, used two ways:
//! - `PassFilter`: zero-phase (forward-backward) low-pass / band-pass for
//!   layer tone shaping, free of pre-ringing
//! - `EqBand`: causal shelf/peak bands for master-bus emphasis

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use super::effect::Effect;
use crate::engine::AudioBuffer;
use crate::impl_effect_common;

/// Q of a second-order Butterworth section
pub const BUTTERWORTH_Q: f64 = std::f64::consts::FRAC_1_SQRT_2;

/// Filter type for biquad sections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    /// Bell curve boost/cut
    Peak,
    /// Boost/cut below frequency
    LowShelf,
    /// Boost/cut above frequency
    HighShelf,
    /// Remove above frequency
    LowPass,
    /// Remove below frequency
    HighPass,
}

/// Biquad filter coefficients
/// Transfer function: H(z) = (b0 + b1*z^-1 + b2*z^-2) / (1 + a1*z^-1 + a2*z^-2)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl BiquadCoeffs {
    /// Calculate biquad coefficients using Audio EQ Cookbook formulas
    /// Reference: https://www.w3.org/2011/audio/audio-eq-cookbook.html
    pub fn calculate(
        filter_type: FilterType,
        sample_rate: f64,
        frequency: f64,
        gain_db: f64,
        q: f64,
    ) -> Self {
        // Keep the corner strictly below Nyquist
        let freq = frequency.clamp(10.0, sample_rate * 0.49);
        let q = q.clamp(0.1, 10.0);

        let w0 = 2.0 * PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * q);
        let a = 10.0_f64.powf(gain_db / 40.0);

        let (b0, b1, b2, a0, a1, a2) = match filter_type {
            FilterType::Peak => (
                1.0 + alpha * a,
                -2.0 * cos_w0,
                1.0 - alpha * a,
                1.0 + alpha / a,
                -2.0 * cos_w0,
                1.0 - alpha / a,
            ),
            FilterType::LowShelf => {
                let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
                    2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0),
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
                    (a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
                    -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0),
                    (a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
                )
            }
            FilterType::HighShelf => {
                let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
                    -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0),
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
                    (a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
                    2.0 * ((a - 1.0) - (a + 1.0) * cos_w0),
                    (a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
                )
            }
            FilterType::LowPass => (
                (1.0 - cos_w0) / 2.0,
                1.0 - cos_w0,
                (1.0 - cos_w0) / 2.0,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
            FilterType::HighPass => (
                (1.0 + cos_w0) / 2.0,
                -(1.0 + cos_w0),
                (1.0 + cos_w0) / 2.0,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
        };

        BiquadCoeffs {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Gain of the section at DC
    pub fn dc_gain(&self) -> f64 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }
}

/// Biquad filter state for one channel (Direct Form I)
#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl BiquadState {
    /// State the filter would hold after a long run of constant `input`
    fn settled(input: f64, coeffs: &BiquadCoeffs) -> Self {
        let output = input * coeffs.dc_gain();
        Self {
            x1: input,
            x2: input,
            y1: output,
            y2: output,
        }
    }

    #[inline]
    fn process(&mut self, input: f64, coeffs: &BiquadCoeffs) -> f64 {
        let output = coeffs.b0 * input + coeffs.b1 * self.x1 + coeffs.b2 * self.x2
            - coeffs.a1 * self.y1
            - coeffs.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;

        output
    }
}

/// Run one section over `channel` forward and then backward
///
/// Each pass starts from the settled state for its first sample so the
/// edges carry no start-up transient.
fn filtfilt(channel: &mut [f32], coeffs: &BiquadCoeffs) {
    let Some(&first) = channel.first() else {
        return;
    };

    let mut state = BiquadState::settled(first as f64, coeffs);
    for sample in channel.iter_mut() {
        *sample = state.process(*sample as f64, coeffs) as f32;
    }

    let last = channel[channel.len() - 1];
    let mut state = BiquadState::settled(last as f64, coeffs);
    for sample in channel.iter_mut().rev() {
        *sample = state.process(*sample as f64, coeffs) as f32;
    }
}

// ============================================================================
// Zero-phase pass filter
// ============================================================================

/// Zero-phase low-pass, high-pass or band-pass filter
///
/// A band-pass is realised as a high-pass section followed by a low-pass
/// section. Every section runs forward and backward, which doubles its
/// attenuation slope and cancels its phase response.
#[derive(Debug, Clone)]
pub struct PassFilter {
    sections: Vec<(FilterType, f64)>,
    sample_rate: u32,
    coeffs: Vec<BiquadCoeffs>,
}

impl PassFilter {
    pub fn low_pass(cutoff_hz: f64) -> Self {
        Self::with_sections(vec![(FilterType::LowPass, cutoff_hz)])
    }

    pub fn high_pass(cutoff_hz: f64) -> Self {
        Self::with_sections(vec![(FilterType::HighPass, cutoff_hz)])
    }

    /// Pass `low_hz..high_hz`
    pub fn band_pass(low_hz: f64, high_hz: f64) -> Self {
        Self::with_sections(vec![
            (FilterType::HighPass, low_hz),
            (FilterType::LowPass, high_hz),
        ])
    }

    fn with_sections(sections: Vec<(FilterType, f64)>) -> Self {
        let mut filter = Self {
            sections,
            sample_rate: 0,
            coeffs: Vec::new(),
        };
        filter.prepare(crate::engine::buffer::DEFAULT_SAMPLE_RATE);
        filter
    }
}

impl Effect for PassFilter {
    fn process(&mut self, buffer: &mut AudioBuffer) {
        if buffer.sample_rate != self.sample_rate {
            self.prepare(buffer.sample_rate);
        }
        for channel in &mut buffer.samples {
            for coeffs in &self.coeffs {
                filtfilt(channel, coeffs);
            }
        }
    }

    fn prepare(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
        self.coeffs = self
            .sections
            .iter()
            .map(|&(filter_type, freq)| {
                BiquadCoeffs::calculate(filter_type, sample_rate as f64, freq, 0.0, BUTTERWORTH_Q)
            })
            .collect();
    }

    fn reset(&mut self) {}

    impl_effect_common!(PassFilter, "filter", "Zero-Phase Filter");
}

// ============================================================================
// EQ band
// ============================================================================

/// Single causal EQ band (shelf or peak)
#[derive(Debug, Clone)]
pub struct EqBand {
    filter_type: FilterType,
    frequency: f64,
    gain_db: f64,
    q: f64,
    coeffs: BiquadCoeffs,
    states: Vec<BiquadState>,
    sample_rate: u32,
}

impl EqBand {
    pub fn new(filter_type: FilterType, frequency: f64, gain_db: f64, q: f64) -> Self {
        let sample_rate = crate::engine::buffer::DEFAULT_SAMPLE_RATE;
        Self {
            filter_type,
            frequency,
            gain_db,
            q,
            coeffs: BiquadCoeffs::calculate(filter_type, sample_rate as f64, frequency, gain_db, q),
            states: Vec::new(),
            sample_rate,
        }
    }

    pub fn low_shelf(frequency: f64, gain_db: f64) -> Self {
        Self::new(FilterType::LowShelf, frequency, gain_db, BUTTERWORTH_Q)
    }

    pub fn high_shelf(frequency: f64, gain_db: f64) -> Self {
        Self::new(FilterType::HighShelf, frequency, gain_db, BUTTERWORTH_Q)
    }

    pub fn peak(frequency: f64, gain_db: f64, q: f64) -> Self {
        Self::new(FilterType::Peak, frequency, gain_db, q)
    }

    pub fn filter_type(&self) -> FilterType {
        self.filter_type
    }
}

impl Effect for EqBand {
    fn process(&mut self, buffer: &mut AudioBuffer) {
        if buffer.sample_rate != self.sample_rate {
            self.prepare(buffer.sample_rate);
        }
        self.states
            .resize_with(buffer.channels(), BiquadState::default);

        for (channel, state) in buffer.samples.iter_mut().zip(self.states.iter_mut()) {
            for sample in channel.iter_mut() {
                *sample = state.process(*sample as f64, &self.coeffs) as f32;
            }
        }
    }

    fn prepare(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
        self.coeffs = BiquadCoeffs::calculate(
            self.filter_type,
            sample_rate as f64,
            self.frequency,
            self.gain_db,
            self.q,
        );
        self.reset();
    }

    fn reset(&mut self) {
        self.states.clear();
    }

    impl_effect_common!(EqBand, "eq", "EQ Band");
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::buffer::calculate_rms;
    use crate::engine::io::generate_test_tone;
    use approx::assert_relative_eq;

    #[test]
    fn test_lowpass_dc_gain_is_unity() {
        let coeffs =
            BiquadCoeffs::calculate(FilterType::LowPass, 44100.0, 1000.0, 0.0, BUTTERWORTH_Q);
        assert_relative_eq!(coeffs.dc_gain(), 1.0, epsilon = 1e-9);
        let coeffs =
            BiquadCoeffs::calculate(FilterType::HighPass, 44100.0, 1000.0, 0.0, BUTTERWORTH_Q);
        assert_relative_eq!(coeffs.dc_gain(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_lowpass_attenuates_high_tone() {
        let mut high = generate_test_tone(12000.0, 0.5, 44100);
        let mut low = generate_test_tone(200.0, 0.5, 44100);
        let mut filter = PassFilter::low_pass(2000.0);
        filter.process(&mut high);
        filter.process(&mut low);

        assert!(calculate_rms(&high) < -40.0, "high tone rms {}", calculate_rms(&high));
        assert!(calculate_rms(&low) > -3.5);
    }

    #[test]
    fn test_zero_phase_keeps_alignment() {
        // A pass-band tone must come out in phase with the input
        let input = generate_test_tone(100.0, 0.5, 44100);
        let mut output = input.clone();
        PassFilter::low_pass(4000.0).process(&mut output);

        let mid = input.len() / 2;
        for i in mid..mid + 200 {
            assert!((output.samples[0][i] - input.samples[0][i]).abs() < 0.01);
        }
    }

    #[test]
    fn test_band_pass_rejects_both_sides() {
        let mut rumble = generate_test_tone(40.0, 1.0, 44100);
        let mut hiss = generate_test_tone(15000.0, 1.0, 44100);
        let mut filter = PassFilter::band_pass(500.0, 6000.0);
        filter.process(&mut rumble);
        filter.process(&mut hiss);
        assert!(calculate_rms(&rumble) < -30.0);
        assert!(calculate_rms(&hiss) < -20.0);
    }

    #[test]
    fn test_low_shelf_boosts_bass() {
        let mut bass = generate_test_tone(50.0, 0.5, 44100);
        let before = calculate_rms(&bass);
        EqBand::low_shelf(200.0, 2.0).process(&mut bass);
        let gain = calculate_rms(&bass) - before;
        assert!((gain - 2.0).abs() < 0.3, "shelf gain {}", gain);
    }
}
