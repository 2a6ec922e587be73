//! Binaural beat oscillator
//!
//! Left ear plays the carrier, right ear the carrier plus the beat. Both ears
//! run one phase accumulator each for the whole schedule, advanced by the
//! instantaneous frequency of every sample, so neither phase boundaries nor
//! dynamic beats ever cause a phase jump.

use std::f64::consts::{FRAC_PI_2, TAU};

use super::schedule::PhaseSchedule;
use crate::engine::buffer::{ms_to_samples, AudioBuffer};
use crate::engine::CancellationToken;
use crate::error::Result;

/// Span of one phase on the sample timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseSpan {
    pub start: usize,
    pub len: usize,
}

impl PhaseSpan {
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// Lay out a schedule's phases on the sample timeline
///
/// Boundaries are rounded from cumulative milliseconds so rounding never
/// accumulates across phases.
pub fn phase_spans(schedule: &PhaseSchedule, sample_rate: u32) -> Vec<PhaseSpan> {
    let mut spans = Vec::with_capacity(schedule.phases.len());
    let mut elapsed_ms = 0;
    let mut start = 0;
    for phase in &schedule.phases {
        elapsed_ms += phase.duration_ms;
        let end = ms_to_samples(elapsed_ms, sample_rate);
        spans.push(PhaseSpan {
            start,
            len: end - start,
        });
        start = end;
    }
    spans
}

/// Instantaneous carrier and beat frequency for every sample of a schedule
///
/// Around each boundary the frequencies glide from one phase's law to the
/// next along `sin²`, the power curve of an equal-power crossfade. The glide
/// window is centred on the boundary and never takes more than half of
/// either neighbouring phase.
#[derive(Debug, Clone)]
pub struct FrequencyPlan<'a> {
    schedule: &'a PhaseSchedule,
    spans: Vec<PhaseSpan>,
    /// Half-width of the glide at the boundary *before* each phase
    half_windows: Vec<usize>,
    sample_rate: u32,
}

impl<'a> FrequencyPlan<'a> {
    pub fn new(schedule: &'a PhaseSchedule, sample_rate: u32, transition_samples: usize) -> Self {
        let spans = phase_spans(schedule, sample_rate);
        let half_windows = spans
            .iter()
            .enumerate()
            .map(|(k, span)| {
                if k == 0 {
                    0
                } else {
                    (transition_samples / 2).min(spans[k - 1].len / 2).min(span.len / 2)
                }
            })
            .collect();
        Self {
            schedule,
            spans,
            half_windows,
            sample_rate,
        }
    }

    pub fn spans(&self) -> &[PhaseSpan] {
        &self.spans
    }

    pub fn len(&self) -> usize {
        self.spans.last().map_or(0, PhaseSpan::end)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Phase `k`'s own (carrier, beat) at absolute sample `n`
    fn own(&self, k: usize, n: usize) -> (f64, f64) {
        let phase = &self.schedule.phases[k];
        let t = (n as f64 - self.spans[k].start as f64) / self.sample_rate as f64;
        (phase.carrier_frequency_hz, phase.beat.frequency_at(t))
    }

    /// (carrier, beat) at sample `n`, which lies in phase `k`
    pub fn frequencies(&self, k: usize, n: usize) -> (f64, f64) {
        let own = self.own(k, n);

        let half = self.half_windows[k];
        let start = self.spans[k].start;
        if k > 0 && n < start + half {
            return glide(self.own(k - 1, n), own, n + half - start, 2 * half);
        }

        if k + 1 < self.spans.len() {
            let half = self.half_windows[k + 1];
            let next_start = self.spans[k + 1].start;
            if n + half >= next_start {
                return glide(own, self.own(k + 1, n), n + half - next_start, 2 * half);
            }
        }
        own
    }

    /// Beat frequency at absolute sample `n`
    pub fn beat_at(&self, n: usize) -> f64 {
        let k = self
            .spans
            .iter()
            .position(|span| n < span.end())
            .unwrap_or(self.spans.len().saturating_sub(1));
        self.frequencies(k, n).1
    }
}

/// Blend `from` into `to` at step `pos` of `width`
fn glide(from: (f64, f64), to: (f64, f64), pos: usize, width: usize) -> (f64, f64) {
    if width == 0 {
        return to;
    }
    let w = (pos as f64 / width as f64 * FRAC_PI_2).sin().powi(2);
    (
        from.0 + (to.0 - from.0) * w,
        from.1 + (to.1 - from.1) * w,
    )
}

/// Render the binaural pair at peak `amplitude`
///
/// Checks `cancel` before every phase.
pub fn render(
    plan: &FrequencyPlan<'_>,
    amplitude: f32,
    cancel: &CancellationToken,
) -> Result<AudioBuffer> {
    let sample_rate = plan.sample_rate as f64;
    let total = plan.len();
    let mut left = Vec::with_capacity(total);
    let mut right = Vec::with_capacity(total);

    let mut phase_left = 0.0_f64;
    let mut phase_right = 0.0_f64;

    for (k, span) in plan.spans().iter().enumerate() {
        cancel.check(&format!("binaural synthesis of phase {}", k))?;

        for n in span.start..span.end() {
            left.push((phase_left.sin() as f32) * amplitude);
            right.push((phase_right.sin() as f32) * amplitude);

            let (carrier, beat) = plan.frequencies(k, n);
            phase_left = (phase_left + TAU * carrier / sample_rate) % TAU;
            phase_right = (phase_right + TAU * (carrier + beat) / sample_rate) % TAU;
        }
    }

    AudioBuffer::from_channels(vec![left, right], plan.sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::schedule::{BeatSpec, NoiseColor, Phase};

    fn two_phase() -> PhaseSchedule {
        PhaseSchedule::new(vec![
            Phase::new(2000, 150.0, BeatSpec::fixed(0.25), NoiseColor::None),
            Phase::new(2000, 150.0, BeatSpec::fixed(3.0), NoiseColor::None),
        ])
    }

    #[test]
    fn test_spans_cover_total() {
        let schedule = PhaseSchedule::new(vec![
            Phase::new(333, 150.0, BeatSpec::fixed(1.0), NoiseColor::None),
            Phase::new(333, 150.0, BeatSpec::fixed(1.0), NoiseColor::None),
            Phase::new(334, 150.0, BeatSpec::fixed(1.0), NoiseColor::None),
        ]);
        let spans = phase_spans(&schedule, 44100);
        assert_eq!(spans[0].start, 0);
        assert_eq!(spans[1].start, spans[0].end());
        assert_eq!(spans[2].end(), 44100);
    }

    #[test]
    fn test_glide_is_monotonic_between_beats() {
        let schedule = two_phase();
        let plan = FrequencyPlan::new(&schedule, 1000, 1000);

        assert_eq!(plan.beat_at(100), 0.25);
        assert_eq!(plan.beat_at(3900), 3.0);
        let mid = plan.beat_at(2000);
        assert!((mid - 1.625).abs() < 0.01, "midpoint beat {}", mid);

        let trace: Vec<f64> = (1400..2600).map(|n| plan.beat_at(n)).collect();
        assert!(trace.windows(2).all(|w| w[1] >= w[0]));
        assert!(trace.windows(2).all(|w| w[1] - w[0] < 0.01));
    }

    #[test]
    fn test_render_phase_continuity() {
        let schedule = two_phase();
        let plan = FrequencyPlan::new(&schedule, 8000, 4000);
        let buffer = render(&plan, 0.5, &CancellationToken::new()).unwrap();
        assert_eq!(buffer.len(), 32000);

        // Largest legal step of a 153 Hz sine at 0.5 amplitude, 8 kHz
        let bound = 0.5 * TAU * 153.0 / 8000.0 * 1.01;
        for channel in &buffer.samples {
            let max_step = channel
                .windows(2)
                .map(|w| (w[1] - w[0]).abs() as f64)
                .fold(0.0, f64::max);
            assert!(max_step <= bound, "step {} > {}", max_step, bound);
        }
    }

    /// Frequency of a unit sine around sample `n`, from its two neighbours
    fn instantaneous_hz(channel: &[f32], n: usize, sample_rate: u32) -> Option<f64> {
        let x = channel[n] as f64;
        if x.abs() < 0.7 {
            return None;
        }
        let cos = (channel[n - 1] as f64 + channel[n + 1] as f64) / (2.0 * x);
        Some(cos.clamp(-1.0, 1.0).acos() * sample_rate as f64 / TAU)
    }

    #[test]
    fn test_dynamic_beat_phase_is_continuous() {
        let sample_rate = 8000;
        let schedule = PhaseSchedule::new(vec![
            Phase::new(
                4000,
                150.0,
                BeatSpec::Dynamic {
                    center_hz: 2.0,
                    range_hz: 2.0,
                    modulation_hz: 0.5,
                    clamp_hz: None,
                },
                NoiseColor::None,
            ),
            Phase::new(
                4000,
                150.0,
                BeatSpec::Dynamic {
                    center_hz: 3.0,
                    range_hz: 1.0,
                    modulation_hz: 0.25,
                    clamp_hz: None,
                },
                NoiseColor::None,
            ),
        ]);
        let plan = FrequencyPlan::new(&schedule, sample_rate, ms_to_samples(1000, sample_rate));
        let buffer = render(&plan, 1.0, &CancellationToken::new()).unwrap();
        let (left, right) = (&buffer.samples[0], &buffer.samples[1]);
        let boundary = plan.spans()[1].start;
        assert_eq!(boundary, 32000);

        // The increment between n-1 and n+1 is the mean of two per-sample laws
        let own_beat = |k: usize, n: usize| {
            let t = (n as f64 - plan.spans()[k].start as f64) / sample_rate as f64;
            schedule.phases[k].beat.frequency_at(t)
        };
        let mut checked = 0;
        for n in 1..buffer.len() - 1 {
            let Some(measured) = instantaneous_hz(right, n, sample_rate) else {
                continue;
            };
            let expected = if n < boundary - 4000 {
                150.0 + 0.5 * (own_beat(0, n - 1) + own_beat(0, n))
            } else if n > boundary + 4000 {
                150.0 + 0.5 * (own_beat(1, n - 1) + own_beat(1, n))
            } else {
                150.0 + 0.5 * (plan.beat_at(n - 1) + plan.beat_at(n))
            };
            assert!(
                (measured - expected).abs() < 0.01,
                "sample {}: right ear at {} Hz, expected {}",
                n,
                measured,
                expected
            );
            checked += 1;
        }
        assert!(checked > 10_000, "only {} samples measured", checked);

        for n in (boundary - 200)..(boundary + 200) {
            if let Some(measured) = instantaneous_hz(left, n, sample_rate) {
                assert!((measured - 150.0).abs() < 0.01, "left ear at {} Hz", measured);
            }
        }
    }

    #[test]
    fn test_render_glides_from_quarter_hertz_to_three() {
        let sample_rate = 8000;
        let schedule = PhaseSchedule::new(vec![
            Phase::new(6000, 150.0, BeatSpec::fixed(0.25), NoiseColor::None),
            Phase::new(6000, 150.0, BeatSpec::fixed(3.0), NoiseColor::None),
        ]);
        let plan = FrequencyPlan::new(&schedule, sample_rate, ms_to_samples(3000, sample_rate));
        let buffer = render(&plan, 1.0, &CancellationToken::new()).unwrap();
        let right = &buffer.samples[1];
        let boundary = plan.spans()[1].start;
        let half = 12000;

        let beat_near = |from: usize, to: usize| -> Vec<f64> {
            (from..to)
                .filter_map(|n| instantaneous_hz(right, n, sample_rate))
                .map(|hz| hz - 150.0)
                .collect()
        };

        for beat in beat_near(1000, boundary - half - 10) {
            assert!((beat - 0.25).abs() < 0.01, "before the glide: {}", beat);
        }
        for beat in beat_near(boundary + half + 10, buffer.len() - 1000) {
            assert!((beat - 3.0).abs() < 0.01, "after the glide: {}", beat);
        }

        let inner = beat_near(boundary - half + 2000, boundary + half - 2000);
        assert!(!inner.is_empty());
        for beat in inner {
            assert!(beat > 0.25 && beat < 3.0, "inside the glide: {}", beat);
        }

        let mid = beat_near(boundary - 40, boundary + 40);
        assert!(!mid.is_empty());
        for beat in mid {
            assert!((beat - 1.625).abs() < 0.02, "at the boundary: {}", beat);
        }
    }

    #[test]
    fn test_render_cancelled() {
        let schedule = two_phase();
        let plan = FrequencyPlan::new(&schedule, 8000, 4000);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(render(&plan, 0.5, &cancel).is_err());
    }
}
