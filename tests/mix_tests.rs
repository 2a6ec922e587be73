//! Integration Tests
//!
//! End-to-end tests for the Somnia mix pipeline: library in, mix out.

use std::f32::consts::TAU;

use approx::assert_relative_eq;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;
use test_case::test_case;

use somnia::engine::buffer::{ms_to_samples, ChannelLayout};
use somnia::engine::{export_wav, generate_test_tone, import_clip, load_category_dir, ExportFormat};
use somnia::mix::{expected_len, LoopStrategy};
use somnia::synth::binaural::FrequencyPlan;
use somnia::{
    create_mix, create_mix_with, resolve_profile, AudioBuffer, BeatSpec, CancellationToken,
    CategoryClips, Clip, MixRequest, NoiseColor, Phase, PhaseSchedule, ProfileOverrides,
    SomniaError,
};

// ============================================================================
// Helpers
// ============================================================================

fn tone_clip(name: &str, frequency: f32, seconds: f32, sample_rate: u32) -> Clip {
    Clip::new(name, generate_test_tone(frequency, seconds, sample_rate))
}

fn overrides(value: serde_json::Value) -> ProfileOverrides {
    ProfileOverrides::from_json(value).unwrap()
}

fn library(entries: Vec<(&str, Vec<Clip>)>) -> CategoryClips {
    entries
        .into_iter()
        .map(|(category, clips)| (category.to_string(), clips))
        .collect()
}

/// Largest sample-to-sample jump over both channels
fn max_step(buffer: &AudioBuffer) -> f32 {
    buffer
        .samples
        .iter()
        .flat_map(|channel| channel.windows(2).map(|w| (w[1] - w[0]).abs()))
        .fold(0.0, f32::max)
}

/// Frequency of a steady tone, from positive-going zero crossings
fn zero_crossing_hz(samples: &[f32], sample_rate: u32) -> f64 {
    let cycles = samples.windows(2).filter(|w| w[0] < 0.0 && w[1] >= 0.0).count();
    cycles as f64 * sample_rate as f64 / samples.len() as f64
}

// ============================================================================
// Duration and level invariants
// ============================================================================

#[test_case("sleep", 5_000 ; "sleep five seconds")]
#[test_case("focus", 7_333 ; "focus odd length")]
#[test_case("relax", 12_000 ; "relax twelve seconds")]
#[test_case("custom", 3_001 ; "custom profile")]
fn test_output_length_is_exact(mix_type: &str, target_ms: u64) {
    let sr = 22_050;
    let clips = library(vec![
        ("rain", vec![tone_clip("drizzle", 330.0, 1.3, sr)]),
        (
            "thunder",
            vec![tone_clip("rumble", 80.0, 0.7, 16_000), tone_clip("crack", 120.0, 2.2, sr)],
        ),
    ]);
    let overrides = overrides(json!({
        "sample_rate": sr,
        "fade_in_ms": 1000,
        "fade_out_ms": 1000,
        "crossfade_ms": 500
    }));

    let result = create_mix(&clips, mix_type, target_ms, &overrides, None).unwrap();
    assert_eq!(result.buffer.len(), expected_len(&result.profile, target_ms));
    assert_eq!(result.buffer.len(), ms_to_samples(target_ms, sr));
    assert_eq!(result.buffer.channels(), 2);
    assert!(result.buffer.peak() <= 1.0);
}

#[test]
fn test_loud_layers_never_clip() {
    let sr = 8000;
    let clips = library(vec![
        ("rain", vec![tone_clip("a", 200.0, 1.0, sr)]),
        ("water", vec![tone_clip("b", 200.0, 1.0, sr)]),
        ("nature", vec![tone_clip("c", 200.0, 1.0, sr)]),
    ]);
    let overrides = overrides(json!({
        "sample_rate": sr,
        "crossfade_ms": 200,
        "normalize_peak_db": null,
        "category_weights": { "rain": 4.0, "water": 4.0, "nature": 4.0 }
    }));

    let result = create_mix(&clips, "custom", 6000, &overrides, None).unwrap();
    assert!(result.buffer.peak() <= 1.0);
    assert!(result.master.limiter_reduction_db.is_some());
}

// ============================================================================
// Concrete scenarios
// ============================================================================

#[test]
fn test_single_clip_loops_to_a_minute() {
    let sr = 22_050;
    let clips = library(vec![("rain", vec![tone_clip("steady_rain", 220.0, 30.0, sr)])]);
    let overrides = overrides(json!({ "sample_rate": sr }));

    let result = create_mix(&clips, "sleep", 60_000, &overrides, None).unwrap();
    assert_eq!(result.buffer.len(), 60 * sr as usize);
    assert_eq!(result.layers.len(), 1);
    assert_eq!(result.layers[0].strategy, LoopStrategy::SeamlessLoop);
    assert_relative_eq!(result.actual_duration_ms, 60_000.0, epsilon = 1e-6);

    // The loop seam must not introduce a step larger than the tone itself produces
    let tone_step = TAU * 220.0 / sr as f32;
    assert!(max_step(&result.buffer) <= 2.0 * tone_step * result.buffer.peak());
}

#[test]
fn test_empty_category_is_the_same_as_absent() {
    let sr = 22_050;
    let thunder = vec![tone_clip("distant", 90.0, 10.0, sr)];
    let with_empty = library(vec![("rain", Vec::new()), ("thunder", thunder.clone())]);
    let without = library(vec![("thunder", thunder)]);
    let overrides = overrides(json!({ "sample_rate": sr }));

    let a = create_mix(&with_empty, "relax", 30_000, &overrides, None).unwrap();
    let b = create_mix(&without, "relax", 30_000, &overrides, None).unwrap();

    assert_eq!(a.buffer.len(), 30 * sr as usize);
    assert!(a.buffer == b.buffer, "an empty category changed the mix");
    assert_eq!(a.layers[0].category, "rain");
    assert_eq!(a.layers[0].strategy, LoopStrategy::Silent);
}

#[test]
fn test_only_empty_categories_is_an_error() {
    let clips = library(vec![("rain", Vec::new()), ("wind", Vec::new())]);
    match create_mix(&clips, "sleep", 10_000, &ProfileOverrides::default(), None) {
        Err(SomniaError::EmptyMix { categories }) => assert_eq!(categories, vec!["rain", "wind"]),
        other => panic!("expected EmptyMix, got {:?}", other.map(|r| r.buffer.len())),
    }
}

#[test]
fn test_invalid_profile_reported_before_rendering() {
    let clips = library(vec![("rain", vec![tone_clip("a", 200.0, 1.0, 8000)])]);
    let overrides = overrides(json!({
        "sample_rate": 8000,
        "fade_in_ms": -5,
        "category_weights": { "rain": -1.0 }
    }));

    match create_mix(&clips, "custom", 10_000, &overrides, None) {
        Err(SomniaError::InvalidProfile { mix_type, violations }) => {
            assert_eq!(mix_type, "custom");
            let fields: Vec<&str> = violations.iter().map(|v| v.field.as_str()).collect();
            assert_eq!(fields, vec!["fade_in_ms", "category_weights.rain"]);
        }
        other => panic!("expected InvalidProfile, got {:?}", other.map(|r| r.buffer.len())),
    }
}

// ============================================================================
// Binaural synthesis
// ============================================================================

fn two_phase_schedule() -> PhaseSchedule {
    PhaseSchedule::new(vec![
        Phase::new(20_000, 150.0, BeatSpec::fixed(0.25), NoiseColor::None),
        Phase::new(20_000, 150.0, BeatSpec::fixed(3.0), NoiseColor::None),
    ])
}

#[test]
fn test_beat_trace_follows_schedule() {
    let sr = 8000;
    let schedule = two_phase_schedule();
    let plan = FrequencyPlan::new(&schedule, sr, ms_to_samples(3000, sr));

    assert_relative_eq!(plan.beat_at(ms_to_samples(5_000, sr)), 0.25, epsilon = 1e-12);
    assert_relative_eq!(plan.beat_at(ms_to_samples(30_000, sr)), 3.0, epsilon = 1e-12);
    // Halfway through the glide the beat sits halfway between the phases
    assert_relative_eq!(plan.beat_at(ms_to_samples(20_000, sr)), 1.625, epsilon = 1e-9);

    let glide: Vec<f64> = (ms_to_samples(18_500, sr)..ms_to_samples(21_500, sr))
        .map(|n| plan.beat_at(n))
        .collect();
    assert!(glide.windows(2).all(|w| w[1] >= w[0] - 1e-12));
}

#[test]
fn test_synth_only_mix_carries_the_beat() {
    let sr = 8000;
    let overrides = overrides(json!({ "sample_rate": sr }));
    let schedule = two_phase_schedule();
    let result =
        create_mix(&CategoryClips::new(), "custom", 40_000, &overrides, Some(&schedule)).unwrap();

    assert_eq!(result.buffer.len(), ms_to_samples(40_000, sr));
    assert_eq!(result.synth_schedule.as_ref().map(|s| s.phases.len()), Some(2));

    let window = ms_to_samples(25_000, sr)..ms_to_samples(33_000, sr);
    let left = zero_crossing_hz(&result.buffer.samples[0][window.clone()], sr);
    let right = zero_crossing_hz(&result.buffer.samples[1][window], sr);
    assert_relative_eq!(left, 150.0, epsilon = 0.25);
    assert_relative_eq!(right - left, 3.0, epsilon = 0.3);
}

#[test]
fn test_schedule_that_does_not_fit_is_rejected() {
    let overrides = overrides(json!({ "sample_rate": 8000 }));
    let schedule = PhaseSchedule::constant(10_000, 150.0, 2.0, NoiseColor::Pink);
    let err = create_mix(&CategoryClips::new(), "custom", 60_000, &overrides, Some(&schedule))
        .unwrap_err();
    assert!(matches!(err, SomniaError::InvalidProfile { .. }));
}

// ============================================================================
// Profiles
// ============================================================================

#[test_case("sleep")]
#[test_case("focus")]
#[test_case("relax")]
#[test_case("lullaby")]
fn test_resolved_profile_is_a_fixed_point(mix_type: &str) {
    let first = resolve_profile(
        mix_type,
        &overrides(json!({
            "crossfade_ms": 2500,
            "category_weights": { "rain": 0.5 },
            "personalization": { "prefer_nature": true }
        })),
    )
    .unwrap();
    let second = resolve_profile(mix_type, &first.as_overrides()).unwrap();
    assert_eq!(first, second);
}

// ============================================================================
// Cancellation and files
// ============================================================================

#[test]
fn test_cancelled_request_returns_no_audio() {
    let sr = 8000;
    let clips = library(vec![("rain", vec![tone_clip("a", 200.0, 1.0, sr)])]);
    let request = MixRequest::new(&clips, "custom", 5_000)
        .with_overrides(overrides(json!({ "sample_rate": sr })));

    let token = CancellationToken::new();
    token.cancel();
    assert!(matches!(
        create_mix_with(&request, &token),
        Err(SomniaError::Cancelled { .. })
    ));
}

#[test]
fn test_library_to_exported_mix() {
    let sr = 8000;
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("library");
    let tones = [("rain", "soft", 250.0), ("rain", "heavy", 310.0), ("water", "brook", 180.0)];
    for (category, name, freq) in tones {
        std::fs::create_dir_all(root.join(category)).unwrap();
        let clip = generate_test_tone(freq, 1.5, sr);
        let path = root.join(category).join(format!("{}.wav", name));
        export_wav(&clip, &path, ExportFormat::float_master()).unwrap();
    }
    std::fs::create_dir_all(root.join("wind")).unwrap();

    let clips = load_category_dir(&root).unwrap();
    assert_eq!(clips.keys().collect::<Vec<_>>(), vec!["rain", "water", "wind"]);
    assert_eq!(clips["rain"].len(), 2);
    assert!(clips["wind"].is_empty());

    let overrides = overrides(json!({ "sample_rate": sr, "crossfade_ms": 300 }));
    let result = create_mix(&clips, "custom", 8_000, &overrides, None).unwrap();

    let wav = dir.path().join("mix.wav");
    let report_path = result.export(&wav, ExportFormat::float_master()).unwrap();

    let reloaded = import_clip(&wav).unwrap();
    assert_eq!(reloaded.buffer().channel_layout(), Some(ChannelLayout::Stereo));
    assert!(reloaded.buffer() == &result.buffer);

    let report_text = std::fs::read_to_string(report_path).unwrap();
    let report: serde_json::Value = serde_json::from_str(&report_text).unwrap();
    assert_eq!(report["mix_type"], "custom");
    assert_eq!(report["sample_rate"], sr);
    assert_eq!(report["layers"].as_array().map(Vec::len), Some(3));
}

#[test]
fn test_identical_requests_render_identical_mixes() {
    let sr = 8000;
    let clips = library(vec![(
        "rain",
        vec![
            tone_clip("a", 200.0, 0.8, sr),
            tone_clip("b", 260.0, 1.1, sr),
            tone_clip("c", 330.0, 0.6, sr),
        ],
    )]);
    let overrides = overrides(json!({
        "sample_rate": sr,
        "crossfade_ms": 200,
        "protocol": "anxiety_reduction"
    }));

    let a = create_mix(&clips, "custom", 6_000, &overrides, None).unwrap();
    let b = create_mix(&clips, "custom", 6_000, &overrides, None).unwrap();
    assert!(a.buffer == b.buffer);
    assert_eq!(a.layers[0].strategy, LoopStrategy::Concatenated);
    assert_eq!(a.synth_schedule.as_ref().map(PhaseSchedule::total_duration_ms), Some(6_000));
}

// ============================================================================
// Rejected requests
// ============================================================================

#[test]
fn test_negative_ratio_and_bad_fades_rejected_together() {
    let sr = 8000;
    let clips = library(vec![("rain", vec![tone_clip("a", 200.0, 1.0, sr)])]);
    let overrides = overrides(json!({
        "sample_rate": sr,
        "fade_in_ms": -1,
        "crossfade_ms": 20_000,
        "mix_ratios": { "binaural": -0.5, "noise": 0.5, "nature": 0.5 }
    }));

    match create_mix(&clips, "sleep", 10_000, &overrides, None) {
        Err(SomniaError::InvalidProfile { violations, .. }) => {
            let fields: Vec<&str> = violations.iter().map(|v| v.field.as_str()).collect();
            assert!(fields.contains(&"fade_in_ms"), "{:?}", fields);
            assert!(fields.contains(&"mix_ratios"), "{:?}", fields);
            assert!(fields.contains(&"crossfade_ms"), "{:?}", fields);
        }
        other => panic!("expected InvalidProfile, got {:?}", other.map(|r| r.buffer.len())),
    }
}

#[test]
fn test_clip_without_sample_rate_is_rejected() {
    let clips = library(vec![(
        "water",
        vec![Clip::new("broken", AudioBuffer::new(400, ChannelLayout::Mono, 0))],
    )]);
    let overrides = overrides(json!({ "sample_rate": 8000 }));
    let err = create_mix(&clips, "custom", 6_000, &overrides, None).unwrap_err();
    match err {
        SomniaError::InvalidAudio { reason, .. } => {
            assert!(reason.contains("broken") && reason.contains("water"), "{}", reason);
        }
        other => panic!("expected InvalidAudio, got {:?}", other),
    }
}
