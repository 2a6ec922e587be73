//! CLI Command Implementations
//!
//! Thin adapters: load clips, build overrides, call the engine, write files.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context};
use log::info;
use serde_json::{Map, Value};

use super::ProfileArgs;
use crate::engine::io::{load_category_dir, ExportFormat};
use crate::mix::{create_mix_with, create_preview, MixRequest, MixResult};
use crate::profile::{resolve_profile, ProfileOverrides};
use crate::synth::{PhaseSchedule, Protocol};
use crate::CancellationToken;

/// Render a full mix to `output`.
pub fn mix(
    input: &Path,
    output: &Path,
    minutes: f64,
    bit_depth: u16,
    args: &ProfileArgs,
) -> anyhow::Result<()> {
    let target_ms = minutes_to_ms(minutes)?;
    let library = load_category_dir(input)
        .with_context(|| format!("loading clip library from {}", input.display()))?;
    let overrides = build_overrides(args)?;

    let mut request =
        MixRequest::new(&library, args.mix_type.clone(), target_ms).with_overrides(overrides);
    if let Some(path) = &args.schedule {
        request = request.with_synth_schedule(load_schedule(path)?);
    }

    let result = create_mix_with(&request, &CancellationToken::new())?;
    write_result(&result, output, bit_depth)
}

/// Render a preview to `output`.
pub fn preview(
    input: &Path,
    output: &Path,
    seconds: u64,
    args: &ProfileArgs,
) -> anyhow::Result<()> {
    let library = load_category_dir(input)
        .with_context(|| format!("loading clip library from {}", input.display()))?;
    let overrides = build_overrides(args)?;
    let preview_ms = seconds * 1000;

    let mut request =
        MixRequest::new(&library, args.mix_type.clone(), preview_ms).with_overrides(overrides);
    if let Some(path) = &args.schedule {
        request = request.with_synth_schedule(load_schedule(path)?);
    }

    let result = create_preview(&request, preview_ms)?;
    write_result(&result, output, 16)
}

/// Print the resolved profile.
pub fn profile(args: &ProfileArgs) -> anyhow::Result<()> {
    let overrides = build_overrides(args)?;
    let profile = resolve_profile(&args.mix_type, &overrides)?;
    println!("{}", serde_json::to_string_pretty(&profile)?);
    Ok(())
}

/// Print a protocol schedule.
pub fn protocol(name: &str, minutes: f64) -> anyhow::Result<()> {
    let protocol = parse_protocol(name)?;
    let schedule = protocol.schedule(minutes_to_ms(minutes)?);
    println!("{}", serde_json::to_string_pretty(&schedule)?);
    Ok(())
}

fn write_result(result: &MixResult, output: &Path, bit_depth: u16) -> anyhow::Result<()> {
    let format = ExportFormat::new(None, bit_depth);
    let report = result
        .export(output, format)
        .with_context(|| format!("exporting mix to {}", output.display()))?;

    println!("Mix written: {}", output.display());
    println!("Report:      {}", report.display());
    println!("Duration:    {:.1}s", result.actual_duration_ms / 1000.0);
    for layer in &result.layers {
        println!(
            "  {:<14} {:>2} clip(s)  {:?}  peak {:.1} dBFS",
            layer.category, layer.clip_count, layer.strategy, layer.peak_db
        );
    }
    if let Some(reduction) = result.master.limiter_reduction_db {
        println!("Limiter:     {:.1} dB", reduction);
    }
    Ok(())
}

fn minutes_to_ms(minutes: f64) -> anyhow::Result<u64> {
    if !(minutes.is_finite() && minutes > 0.0) {
        bail!("duration must be a positive number of minutes, got {}", minutes);
    }
    Ok((minutes * 60_000.0).round() as u64)
}

fn parse_protocol(name: &str) -> anyhow::Result<Protocol> {
    Protocol::from_name(name).ok_or_else(|| {
        anyhow!(
            "unknown protocol '{}' (expected optimized_sleep or anxiety_reduction)",
            name
        )
    })
}

fn load_schedule(path: &Path) -> anyhow::Result<PhaseSchedule> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing schedule {}", path.display()))
}

/// Merge the overrides file, `--protocol` and every `--set` into one override set
pub fn build_overrides(args: &ProfileArgs) -> anyhow::Result<ProfileOverrides> {
    let mut root: Value = match &args.overrides {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing overrides {}", path.display()))?
        }
        None => Value::Object(Map::new()),
    };

    if let Some(name) = &args.protocol {
        let protocol = parse_protocol(name)?;
        apply_assignment(&mut root, &format!("protocol={}", protocol.name()))?;
    }
    for assignment in &args.set {
        apply_assignment(&mut root, assignment)?;
    }

    info!("Profile overrides: {}", root);
    ProfileOverrides::from_json(root).context("invalid profile overrides")
}

/// Apply `key.path=value` to a JSON object
///
/// The value is parsed as JSON when possible (`0.5`, `null`, `{"kind": ...}`)
/// and taken as a plain string otherwise.
pub fn apply_assignment(root: &mut Value, assignment: &str) -> anyhow::Result<()> {
    let (key, raw) = assignment
        .split_once('=')
        .ok_or_else(|| anyhow!("expected KEY=VALUE, got '{}'", assignment))?;
    if key.is_empty() {
        bail!("empty key in '{}'", assignment);
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));

    let mut segments: Vec<&str> = key.split('.').collect();
    let last = segments.pop().unwrap_or(key);
    let mut node = root;
    for segment in segments {
        let object = node
            .as_object_mut()
            .ok_or_else(|| anyhow!("'{}' does not name a table", key))?;
        node = object
            .entry(segment)
            .or_insert_with(|| Value::Object(Map::new()));
    }
    node.as_object_mut()
        .ok_or_else(|| anyhow!("'{}' does not name a table", key))?
        .insert(last.to_string(), value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn args(set: &[&str]) -> ProfileArgs {
        ProfileArgs {
            mix_type: "sleep".into(),
            overrides: None,
            set: set.iter().map(|s| s.to_string()).collect(),
            protocol: None,
            schedule: None,
        }
    }

    #[test]
    fn test_apply_assignment_nested() {
        let mut root = json!({});
        apply_assignment(&mut root, "category_weights.rain=0.5").unwrap();
        apply_assignment(&mut root, "category_weights.thunder=1.5").unwrap();
        apply_assignment(&mut root, "filter=null").unwrap();
        apply_assignment(&mut root, "volume_curve=gentle_wave").unwrap();
        assert_eq!(
            root,
            json!({
                "category_weights": { "rain": 0.5, "thunder": 1.5 },
                "filter": null,
                "volume_curve": "gentle_wave"
            })
        );
    }

    #[test]
    fn test_apply_assignment_rejects_malformed() {
        let mut root = json!({ "fade_in_ms": 10 });
        assert!(apply_assignment(&mut root, "no_equals_sign").is_err());
        assert!(apply_assignment(&mut root, "=3").is_err());
        assert!(apply_assignment(&mut root, "fade_in_ms.inner=3").is_err());
    }

    #[test]
    fn test_build_overrides_from_flags() {
        let mut profile_args = args(&["crossfade_ms=2500", "emphasis=null"]);
        profile_args.protocol = Some("anxiety_reduction".into());
        let overrides = build_overrides(&profile_args).unwrap();
        assert_eq!(overrides.crossfade_ms, Some(2500));
        assert_eq!(overrides.emphasis, Some(None));
        assert_eq!(overrides.protocol, Some(Some(Protocol::AnxietyReduction)));
    }

    #[test]
    fn test_unknown_protocol() {
        assert!(parse_protocol("deep_focus").is_err());
    }

    #[test]
    fn test_minutes_to_ms() {
        assert_eq!(minutes_to_ms(1.5).unwrap(), 90_000);
        assert!(minutes_to_ms(0.0).is_err());
    }
}
