//! Capture device discovery.
//!
//! Thin wrappers around CPAL for listing input devices and reading the
//! format a device is currently configured for.

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};
use dsp_config::SampleFormat;

/// Print available capture devices to stdout.
///
/// This is intended for CLI UX (`--list-devices`) rather than structured output.
pub fn list_devices(host: &cpal::Host) -> Result<()> {
    let default_name = host
        .default_input_device()
        .and_then(|d| d.description().ok().map(|desc| desc.name().to_string()));
    let devices = host.input_devices().context("No input devices")?;
    for (i, d) in devices.enumerate() {
        let name = d.description()?.name().to_string();
        let marker = if default_name.as_deref() == Some(name.as_str()) {
            " (default)"
        } else {
            ""
        };
        println!("#{i}: {name}{marker}");
    }
    Ok(())
}

/// Pick the first capture device whose name contains `needle` (case-insensitive).
pub fn pick_input_device(host: &cpal::Host, needle: &str) -> Result<cpal::Device> {
    let mut devices = host.input_devices().context("No input devices")?;
    devices
        .find(|d| {
            d.description()
                .ok()
                .map(|desc| matches_device_name(&desc.name(), needle))
                .unwrap_or(false)
        })
        .ok_or_else(|| anyhow!("No input device matched: {needle}"))
}

/// Map a CPAL sample format to the DSP engine's capture format.
pub fn sample_format_from_cpal(format: cpal::SampleFormat) -> Option<SampleFormat> {
    match format {
        cpal::SampleFormat::I16 => Some(SampleFormat::S16Le),
        cpal::SampleFormat::I32 => Some(SampleFormat::S32Le),
        cpal::SampleFormat::F32 => Some(SampleFormat::Float32Le),
        cpal::SampleFormat::F64 => Some(SampleFormat::Float64Le),
        _ => None,
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}
