//! Output device discovery and selection.
//!
//! Thin wrappers around CPAL for:
//! - listing available output devices
//! - selecting either the default device or a device by substring match
//! - finding a stream config with the exact rate and channel count of a stream

use cpal::traits::{DeviceTrait, HostTrait};

use crate::output::OutputError;

/// Pick the first output device whose name contains `needle` (case-insensitive),
/// or the host default device when `needle` is `None`.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device, OutputError> {
    if let Some(needle) = needle {
        let mut devices = host
            .output_devices()
            .map_err(|e| OutputError::NoDevices(e.to_string()))?;
        return devices
            .find(|d| {
                d.description()
                    .ok()
                    .map(|n| matches_device_name(&n.name(), needle))
                    .unwrap_or(false)
            })
            .ok_or_else(|| OutputError::DeviceNotFound(needle.to_string()));
    }

    host.default_output_device()
        .ok_or(OutputError::NoDefaultDevice)
}

/// Find a supported config playing `channels` channels at exactly `sample_rate`.
///
/// Among matching ranges the sample format is chosen by [`sample_format_rank`].
pub fn pick_output_config(
    device: &cpal::Device,
    sample_rate: u32,
    channels: u16,
) -> Result<cpal::SupportedStreamConfig, OutputError> {
    let ranges = device
        .supported_output_configs()
        .map_err(|e| OutputError::Other(e.to_string()))?;

    let mut best: Option<(u8, cpal::SupportedStreamConfigRange)> = None;
    for range in ranges {
        if !range_supports(
            range.channels(),
            range.min_sample_rate(),
            range.max_sample_rate(),
            channels,
            sample_rate,
        ) {
            continue;
        }
        let rank = sample_format_rank(range.sample_format());
        if best.as_ref().is_none_or(|(best_rank, _)| rank < *best_rank) {
            best = Some((rank, range));
        }
    }

    best.map(|(_, range)| range.with_sample_rate(sample_rate))
        .ok_or(OutputError::UnsupportedConfig {
            sample_rate,
            channels,
        })
}

/// Names of the available output devices, in host order.
pub fn list_devices(host: &cpal::Host) -> Result<Vec<String>, OutputError> {
    let devices = host
        .output_devices()
        .map_err(|e| OutputError::NoDevices(e.to_string()))?;
    Ok(devices
        .filter_map(|d| d.description().ok().map(|n| n.to_string()))
        .collect())
}

fn range_supports(
    range_channels: u16,
    min_rate: u32,
    max_rate: u32,
    channels: u16,
    sample_rate: u32,
) -> bool {
    range_channels == channels && (min_rate..=max_rate).contains(&sample_rate)
}

/// Lower is better. Float output avoids a second quantization step.
fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}
