use thiserror::Error;

/// Synchronization tuning shared by the drop policy and the sync loop.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Lateness window in seconds. Chunks later than half of it become
    /// candidates for probabilistic dropping.
    pub tolerance_secs: f64,
    /// Estimated delay between handing audio to the output and hearing it.
    pub sink_latency_secs: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tolerance_secs: 0.05,
            sink_latency_secs: 0.0,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("tolerance must be a positive number of seconds, got {0}")]
    Tolerance(f64),
    #[error("sink latency must be a non-negative number of seconds, got {0}")]
    SinkLatency(f64),
}

impl SyncConfig {
    /// Reject values the timing math cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.tolerance_secs.is_finite() || self.tolerance_secs <= 0.0 {
            return Err(ConfigError::Tolerance(self.tolerance_secs));
        }
        if !self.sink_latency_secs.is_finite() || self.sink_latency_secs < 0.0 {
            return Err(ConfigError::SinkLatency(self.sink_latency_secs));
        }
        Ok(())
    }
}

/// Output device selection for the cpal backend.
#[derive(Clone, Debug, Default)]
pub struct OutputConfig {
    /// Case-insensitive substring of the device name; `None` picks the default device.
    pub device: Option<String>,
    /// Output ring capacity in frames. Never smaller than one chunk.
    pub buffer_frames: Option<u32>,
}

impl OutputConfig {
    pub fn new(device: Option<String>, buffer_frames: Option<u32>) -> Self {
        Self {
            device: normalize_device_name(device),
            buffer_frames,
        }
    }
}

fn normalize_device_name(device: Option<String>) -> Option<String> {
    device.and_then(|name| {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(SyncConfig::default().validate(), Ok(()));
    }

    #[test]
    fn validate_rejects_zero_and_nan_tolerance() {
        let cfg = SyncConfig {
            tolerance_secs: 0.0,
            ..Default::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::Tolerance(0.0)));

        let cfg = SyncConfig {
            tolerance_secs: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Tolerance(_))));
    }

    #[test]
    fn validate_rejects_negative_sink_latency() {
        let cfg = SyncConfig {
            sink_latency_secs: -0.1,
            ..Default::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::SinkLatency(-0.1)));
    }

    #[test]
    fn output_config_trims_and_drops_empty_device() {
        assert_eq!(OutputConfig::new(None, None).device, None);
        assert_eq!(OutputConfig::new(Some("  ".to_string()), None).device, None);
        assert_eq!(
            OutputConfig::new(Some("  USB  DAC ".to_string()), Some(2048)).device,
            Some("USB  DAC".to_string())
        );
    }
}
