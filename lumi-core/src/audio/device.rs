//! Audio device enumeration and selection.

use serde::{Deserialize, Serialize};

#[cfg(feature = "audio-cpal")]
use crate::error::{LumiError, Result};

/// Which side of the audio subsystem a device belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceDirection {
    Input,
    Output,
}

/// Metadata about an audio device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Human-readable device name reported by the OS.
    pub name: String,
    pub direction: DeviceDirection,
    /// Whether this is the system default for its direction.
    pub is_default: bool,
    /// Native rate of the device's default config, if it could be queried.
    pub default_sample_rate: Option<u32>,
    pub channels: Option<u16>,
}

/// Sort defaults first, then by case-insensitive name.
pub fn sort_devices(list: &mut [DeviceInfo]) {
    list.sort_by_key(|d| {
        (
            d.direction != DeviceDirection::Input,
            !d.is_default,
            d.name.to_ascii_lowercase(),
        )
    });
}

/// List input and output devices on the default host.
///
/// Returns an empty `Vec` if cpal is not available or no devices exist.
#[cfg(feature = "audio-cpal")]
pub fn list_devices() -> Vec<DeviceInfo> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let default_in = host.default_input_device().and_then(|d| d.name().ok());
    let default_out = host.default_output_device().and_then(|d| d.name().ok());

    let mut list = Vec::new();

    match host.input_devices() {
        Ok(devices) => {
            for (idx, device) in devices.enumerate() {
                let name = device
                    .name()
                    .unwrap_or_else(|_| format!("Input Device {}", idx + 1));
                let config = device.default_input_config().ok();
                list.push(DeviceInfo {
                    is_default: default_in.as_deref() == Some(name.as_str()),
                    name,
                    direction: DeviceDirection::Input,
                    default_sample_rate: config.as_ref().map(|c| c.sample_rate().0),
                    channels: config.as_ref().map(|c| c.channels()),
                });
            }
        }
        Err(e) => tracing::warn!("failed to enumerate input devices: {e}"),
    }

    match host.output_devices() {
        Ok(devices) => {
            for (idx, device) in devices.enumerate() {
                let name = device
                    .name()
                    .unwrap_or_else(|_| format!("Output Device {}", idx + 1));
                let config = device.default_output_config().ok();
                list.push(DeviceInfo {
                    is_default: default_out.as_deref() == Some(name.as_str()),
                    name,
                    direction: DeviceDirection::Output,
                    default_sample_rate: config.as_ref().map(|c| c.sample_rate().0),
                    channels: config.as_ref().map(|c| c.channels()),
                });
            }
        }
        Err(e) => tracing::warn!("failed to enumerate output devices: {e}"),
    }

    sort_devices(&mut list);
    list
}

#[cfg(not(feature = "audio-cpal"))]
pub fn list_devices() -> Vec<DeviceInfo> {
    vec![]
}

/// Resolve a device by preferred name, otherwise fall back to the host
/// default and then the first available device.
#[cfg(feature = "audio-cpal")]
pub(crate) fn select_device(
    host: &cpal::Host,
    direction: DeviceDirection,
    preferred_name: Option<&str>,
) -> Result<cpal::Device> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let enumerate = || -> std::result::Result<Vec<cpal::Device>, cpal::DevicesError> {
        Ok(match direction {
            DeviceDirection::Input => host.input_devices()?.collect(),
            DeviceDirection::Output => host.output_devices()?.collect(),
        })
    };

    if let Some(preferred) = preferred_name {
        match enumerate() {
            Ok(devices) => {
                let found = devices
                    .into_iter()
                    .find(|d| d.name().map(|n| n == preferred).unwrap_or(false));
                if let Some(device) = found {
                    return Ok(device);
                }
                tracing::warn!(?direction, "preferred device '{preferred}' not found, falling back");
            }
            Err(e) => {
                tracing::warn!(
                    ?direction,
                    "failed to list devices while resolving preference: {e}"
                );
            }
        }
    }

    let default = match direction {
        DeviceDirection::Input => host.default_input_device(),
        DeviceDirection::Output => host.default_output_device(),
    };
    if let Some(device) = default {
        return Ok(device);
    }

    let devices = enumerate().map_err(|e| LumiError::AudioDevice(e.to_string()))?;
    let fallback = devices.into_iter().next().ok_or(match direction {
        DeviceDirection::Input => LumiError::NoDefaultInputDevice,
        DeviceDirection::Output => LumiError::NoDefaultOutputDevice,
    })?;
    tracing::warn!(?direction, "no default device, falling back to first available");
    Ok(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str, direction: DeviceDirection, is_default: bool) -> DeviceInfo {
        DeviceInfo {
            name: name.into(),
            direction,
            is_default,
            default_sample_rate: Some(48_000),
            channels: Some(1),
        }
    }

    #[test]
    fn defaults_sort_first_within_direction() {
        let mut list = vec![
            info("Speakers", DeviceDirection::Output, true),
            info("b-mic", DeviceDirection::Input, false),
            info("USB Mic", DeviceDirection::Input, true),
            info("A-mic", DeviceDirection::Input, false),
        ];
        sort_devices(&mut list);
        let names: Vec<_> = list.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["USB Mic", "A-mic", "b-mic", "Speakers"]);
    }

    #[test]
    fn device_info_serializes_camel_case() {
        let json = serde_json::to_value(info("Mic", DeviceDirection::Input, true)).unwrap();
        assert_eq!(json["direction"], "input");
        assert_eq!(json["isDefault"], true);
        assert_eq!(json["defaultSampleRate"], 48_000);
    }
}
