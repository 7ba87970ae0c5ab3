//! Input device enumeration for `--list-devices` and device pickers.

use serde::{Deserialize, Serialize};

/// Metadata about an audio input device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Human-readable device name reported by the OS.
    pub name: String,
    /// Whether this is the system default input device.
    pub is_default: bool,
    /// Whether any supported input config covers the requested sample rate.
    pub supports_rate: bool,
    /// Largest channel count among the supported input configs.
    pub max_channels: u16,
}

/// Default device first, then devices that can run at the requested rate,
/// then by case-insensitive name.
pub fn sort_devices(devices: &mut [DeviceInfo]) {
    devices.sort_by_key(|d| (!d.is_default, !d.supports_rate, d.name.to_ascii_lowercase()));
}

/// List all available audio input devices on the system.
///
/// Returns an empty `Vec` if cpal is not available or no devices exist.
#[cfg(feature = "audio-cpal")]
pub fn list_input_devices(sample_rate: u32) -> Vec<DeviceInfo> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let devices = match host.input_devices() {
        Ok(devices) => devices,
        Err(e) => {
            tracing::warn!("Failed to enumerate input devices: {e}");
            return Vec::new();
        }
    };

    let mut list = devices
        .enumerate()
        .map(|(idx, device)| {
            let name = device
                .name()
                .unwrap_or_else(|_| format!("Input Device {}", idx + 1));
            let is_default = default_name.as_deref() == Some(name.as_str());
            let (supports_rate, max_channels) = match device.supported_input_configs() {
                Ok(ranges) => ranges.fold((false, 0u16), |(ok, ch), r| {
                    let covers = r.min_sample_rate().0 <= sample_rate
                        && sample_rate <= r.max_sample_rate().0;
                    (ok || covers, ch.max(r.channels()))
                }),
                Err(_) => (false, 0),
            };
            DeviceInfo {
                name,
                is_default,
                supports_rate,
                max_channels,
            }
        })
        .collect::<Vec<_>>();

    sort_devices(&mut list);
    list
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
pub fn list_input_devices(_sample_rate: u32) -> Vec<DeviceInfo> {
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev(name: &str, is_default: bool, supports_rate: bool) -> DeviceInfo {
        DeviceInfo {
            name: name.into(),
            is_default,
            supports_rate,
            max_channels: 2,
        }
    }

    #[test]
    fn default_device_sorts_first() {
        let mut list = vec![
            dev("alpha", false, true),
            dev("Zoom H1", true, false),
            dev("Beta", false, false),
            dev("gamma", false, true),
        ];
        sort_devices(&mut list);
        let names: Vec<_> = list.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Zoom H1", "alpha", "gamma", "Beta"]);
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_string(&dev("mic", true, true)).expect("serialize");
        assert!(json.contains("\"isDefault\":true"));
        assert!(json.contains("\"maxChannels\":2"));
    }
}
