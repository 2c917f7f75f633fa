//! Audio input device enumeration.

use cpal::traits::{DeviceTrait, HostTrait};

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct InputDeviceInfo {
    pub name: String,
    pub is_default: bool,
}

/// List the available audio input devices on the system.
///
/// # Errors
/// Returns an error if no input devices are found.
pub fn list_input_devices() -> Result<Vec<InputDeviceInfo>> {
    let host = cpal::default_host();
    let default_name = host
        .default_input_device()
        .and_then(|d| d.name().ok());

    let mut devices = Vec::new();
    let iter = host
        .input_devices()
        .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;
    for device in iter {
        if let Ok(name) = device.name() {
            devices.push(InputDeviceInfo {
                is_default: default_name.as_ref() == Some(&name),
                name,
            });
        }
    }

    if devices.is_empty() {
        return Err(Error::DeviceUnavailable(
            "no audio input devices found".into(),
        ));
    }
    Ok(devices)
}
