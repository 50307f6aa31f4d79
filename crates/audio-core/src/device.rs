//! Device descriptions and the backend seam.

use std::sync::Arc;

use parking_lot::Mutex;

/// Audio device direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioDirection {
    /// Audio input (microphone)
    Input,
    /// Audio output (speaker)
    Output,
}

/// A host audio device, referenced by id.
///
/// Not owned by any session; the directory looks devices up live so a
/// hot-swap does not invalidate references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDeviceRef {
    /// Stable device identifier
    pub id: String,
    /// Human-readable display name
    pub name: String,
}

impl AudioDeviceRef {
    /// Create a new device reference
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Platform seam for device enumeration.
///
/// Listing order is the host-reported priority and is not guaranteed
/// stable across calls when hardware changes.
pub trait AudioDeviceBackend: Send + Sync {
    /// Enumerate input devices in host priority order
    fn input_devices(&self) -> Vec<AudioDeviceRef>;

    /// Enumerate output devices in host priority order
    fn output_devices(&self) -> Vec<AudioDeviceRef>;
}

/// In-memory backend for tests and headless environments.
#[derive(Default)]
pub struct MockBackend {
    inputs: Mutex<Vec<AudioDeviceRef>>,
    outputs: Mutex<Vec<AudioDeviceRef>>,
}

impl MockBackend {
    /// Create an empty backend
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a backend with one input and one output device
    pub fn with_defaults() -> Arc<Self> {
        let backend = Self::default();
        backend.plug(
            AudioDirection::Input,
            AudioDeviceRef::new("mock-mic-0", "Mock Microphone"),
        );
        backend.plug(
            AudioDirection::Output,
            AudioDeviceRef::new("mock-speaker-0", "Mock Speaker"),
        );
        Arc::new(backend)
    }

    /// Simulate plugging a device in
    pub fn plug(&self, direction: AudioDirection, device: AudioDeviceRef) {
        match direction {
            AudioDirection::Input => self.inputs.lock().push(device),
            AudioDirection::Output => self.outputs.lock().push(device),
        }
    }

    /// Simulate unplugging a device
    pub fn unplug(&self, direction: AudioDirection, id: &str) {
        let devices = match direction {
            AudioDirection::Input => &self.inputs,
            AudioDirection::Output => &self.outputs,
        };
        devices.lock().retain(|d| d.id != id);
    }
}

impl AudioDeviceBackend for MockBackend {
    fn input_devices(&self) -> Vec<AudioDeviceRef> {
        self.inputs.lock().clone()
    }

    fn output_devices(&self) -> Vec<AudioDeviceRef> {
        self.outputs.lock().clone()
    }
}

#[cfg(feature = "device-cpal")]
pub mod cpal_backend {
    //! Backend over the host's real audio stack.

    use cpal::traits::{DeviceTrait, HostTrait};

    use super::{AudioDeviceBackend, AudioDeviceRef};

    /// Device backend backed by cpal's default host.
    pub struct CpalBackend {
        host: cpal::Host,
    }

    impl CpalBackend {
        /// Create a backend over the default host
        pub fn new() -> Self {
            Self {
                host: cpal::default_host(),
            }
        }

        fn collect<I>(devices: Option<I>, default_name: Option<String>) -> Vec<AudioDeviceRef>
        where
            I: Iterator<Item = cpal::Device>,
        {
            let mut refs: Vec<AudioDeviceRef> = devices
                .into_iter()
                .flatten()
                .filter_map(|device| device.name().ok())
                .map(|name| AudioDeviceRef::new(name.clone(), name))
                .collect();

            // Host priority: the default device leads the list.
            if let Some(default_name) = default_name {
                if let Some(pos) = refs.iter().position(|d| d.id == default_name) {
                    let default_ref = refs.remove(pos);
                    refs.insert(0, default_ref);
                }
            }
            refs
        }
    }

    impl Default for CpalBackend {
        fn default() -> Self {
            Self::new()
        }
    }

    impl AudioDeviceBackend for CpalBackend {
        fn input_devices(&self) -> Vec<AudioDeviceRef> {
            let default_name = self
                .host
                .default_input_device()
                .and_then(|d| d.name().ok());
            Self::collect(self.host.input_devices().ok(), default_name)
        }

        fn output_devices(&self) -> Vec<AudioDeviceRef> {
            let default_name = self
                .host
                .default_output_device()
                .and_then(|d| d.name().ok());
            Self::collect(self.host.output_devices().ok(), default_name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_backend_tracks_hot_plug() {
        let backend = MockBackend::with_defaults();
        assert_eq!(backend.input_devices().len(), 1);

        backend.plug(
            AudioDirection::Input,
            AudioDeviceRef::new("usb-mic", "USB Microphone"),
        );
        assert_eq!(backend.input_devices().len(), 2);

        backend.unplug(AudioDirection::Input, "mock-mic-0");
        let inputs = backend.input_devices();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].id, "usb-mic");
    }
}
