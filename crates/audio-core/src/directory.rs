//! The audio device directory service.
//!
//! One directory per process. Selection changes and hot-plug refreshes are
//! announced on a watch channel so observers (call screens, the media
//! pipeline) can re-read state without polling.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::device::{AudioDeviceBackend, AudioDeviceRef, AudioDirection};

/// The currently selected devices, published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceSelection {
    /// Selected input device id, if any input exists
    pub input: Option<String>,
    /// Selected output device id, if any output exists
    pub output: Option<String>,
}

struct DirectoryState {
    selection: DeviceSelection,
}

/// Process-wide directory of host audio devices.
pub struct AudioDeviceDirectory {
    backend: Arc<dyn AudioDeviceBackend>,
    state: Mutex<DirectoryState>,
    notify_tx: watch::Sender<DeviceSelection>,
}

impl AudioDeviceDirectory {
    /// Create a directory over a backend and select the host defaults.
    pub fn new(backend: Arc<dyn AudioDeviceBackend>) -> Self {
        let selection = DeviceSelection {
            input: backend.input_devices().first().map(|d| d.id.clone()),
            output: backend.output_devices().first().map(|d| d.id.clone()),
        };
        debug!("audio directory initialized: {:?}", selection);

        let (notify_tx, _) = watch::channel(selection.clone());
        Self {
            backend,
            state: Mutex::new(DirectoryState { selection }),
            notify_tx,
        }
    }

    /// Input devices in host priority order.
    pub fn list_input_devices(&self) -> Vec<AudioDeviceRef> {
        self.backend.input_devices()
    }

    /// Output devices in host priority order.
    pub fn list_output_devices(&self) -> Vec<AudioDeviceRef> {
        self.backend.output_devices()
    }

    /// Currently selected input device id.
    pub fn current_input_device_id(&self) -> Option<String> {
        self.state.lock().selection.input.clone()
    }

    /// Currently selected output device id.
    pub fn current_output_device_id(&self) -> Option<String> {
        self.state.lock().selection.output.clone()
    }

    /// Select an input device by id.
    ///
    /// If `id` no longer exists (device unplugged between listing and
    /// selection) the previous selection stays, and a state-change
    /// notification is raised either way.
    pub fn set_current_input_device_id(&self, id: &str) {
        self.set_current(AudioDirection::Input, id);
    }

    /// Select an output device by id; same fallback rules as input.
    pub fn set_current_output_device_id(&self, id: &str) {
        self.set_current(AudioDirection::Output, id);
    }

    /// Subscribe to selection changes. The receiver also wakes on refresh
    /// and on rejected selections.
    pub fn subscribe(&self) -> watch::Receiver<DeviceSelection> {
        self.notify_tx.subscribe()
    }

    /// Re-enumerate after a hot-plug notification. A selected device that
    /// disappeared falls back to the first available one.
    pub fn refresh(&self) {
        let selection = {
            let mut state = self.state.lock();
            state.selection.input =
                Self::revalidate(&self.backend.input_devices(), state.selection.input.take());
            state.selection.output =
                Self::revalidate(&self.backend.output_devices(), state.selection.output.take());
            state.selection.clone()
        };
        debug!("audio directory refreshed: {:?}", selection);
        let _ = self.notify_tx.send(selection);
    }

    fn revalidate(devices: &[AudioDeviceRef], current: Option<String>) -> Option<String> {
        match current {
            Some(id) if devices.iter().any(|d| d.id == id) => Some(id),
            _ => devices.first().map(|d| d.id.clone()),
        }
    }

    fn set_current(&self, direction: AudioDirection, id: &str) {
        let devices = match direction {
            AudioDirection::Input => self.backend.input_devices(),
            AudioDirection::Output => self.backend.output_devices(),
        };

        let selection = {
            let mut state = self.state.lock();
            if devices.iter().any(|d| d.id == id) {
                match direction {
                    AudioDirection::Input => state.selection.input = Some(id.to_string()),
                    AudioDirection::Output => state.selection.output = Some(id.to_string()),
                }
            } else {
                // Device vanished between listing and selection; keep the
                // previous one.
                warn!("ignoring selection of unknown {:?} device {}", direction, id);
            }
            state.selection.clone()
        };
        let _ = self.notify_tx.send(selection);
    }
}
