//! Host audio device handling for peercall.
//!
//! The device directory is a process-wide service with an explicit
//! lifecycle: initialized at application start, refreshed on device
//! hot-plug notifications, and injected into call sessions. Sessions refer
//! to devices by id only, so a hot-swap never requires session mutation.

// Error handling
pub mod error;

// Device descriptions and backend seam
pub mod device;

// The device directory service
pub mod directory;

// Public exports
pub use device::{AudioDeviceBackend, AudioDeviceRef, AudioDirection, MockBackend};
pub use directory::{AudioDeviceDirectory, DeviceSelection};
pub use error::{AudioError, Result};

#[cfg(feature = "device-cpal")]
pub use device::cpal_backend::CpalBackend;
