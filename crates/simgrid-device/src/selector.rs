//! Device selection strategies.

use crate::error::{DeviceError, DeviceResult};
use crate::monitor::DeviceReading;

/// Picks one device out of a snapshot.
pub trait DeviceSelector: Send + Sync {
    fn select(&self, readings: &[DeviceReading]) -> DeviceResult<DeviceReading>;

    fn name(&self) -> &'static str;
}

/// Greedy: the device with the most free memory. Ties go to the lowest index.
#[derive(Debug, Clone, Copy, Default)]
pub struct MostFree;

impl DeviceSelector for MostFree {
    fn select(&self, readings: &[DeviceReading]) -> DeviceResult<DeviceReading> {
        readings
            .iter()
            .copied()
            .reduce(|best, r| if r.free_mib > best.free_mib { r } else { best })
            .ok_or(DeviceError::NoDevices)
    }

    fn name(&self) -> &'static str {
        "most_free"
    }
}

/// Always the given device, for jobs that must not move.
#[derive(Debug, Clone, Copy)]
pub struct Pinned(pub usize);

impl DeviceSelector for Pinned {
    fn select(&self, readings: &[DeviceReading]) -> DeviceResult<DeviceReading> {
        readings
            .iter()
            .copied()
            .find(|r| r.index == self.0)
            .ok_or(DeviceError::UnknownDevice(self.0))
    }

    fn name(&self) -> &'static str {
        "pinned"
    }
}
