//! simgrid-device: compute-device free-memory monitoring.
//!
//! The admission controller asks the [`DeviceMonitor`] for a fresh reading
//! before every launch and on every tick of a headroom wait. Readings are
//! never cached.
//!
//! # Architecture
//!
//! ```text
//! DeviceMonitor
//!   ├── MemorySource (free MiB per device)
//!   │   └── SmiSource → `nvidia-smi --query-gpu=memory.free --format=csv`
//!   └── DeviceSelector (which device wins)
//!       ├── MostFree (default)
//!       └── Pinned
//! ```

pub mod error;
pub mod monitor;
pub mod selector;

pub use error::{DeviceError, DeviceResult};
pub use monitor::{DeviceMonitor, DeviceReading, MemorySource, SmiSource, parse_free_memory};
pub use selector::{DeviceSelector, MostFree, Pinned};
