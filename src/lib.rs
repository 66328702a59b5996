mod client;
mod config;
mod device;
mod error;
mod framer;
mod protocol;
mod sync;
mod watcher;

pub use client::AdbClient;
pub use config::ServerConfig;
pub use device::{Device, DeviceDescriptor, DeviceInfo, DeviceState};
pub use error::{AdbError, AdbResult};
pub use protocol::{HostCommand, LocalCommand};
pub use sync::{DentEntry, StatResponse, SyncHeader, SyncId, SyncSession, SYNC_DATA_MAX};
pub use watcher::{DeviceEvent, DeviceWatcher};
