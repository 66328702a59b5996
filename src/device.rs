use std::fmt;
use std::path::Path;

use crate::client::AdbClient;
use crate::error::{AdbError, AdbResult};
use crate::protocol::HostCommand;
use crate::sync::{DentEntry, StatResponse};

/// State of a connected ADB device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceState {
    /// Fully operational device.
    Device,
    /// Device is offline.
    Offline,
    /// Device requires USB debugging authorization.
    Unauthorized,
    /// Device is in the process of being authorized.
    Authorizing,
    /// Insufficient permissions to communicate with device.
    NoPermissions,
    /// Synthetic state the device watcher assigns to a serial it has no
    /// prior snapshot of, or that disappeared from the latest snapshot.
    /// Never sent by the server itself.
    Disconnected,
    /// Unknown state from the ADB server.
    Unknown(String),
}

impl DeviceState {
    pub fn parse(s: &str) -> Self {
        match s {
            "device" => DeviceState::Device,
            "offline" => DeviceState::Offline,
            "unauthorized" => DeviceState::Unauthorized,
            "authorizing" => DeviceState::Authorizing,
            "no permissions" => DeviceState::NoPermissions,
            other => DeviceState::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceState::Device => write!(f, "device"),
            DeviceState::Offline => write!(f, "offline"),
            DeviceState::Unauthorized => write!(f, "unauthorized"),
            DeviceState::Authorizing => write!(f, "authorizing"),
            DeviceState::NoPermissions => write!(f, "no permissions"),
            DeviceState::Disconnected => write!(f, "disconnected"),
            DeviceState::Unknown(s) => write!(f, "{}", s),
        }
    }
}

/// Information about a connected Android device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Device serial number (e.g., "emulator-5554", "R5CT200XXXX").
    pub serial: String,
    /// Current device state.
    pub state: DeviceState,
    /// USB/local transport path, only present in `devices-l` output.
    pub devpath: Option<String>,
    /// Product name, only present in `devices-l` output when reported.
    pub product: Option<String>,
    /// Model name, only present in `devices-l` output when reported.
    pub model: Option<String>,
    /// Device codename, only present in `devices-l` output when reported.
    pub device: Option<String>,
    /// Numeric transport id, only present in `devices-l` output when reported.
    pub transport_id: Option<String>,
}

impl DeviceInfo {
    fn bare(serial: String, state: DeviceState) -> Self {
        Self {
            serial,
            state,
            devpath: None,
            product: None,
            model: None,
            device: None,
            transport_id: None,
        }
    }

    /// Parse the `serial\tstate\n` format returned by `host:devices`.
    ///
    /// Example input: `"emulator-5554\tdevice\nR5CT200XXXX\tunauthorized\n"`
    pub fn parse_device_list(data: &str) -> Vec<DeviceInfo> {
        data.lines()
            .filter(|line| !line.is_empty())
            .filter_map(|line| {
                let mut parts = line.split('\t');
                let serial = parts.next()?.to_string();
                let state_str = parts.next()?;
                Some(DeviceInfo::bare(serial, DeviceState::parse(state_str)))
            })
            .collect()
    }

    /// Parse the extended `devices-l` format.
    ///
    /// Each line is `<serial>\t<state>` followed by zero or more
    /// whitespace-separated `key:value` tokens (`product:`, `model:`,
    /// `device:`, `transport_id:`). Token order and presence are not
    /// contractually fixed by the server, so this parses tolerantly: any
    /// unrecognized token is taken as the devpath, and an absent key simply
    /// leaves the corresponding field `None`.
    pub fn parse_device_list_long(data: &str) -> Vec<DeviceInfo> {
        data.lines()
            .filter(|line| !line.is_empty())
            .filter_map(|line| {
                let mut fields = line.split_whitespace();
                let serial = fields.next()?.to_string();
                let state_str = fields.next()?;
                let mut info = DeviceInfo::bare(serial, DeviceState::parse(state_str));
                for token in fields {
                    if let Some((key, value)) = token.split_once(':') {
                        match key {
                            "product" => info.product = Some(value.to_string()),
                            "model" => info.model = Some(value.to_string()),
                            "device" => info.device = Some(value.to_string()),
                            "transport_id" => info.transport_id = Some(value.to_string()),
                            _ => {}
                        }
                    } else if info.devpath.is_none() {
                        info.devpath = Some(token.to_string());
                    }
                }
                Some(info)
            })
            .collect()
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}", self.serial, self.state)
    }
}

/// Identifies which device a host-service or transport-select request
/// targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceDescriptor {
    /// Any single attached device; fails if zero or more than one is attached.
    Any,
    /// Any USB-attached device.
    AnyUsb,
    /// Any local (non-USB, e.g. emulator/TCP) device.
    AnyLocal,
    /// A specific device by serial number.
    Serial(String),
}

impl DeviceDescriptor {
    /// Build a descriptor from an optional serial, the shape most call
    /// sites receive from a CLI flag: `None` means "any device".
    pub fn from_serial(serial: Option<&str>) -> Self {
        match serial {
            Some(s) => DeviceDescriptor::Serial(s.to_string()),
            None => DeviceDescriptor::Any,
        }
    }

    /// The `host:transport-*` service used to attach a connection to this
    /// device.
    pub fn transport_command(&self) -> HostCommand {
        match self {
            DeviceDescriptor::Serial(s) => HostCommand::Transport(s.clone()),
            DeviceDescriptor::AnyUsb => HostCommand::TransportUsb,
            DeviceDescriptor::AnyLocal => HostCommand::TransportLocal,
            DeviceDescriptor::Any => HostCommand::TransportAny,
        }
    }

    /// The serial number if this descriptor names one; host-serial queries
    /// (`get-serialno`, `get-devpath`, `get-state`, `features`) require a
    /// concrete serial.
    pub fn serial(&self) -> Option<&str> {
        match self {
            DeviceDescriptor::Serial(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceDescriptor::Any => write!(f, "any"),
            DeviceDescriptor::AnyUsb => write!(f, "any-usb"),
            DeviceDescriptor::AnyLocal => write!(f, "any-local"),
            DeviceDescriptor::Serial(s) => write!(f, "{s}"),
        }
    }
}

/// A lightweight handle bound to one device. Creating it does not itself
/// open a connection; each method call dials a fresh transport, matching
/// [`AdbClient`]'s one-transport-per-request model.
#[derive(Debug, Clone)]
pub struct Device {
    client: AdbClient,
    descriptor: DeviceDescriptor,
}

impl Device {
    pub(crate) fn new(client: AdbClient, descriptor: DeviceDescriptor) -> Self {
        Self { client, descriptor }
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    fn require_serial(&self, query: &str) -> AdbResult<&str> {
        self.descriptor.serial().ok_or_else(|| {
            AdbError::AssertionViolation(format!(
                "{query} requires a device selected by serial, not {}",
                self.descriptor
            ))
        })
    }

    /// The device's serial number, queried via `host-serial:<s>:get-serialno`.
    pub async fn serial(&self) -> AdbResult<String> {
        let serial = self.require_serial("get-serialno")?.to_string();
        self.client.host_serial_query(&serial, "get-serialno").await
    }

    /// The device's USB/local transport path.
    pub async fn device_path(&self) -> AdbResult<String> {
        let serial = self.require_serial("get-devpath")?.to_string();
        self.client.host_serial_query(&serial, "get-devpath").await
    }

    /// The device's current connection state.
    pub async fn state(&self) -> AdbResult<DeviceState> {
        let serial = self.require_serial("get-state")?.to_string();
        let text = self.client.host_serial_query(&serial, "get-state").await?;
        Ok(DeviceState::parse(text.trim()))
    }

    /// Feature flags the device/server report support for.
    pub async fn features(&self) -> AdbResult<Vec<String>> {
        let serial = self.require_serial("features")?.to_string();
        let text = self.client.host_serial_query(&serial, "features").await?;
        Ok(text
            .trim()
            .split(',')
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect())
    }

    /// Execute a shell command on this device and return its output.
    pub async fn run_command(&self, program: &str, args: &[&str]) -> AdbResult<String> {
        self.client
            .run_command(&self.descriptor, program, args)
            .await
    }

    /// Stat a remote file on this device.
    pub async fn stat(&self, remote_path: &str) -> AdbResult<StatResponse> {
        self.client.stat_device(&self.descriptor, remote_path).await
    }

    /// List a remote directory on this device.
    pub async fn list_dir(&self, remote_path: &str) -> AdbResult<Vec<DentEntry>> {
        self.client
            .list_dir_device(&self.descriptor, remote_path)
            .await
    }

    /// Push a local file to this device.
    pub async fn push(&self, local_path: &Path, remote_path: &str) -> AdbResult<()> {
        self.client
            .push_device(&self.descriptor, local_path, remote_path)
            .await
    }

    /// Pull a remote file from this device.
    pub async fn pull(&self, remote_path: &str, local_path: &Path) -> AdbResult<()> {
        self.client
            .pull_device(&self.descriptor, remote_path, local_path)
            .await
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Device({})", self.descriptor)
    }
}
