use crate::error::{AdbError, AdbResult};

// ADB server protocol uses a simple length-prefixed format:
//
// Request:  {4-digit hex length}{payload}
// Response: OKAY{4-digit hex length}{data}
//       or: FAIL{4-digit hex length}{error_message}

/// Format a request for the ADB server.
///
/// Encodes as `"{:04X}{payload}"` where the hex length is the payload byte length.
pub fn encode_request(payload: &str) -> Vec<u8> {
    format!("{:04X}{}", payload.len(), payload).into_bytes()
}

/// The two possible response statuses from the ADB server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdbStatus {
    Okay,
    Fail,
}

/// Parse a 4-byte status prefix (`OKAY` or `FAIL`) from a byte slice.
pub fn parse_status(buf: &[u8]) -> AdbResult<AdbStatus> {
    if buf.len() < 4 {
        return Err(AdbError::Protocol(format!(
            "Status too short: {} bytes, need 4",
            buf.len()
        )));
    }
    match &buf[..4] {
        b"OKAY" => Ok(AdbStatus::Okay),
        b"FAIL" => Ok(AdbStatus::Fail),
        other => Err(AdbError::InvalidResponse {
            expected: "OKAY or FAIL".into(),
            actual: String::from_utf8_lossy(other).to_string(),
        }),
    }
}

/// Parse a 4-character hex length string into a `usize`.
pub fn parse_hex_length(buf: &[u8]) -> AdbResult<usize> {
    if buf.len() < 4 {
        return Err(AdbError::Protocol(format!(
            "Hex length too short: {} bytes, need 4",
            buf.len()
        )));
    }
    let hex_str = std::str::from_utf8(&buf[..4])
        .map_err(|_| AdbError::Protocol(format!("Invalid UTF-8 in hex length: {:?}", &buf[..4])))?;
    usize::from_str_radix(hex_str, 16)
        .map_err(|_| AdbError::Protocol(format!("Invalid hex length: {:?}", hex_str)))
}

/// Known ADB host service commands (handled by the ADB server itself).
#[derive(Debug, Clone)]
pub enum HostCommand {
    /// Get ADB server protocol version.
    Version,
    /// List connected devices in short format.
    Devices,
    /// List connected devices with extended info.
    DevicesLong,
    /// Stream device connect/disconnect events.
    TrackDevices,
    /// Switch to a specific device by serial number.
    Transport(String),
    /// Switch to any USB-connected device.
    TransportUsb,
    /// Switch to any local (non-USB) device.
    TransportLocal,
    /// Switch to any available device.
    TransportAny,
    /// Kill the ADB server.
    Kill,
    /// Query a specific device without attaching to it, e.g.
    /// `get-serialno`, `get-devpath`, `get-state`, `features`.
    SerialQuery { serial: String, query: String },
}

impl HostCommand {
    /// Convert the command to its wire format string.
    pub fn to_wire(&self) -> String {
        match self {
            HostCommand::Version => "host:version".to_string(),
            HostCommand::Devices => "host:devices".to_string(),
            HostCommand::DevicesLong => "host:devices-l".to_string(),
            HostCommand::TrackDevices => "host:track-devices".to_string(),
            HostCommand::Transport(serial) => format!("host:transport:{}", serial),
            HostCommand::TransportUsb => "host:transport-usb".to_string(),
            HostCommand::TransportLocal => "host:transport-local".to_string(),
            HostCommand::TransportAny => "host:transport-any".to_string(),
            HostCommand::Kill => "host:kill".to_string(),
            HostCommand::SerialQuery { serial, query } => {
                format!("host-serial:{}:{}", serial, query)
            }
        }
    }

    /// Encode the command as a full request (with length prefix).
    pub fn encode(&self) -> Vec<u8> {
        encode_request(&self.to_wire())
    }
}

/// Local service commands (forwarded to device after transport selection).
#[derive(Debug, Clone)]
pub enum LocalCommand {
    /// Execute a shell command on the device.
    Shell(String),
    /// Open an interactive shell session.
    ShellInteractive,
    /// Stream logcat output.
    Logcat,
    /// Enter file sync mode.
    Sync,
}

impl LocalCommand {
    /// Convert the command to its wire format string.
    pub fn to_wire(&self) -> String {
        match self {
            LocalCommand::Shell(cmd) => format!("shell:{}", cmd),
            LocalCommand::ShellInteractive => "shell:".to_string(),
            LocalCommand::Logcat => "shell:logcat".to_string(),
            LocalCommand::Sync => "sync:".to_string(),
        }
    }

    /// Encode the command as a full request (with length prefix).
    pub fn encode(&self) -> Vec<u8> {
        encode_request(&self.to_wire())
    }
}
