use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::ServerConfig;
use crate::device::{Device, DeviceDescriptor, DeviceInfo};
use crate::error::{AdbError, AdbResult};
use crate::framer::Framer;
use crate::protocol::{HostCommand, LocalCommand};
use crate::sync::{DentEntry, StatResponse, SyncSession};
use crate::watcher::DeviceWatcher;

/// Client for communicating with the ADB server over TCP.
///
/// Every call opens a fresh connection and closes it when the call returns
/// -- there is no connection pool and no shared mutable transport, so two
/// calls on a cloned `AdbClient` never contend with each other.
#[derive(Debug, Clone)]
pub struct AdbClient {
    config: ServerConfig,
}

impl AdbClient {
    /// Create a client connecting to the default ADB server at `127.0.0.1:5037`.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Create a client connecting to a specific address (useful for testing).
    pub fn with_address(host: &str, port: u16) -> Self {
        Self {
            config: ServerConfig {
                host: host.to_string(),
                port,
                ..ServerConfig::default()
            },
        }
    }

    /// Create a client from a full [`ServerConfig`].
    pub fn with_config(config: ServerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    async fn connect(&self) -> AdbResult<Framer> {
        let addr = self.config.address();
        debug!("connecting to ADB server at {}", addr);
        Framer::connect(&addr, self.config.dial_timeout).await
    }

    /// Dial, then select the transport named by `descriptor`. Returns the
    /// framer positioned right after the transport's OKAY.
    async fn transport(&self, descriptor: &DeviceDescriptor) -> AdbResult<Framer> {
        let mut framer = self.connect().await?;
        let cmd = descriptor.transport_command();
        framer.write_request(cmd.to_wire().as_bytes()).await?;
        framer.read_status(&cmd.to_wire(), false).await?;
        Ok(framer)
    }

    /// Select the transport for `descriptor`, then switch into `sync:` mode.
    async fn sync_session(&self, descriptor: &DeviceDescriptor) -> AdbResult<SyncSession> {
        let mut framer = self.transport(descriptor).await?;
        let cmd = LocalCommand::Sync;
        framer.write_request(cmd.to_wire().as_bytes()).await?;
        framer.read_status("sync:", false).await?;
        Ok(SyncSession::new(framer))
    }

    // --- Server-level queries ---

    /// Get ADB server protocol version.
    pub async fn server_version(&self) -> AdbResult<u32> {
        let mut framer = self.connect().await?;
        framer
            .write_request(HostCommand::Version.to_wire().as_bytes())
            .await?;
        framer.read_status("host:version", false).await?;
        let data = framer.read_message().await?;
        let hex_str = std::str::from_utf8(&data)
            .map_err(|_| AdbError::Protocol("invalid UTF-8 in version response".into()))?;
        u32::from_str_radix(hex_str, 16)
            .map_err(|_| AdbError::Protocol(format!("invalid version hex: {hex_str:?}")))
    }

    /// Cancel-aware `server_version`. The underlying transport is closed as
    /// soon as the cancellation token fires; no partial connection or reader
    /// is left behind for the caller to clean up.
    pub async fn server_version_cancellable(&self, token: &CancellationToken) -> AdbResult<u32> {
        let mut framer = self.connect().await?;
        framer
            .write_request_cancellable(HostCommand::Version.to_wire().as_bytes(), token)
            .await?;
        framer.read_status_cancellable("host:version", false, token).await?;
        let data = framer.read_message_cancellable(token).await?;
        let hex_str = std::str::from_utf8(&data)
            .map_err(|_| AdbError::Protocol("invalid UTF-8 in version response".into()))?;
        u32::from_str_radix(hex_str, 16)
            .map_err(|_| AdbError::Protocol(format!("invalid version hex: {hex_str:?}")))
    }

    /// List connected devices in short format.
    pub async fn list_devices(&self) -> AdbResult<Vec<DeviceInfo>> {
        let mut framer = self.connect().await?;
        framer
            .write_request(HostCommand::Devices.to_wire().as_bytes())
            .await?;
        framer.read_status("host:devices", false).await?;
        let data = framer.read_message().await?;
        Ok(DeviceInfo::parse_device_list(&String::from_utf8_lossy(
            &data,
        )))
    }

    /// List connected devices with extended info (product/model/device/transport_id).
    pub async fn list_devices_long(&self) -> AdbResult<Vec<DeviceInfo>> {
        let mut framer = self.connect().await?;
        framer
            .write_request(HostCommand::DevicesLong.to_wire().as_bytes())
            .await?;
        framer.read_status("host:devices-l", false).await?;
        let data = framer.read_message().await?;
        Ok(DeviceInfo::parse_device_list_long(&String::from_utf8_lossy(
            &data,
        )))
    }

    /// Serial numbers of all connected devices.
    pub async fn list_device_serials(&self) -> AdbResult<Vec<String>> {
        Ok(self
            .list_devices()
            .await?
            .into_iter()
            .map(|d| d.serial)
            .collect())
    }

    /// Ask the server to shut down. The server closes the connection
    /// without a status reply, so a connection-reset here is the expected
    /// (successful) outcome rather than an error.
    pub async fn kill_server(&self) -> AdbResult<()> {
        let mut framer = self.connect().await?;
        framer
            .write_request(HostCommand::Kill.to_wire().as_bytes())
            .await?;
        match framer.read_status("host:kill", false).await {
            Ok(()) => Ok(()),
            Err(AdbError::ConnectionReset(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Launch the `adb` binary to start a server, if none is running. Uses
    /// `path_to_adb` from the configuration, falling back to `adb` on `PATH`.
    ///
    /// A zero exit is not itself proof the server is listening (the
    /// subprocess may have handed off to a daemonized grandchild that is
    /// still binding its socket), so on success this retries
    /// `server_version()` once with a short pause before giving up.
    pub async fn start_server(&self) -> AdbResult<()> {
        let adb_path = self
            .config
            .path_to_adb
            .clone()
            .unwrap_or_else(|| PathBuf::from("adb"));
        let status = tokio::process::Command::new(&adb_path)
            .arg("-P")
            .arg(self.config.port.to_string())
            .arg("start-server")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;
        if !status.success() {
            return Err(AdbError::Protocol(format!(
                "adb start-server exited with {status}"
            )));
        }
        match self.server_version().await {
            Ok(_) => Ok(()),
            Err(_) => {
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                self.server_version().await.map(|_| ())
            }
        }
    }

    /// A lightweight handle bound to one device. Opens no connection itself.
    pub fn device(&self, descriptor: DeviceDescriptor) -> Device {
        Device::new(self.clone(), descriptor)
    }

    /// Subscribe to `host:track-devices`, returning a running watcher.
    pub async fn new_device_watcher(&self) -> AdbResult<DeviceWatcher> {
        let mut framer = self.connect().await?;
        framer
            .write_request(HostCommand::TrackDevices.to_wire().as_bytes())
            .await?;
        framer.read_status("host:track-devices", false).await?;
        Ok(DeviceWatcher::spawn(framer))
    }

    // --- Device-scoped operations (used by `Device` and the legacy
    // serial-based facade below) ---

    pub(crate) async fn host_serial_query(&self, serial: &str, query: &str) -> AdbResult<String> {
        let mut framer = self.connect().await?;
        let cmd = HostCommand::SerialQuery {
            serial: serial.to_string(),
            query: query.to_string(),
        };
        framer.write_request(cmd.to_wire().as_bytes()).await?;
        framer.read_status(&cmd.to_wire(), false).await?;
        let data = framer.read_message().await?;
        Ok(String::from_utf8_lossy(&data).trim().to_string())
    }

    pub(crate) async fn run_command(
        &self,
        descriptor: &DeviceDescriptor,
        program: &str,
        args: &[&str],
    ) -> AdbResult<String> {
        let full = if args.is_empty() {
            shell_quote(program)
        } else {
            let mut parts = vec![shell_quote(program)];
            parts.extend(args.iter().map(|a| shell_quote(a)));
            parts.join(" ")
        };
        self.shell_descriptor(descriptor, &full).await
    }

    async fn shell_descriptor(
        &self,
        descriptor: &DeviceDescriptor,
        command: &str,
    ) -> AdbResult<String> {
        let mut framer = self.transport(descriptor).await?;
        let cmd = LocalCommand::Shell(command.to_string());
        framer.write_request(cmd.to_wire().as_bytes()).await?;
        framer.read_status(&cmd.to_wire(), false).await?;
        let data = framer.read_until_eof().await?;
        Ok(String::from_utf8_lossy(&data).to_string())
    }

    /// Cancel-aware shell invocation. Useful for long-running or
    /// potentially-hanging remote commands: cancellation closes the
    /// transport, which unblocks the EOF read immediately.
    pub async fn shell_cancellable(
        &self,
        serial: Option<&str>,
        command: &str,
        token: &CancellationToken,
    ) -> AdbResult<String> {
        let descriptor = DeviceDescriptor::from_serial(serial);
        let mut framer = self.transport(&descriptor).await?;
        let cmd = LocalCommand::Shell(command.to_string());
        framer
            .write_request_cancellable(cmd.to_wire().as_bytes(), token)
            .await?;
        framer
            .read_status_cancellable(&cmd.to_wire(), false, token)
            .await?;
        let data = framer.read_until_eof_cancellable(token).await?;
        Ok(String::from_utf8_lossy(&data).to_string())
    }

    pub(crate) async fn stat_device(
        &self,
        descriptor: &DeviceDescriptor,
        remote_path: &str,
    ) -> AdbResult<StatResponse> {
        let mut session = self.sync_session(descriptor).await?;
        let result = session.stat(remote_path).await;
        let _ = session.quit().await;
        result
    }

    /// Cancel-aware `stat`. Cancellation during the dial, transport-select,
    /// sync-switch, or STAT reply all close the transport and return
    /// `Timeout`.
    pub async fn stat_cancellable(
        &self,
        serial: Option<&str>,
        remote_path: &str,
        token: &CancellationToken,
    ) -> AdbResult<StatResponse> {
        let descriptor = DeviceDescriptor::from_serial(serial);
        let mut session = self.sync_session(&descriptor).await?;
        let result = session.stat_cancellable(remote_path, token).await;
        let _ = session.quit().await;
        result
    }

    /// Cancel-aware `pull`. Cancellation between DATA frames leaves the
    /// local file unwritten rather than partially written.
    pub async fn pull_cancellable(
        &self,
        serial: Option<&str>,
        remote_path: &str,
        local_path: &Path,
        token: &CancellationToken,
    ) -> AdbResult<()> {
        let descriptor = DeviceDescriptor::from_serial(serial);
        let mut session = self.sync_session(&descriptor).await?;
        let data_result = session.recv_cancellable(remote_path, token).await;
        let _ = session.quit().await;
        let data = data_result?;
        tokio::fs::write(local_path, &data).await?;
        Ok(())
    }

    /// Cancel-aware `list_dir`. Cancellation between DENT frames stops the
    /// listing and returns `Timeout` rather than an empty or truncated
    /// result silently passed off as complete.
    pub async fn list_dir_cancellable(
        &self,
        serial: Option<&str>,
        remote_path: &str,
        token: &CancellationToken,
    ) -> AdbResult<Vec<DentEntry>> {
        let descriptor = DeviceDescriptor::from_serial(serial);
        let mut session = self.sync_session(&descriptor).await?;
        let result = session.list_cancellable(remote_path, token).await;
        let _ = session.quit().await;
        result
    }

    /// Cancel-aware `push`. Cancellation between DATA frames leaves the
    /// remote file incomplete/poisoned rather than blocking for the whole
    /// transfer.
    pub async fn push_cancellable(
        &self,
        serial: Option<&str>,
        local_path: &Path,
        remote_path: &str,
        token: &CancellationToken,
    ) -> AdbResult<()> {
        let file_data = tokio::fs::read(local_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AdbError::FileNotFound(local_path.display().to_string())
            } else {
                AdbError::Io(e)
            }
        })?;
        let metadata = tokio::fs::metadata(local_path).await?;
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);

        let descriptor = DeviceDescriptor::from_serial(serial);
        let mut session = self.sync_session(&descriptor).await?;
        let result = session
            .send_cancellable(remote_path, 0o100644, &file_data, mtime, token)
            .await;
        let _ = session.quit().await;
        result
    }

    pub(crate) async fn list_dir_device(
        &self,
        descriptor: &DeviceDescriptor,
        remote_path: &str,
    ) -> AdbResult<Vec<DentEntry>> {
        let mut session = self.sync_session(descriptor).await?;
        let result = session.list(remote_path).await;
        let _ = session.quit().await;
        result
    }

    pub(crate) async fn push_device(
        &self,
        descriptor: &DeviceDescriptor,
        local_path: &Path,
        remote_path: &str,
    ) -> AdbResult<()> {
        let file_data = tokio::fs::read(local_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AdbError::FileNotFound(local_path.display().to_string())
            } else {
                AdbError::Io(e)
            }
        })?;

        let metadata = tokio::fs::metadata(local_path).await?;
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);

        let mut session = self.sync_session(descriptor).await?;
        let result = session.send(remote_path, 0o100644, &file_data, mtime).await;
        let _ = session.quit().await;
        result
    }

    pub(crate) async fn pull_device(
        &self,
        descriptor: &DeviceDescriptor,
        remote_path: &str,
        local_path: &Path,
    ) -> AdbResult<()> {
        let mut session = self.sync_session(descriptor).await?;
        let data_result = session.recv(remote_path).await;
        let _ = session.quit().await;
        let data = data_result?;
        tokio::fs::write(local_path, &data).await?;
        Ok(())
    }

    // --- Legacy serial-based facade, kept for callers (and the CLI) that
    // pass an `Option<&str>` serial rather than going through `device()`. ---

    /// Execute a shell command on the device and return its output.
    pub async fn shell(&self, serial: Option<&str>, command: &str) -> AdbResult<String> {
        self.shell_descriptor(&DeviceDescriptor::from_serial(serial), command)
            .await
    }

    /// Stream logcat output. Returns the raw TCP stream for the caller to read from.
    pub async fn logcat(&self, serial: Option<&str>) -> AdbResult<TcpStream> {
        let descriptor = DeviceDescriptor::from_serial(serial);
        let mut framer = self.transport(&descriptor).await?;
        let cmd = LocalCommand::Logcat;
        framer.write_request(cmd.to_wire().as_bytes()).await?;
        framer.read_status(&cmd.to_wire(), false).await?;
        Ok(framer.into_inner())
    }

    /// Stat a remote file on the device.
    pub async fn stat(&self, serial: Option<&str>, remote_path: &str) -> AdbResult<StatResponse> {
        self.stat_device(&DeviceDescriptor::from_serial(serial), remote_path)
            .await
    }

    /// List a remote directory on the device.
    pub async fn list_dir(
        &self,
        serial: Option<&str>,
        remote_path: &str,
    ) -> AdbResult<Vec<DentEntry>> {
        self.list_dir_device(&DeviceDescriptor::from_serial(serial), remote_path)
            .await
    }

    /// Push a local file to the device.
    pub async fn push(
        &self,
        serial: Option<&str>,
        local_path: &Path,
        remote_path: &str,
    ) -> AdbResult<()> {
        self.push_device(&DeviceDescriptor::from_serial(serial), local_path, remote_path)
            .await
    }

    /// Pull a remote file from the device to a local path.
    pub async fn pull(
        &self,
        serial: Option<&str>,
        remote_path: &str,
        local_path: &Path,
    ) -> AdbResult<()> {
        self.pull_device(&DeviceDescriptor::from_serial(serial), remote_path, local_path)
            .await
    }
}

impl Default for AdbClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Quote a single shell argument only if it contains whitespace, matching
/// the server's own minimal `shell:` quoting convention: surround it with
/// single quotes, escaping any embedded single quote as `'\''`. Arguments
/// with no whitespace pass through unquoted.
fn shell_quote(arg: &str) -> String {
    if !arg.chars().any(char::is_whitespace) {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Spawn a mock ADB server that sends canned responses.
    /// Returns the port it's listening on.
    async fn mock_adb_server(handler: impl FnOnce(TcpStream) + Send + 'static) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            handler(socket);
        });
        port
    }

    /// Spawn a mock that reads the request then sends a byte sequence.
    async fn mock_simple_response(response: Vec<u8>) -> u16 {
        mock_adb_server(move |mut socket| {
            tokio::spawn(async move {
                let mut buf = [0u8; 256];
                let _ = socket.read(&mut buf).await;
                socket.write_all(&response).await.unwrap();
            });
        })
        .await
    }

    #[tokio::test]
    async fn test_server_version() {
        let mut response = Vec::new();
        response.extend_from_slice(b"OKAY");
        response.extend_from_slice(b"0004");
        response.extend_from_slice(b"001f");
        let port = mock_simple_response(response).await;

        let client = AdbClient::with_address("127.0.0.1", port);
        let version = client.server_version().await.unwrap();
        assert_eq!(version, 31);
    }

    #[tokio::test]
    async fn test_list_devices() {
        let device_list = b"emulator-5554\tdevice\n";
        let len_str = format!("{:04x}", device_list.len());

        let mut response = Vec::new();
        response.extend_from_slice(b"OKAY");
        response.extend_from_slice(len_str.as_bytes());
        response.extend_from_slice(device_list);
        let port = mock_simple_response(response).await;

        let client = AdbClient::with_address("127.0.0.1", port);
        let devices = client.list_devices().await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].serial, "emulator-5554");
    }

    #[tokio::test]
    async fn test_list_devices_empty() {
        let mut response = Vec::new();
        response.extend_from_slice(b"OKAY");
        response.extend_from_slice(b"0000");
        let port = mock_simple_response(response).await;

        let client = AdbClient::with_address("127.0.0.1", port);
        let devices = client.list_devices().await.unwrap();
        assert!(devices.is_empty());
    }

    #[tokio::test]
    async fn test_list_device_serials() {
        let device_list = b"A\tdevice\nB\toffline\n";
        let len_str = format!("{:04x}", device_list.len());
        let mut response = Vec::new();
        response.extend_from_slice(b"OKAY");
        response.extend_from_slice(len_str.as_bytes());
        response.extend_from_slice(device_list);
        let port = mock_simple_response(response).await;

        let client = AdbClient::with_address("127.0.0.1", port);
        let serials = client.list_device_serials().await.unwrap();
        assert_eq!(serials, vec!["A".to_string(), "B".to_string()]);
    }

    #[tokio::test]
    async fn test_server_fail_response() {
        let error_msg = b"something went wrong";
        let len_str = format!("{:04x}", error_msg.len());

        let mut response = Vec::new();
        response.extend_from_slice(b"FAIL");
        response.extend_from_slice(len_str.as_bytes());
        response.extend_from_slice(error_msg);
        let port = mock_simple_response(response).await;

        let client = AdbClient::with_address("127.0.0.1", port);
        let result = client.server_version().await;
        match result {
            Err(AdbError::ServerFail(msg)) => assert_eq!(msg, "something went wrong"),
            other => panic!("Expected ServerFail, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_device_not_found_reported_distinctly() {
        let error_msg = b"device 'XYZ' not found";
        let len_str = format!("{:04x}", error_msg.len());
        let mut response = Vec::new();
        response.extend_from_slice(b"FAIL");
        response.extend_from_slice(len_str.as_bytes());
        response.extend_from_slice(error_msg);
        let port = mock_simple_response(response).await;

        let client = AdbClient::with_address("127.0.0.1", port);
        let result = client.shell(Some("XYZ"), "echo hi").await;
        assert!(matches!(result, Err(AdbError::DeviceNotFound(ref s)) if s == "XYZ"));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        // Port 1 is privileged and unbound in test environments; the connect
        // attempt should fail rather than hang.
        let client = AdbClient::with_address("127.0.0.1", 1);
        let result = client.server_version().await;
        assert!(
            matches!(
                result,
                Err(AdbError::ServerNotAvailable(_)) | Err(AdbError::Io(_))
            ),
            "Expected ServerNotAvailable or Io error, got {:?}",
            result
        );
    }

    #[tokio::test]
    async fn test_server_version_cancellable_returns_promptly_on_stalled_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap(); // never responds
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        });

        let client = AdbClient::with_address("127.0.0.1", port);
        let token = CancellationToken::new();
        let token2 = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            token2.cancel();
        });

        let start = std::time::Instant::now();
        let err = client.server_version_cancellable(&token).await.unwrap_err();
        assert!(matches!(err, AdbError::Timeout));
        assert!(start.elapsed() < std::time::Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_shell_command() {
        let port = mock_adb_server(move |mut socket| {
            tokio::spawn(async move {
                let mut buf = [0u8; 256];

                let _ = socket.read(&mut buf).await;
                socket.write_all(b"OKAY").await.unwrap();

                let _ = socket.read(&mut buf).await;
                socket.write_all(b"OKAY").await.unwrap();

                socket.write_all(b"hello world\n").await.unwrap();
                drop(socket);
            });
        })
        .await;

        let client = AdbClient::with_address("127.0.0.1", port);
        let output = client.shell(None, "echo hello world").await.unwrap();
        assert_eq!(output, "hello world\n");
    }

    #[tokio::test]
    async fn test_stat_file() {
        let port = mock_adb_server(move |mut socket| {
            tokio::spawn(async move {
                let mut buf = [0u8; 256];

                let _ = socket.read(&mut buf).await;
                socket.write_all(b"OKAY").await.unwrap();

                let _ = socket.read(&mut buf).await;
                socket.write_all(b"OKAY").await.unwrap();

                let _ = socket.read(&mut buf).await;

                let mut resp = Vec::new();
                resp.extend_from_slice(b"STAT");
                resp.extend_from_slice(&0x000081A4u32.to_le_bytes());
                resp.extend_from_slice(&1024u32.to_le_bytes());
                resp.extend_from_slice(&1_700_000_000u32.to_le_bytes());
                socket.write_all(&resp).await.unwrap();

                let _ = socket.read(&mut buf).await;
            });
        })
        .await;

        let client = AdbClient::with_address("127.0.0.1", port);
        let stat = client.stat(None, "/sdcard/test.txt").await.unwrap();
        assert_eq!(stat.size, 1024);
        assert!(stat.is_file());
        assert_eq!(stat.permissions(), 0o644);
    }

    #[tokio::test]
    async fn test_device_factory_returns_handle_without_connecting() {
        // Building a Device must not touch the network: no mock server is
        // even started here.
        let client = AdbClient::with_address("127.0.0.1", 1);
        let device = client.device(DeviceDescriptor::Serial("emulator-5554".into()));
        assert_eq!(device.descriptor(), &DeviceDescriptor::Serial("emulator-5554".into()));
    }

    #[test]
    fn test_shell_quote_passes_through_plain_args() {
        assert_eq!(shell_quote("echo"), "echo");
        assert_eq!(shell_quote("-la"), "-la");
    }

    #[test]
    fn test_shell_quote_wraps_whitespace() {
        assert_eq!(shell_quote("hello world"), "'hello world'");
    }

    #[test]
    fn test_shell_quote_escapes_embedded_quote() {
        assert_eq!(shell_quote("it's here"), r"'it'\''s here'");
    }

    #[tokio::test]
    async fn test_run_command_quotes_args_with_whitespace() {
        let port = mock_adb_server(move |mut socket| {
            tokio::spawn(async move {
                let mut transport_buf = [0u8; 64];
                let _ = socket.read(&mut transport_buf).await;
                socket.write_all(b"OKAY").await.unwrap();

                let mut shell_buf = [0u8; 256];
                let n = socket.read(&mut shell_buf).await.unwrap();
                let req = String::from_utf8_lossy(&shell_buf[..n]).to_string();
                assert!(req.ends_with("shell:echo 'hello world' -la"), "{req}");
                socket.write_all(b"OKAY").await.unwrap();
                drop(socket);
            });
        })
        .await;

        let client = AdbClient::with_address("127.0.0.1", port);
        client
            .run_command(&DeviceDescriptor::Any, "echo", &["hello world", "-la"])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_host_serial_query_get_state() {
        let port = mock_adb_server(move |mut socket| {
            tokio::spawn(async move {
                let mut buf = [0u8; 256];
                let _ = socket.read(&mut buf).await;
                socket.write_all(b"OKAY").await.unwrap();
                let state = b"device";
                socket
                    .write_all(format!("{:04x}", state.len()).as_bytes())
                    .await
                    .unwrap();
                socket.write_all(state).await.unwrap();
            });
        })
        .await;

        let client = AdbClient::with_address("127.0.0.1", port);
        let device = client.device(DeviceDescriptor::Serial("emulator-5554".into()));
        let state = device.state().await.unwrap();
        assert_eq!(state, crate::device::DeviceState::Device);
    }
}
