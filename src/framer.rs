use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{AdbError, AdbResult};
use crate::protocol::{self, AdbStatus};
use crate::sync::SyncHeader;

/// Wraps one TCP connection to the ADB server and knows the two framing
/// disciplines (hex-length host framing, little-endian-length sync framing)
/// but nothing about request semantics.
///
/// Every operation opens a fresh `Framer`; there is no connection pool
/// (spec §5's load-bearing simplification — no two operations ever share a
/// stream, so no mutex on the wire is needed).
pub struct Framer {
    stream: TcpStream,
}

impl Framer {
    /// Dial the server, applying `dial_timeout` as a connect deadline.
    pub async fn connect(addr: &str, dial_timeout: Duration) -> AdbResult<Self> {
        debug!("connecting to ADB server at {}", addr);
        let connect_fut = TcpStream::connect(addr);
        let stream = match tokio::time::timeout(dial_timeout, connect_fut).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(AdbError::from_connect_io(e, addr)),
            Err(_) => return Err(AdbError::Timeout),
        };
        Ok(Self { stream })
    }

    /// Wrap an already-open stream (used in tests and by the device-watcher
    /// and sync-session layers, which hand a live `Framer` to their caller).
    pub fn from_stream(stream: TcpStream) -> Self {
        Self { stream }
    }

    /// Consume the framer, returning the underlying stream. Used when a
    /// caller needs to read raw bytes directly (e.g. `logcat`).
    pub fn into_inner(self) -> TcpStream {
        self.stream
    }

    pub fn get_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    /// Write a host-framed request: 4 hex digits of length, then `body`.
    pub async fn write_request(&mut self, body: &[u8]) -> AdbResult<()> {
        let header = format!("{:04x}", body.len());
        self.stream.write_all(header.as_bytes()).await?;
        self.stream.write_all(body).await?;
        Ok(())
    }

    /// Read a 4-byte status and, on `FAIL`, read the trailing error message
    /// and fail with an `AdbServerError`-shaped error (re-tagged per the
    /// dispatcher's error-mapping rules). `req_label` is used only for
    /// diagnostics/ConnectionReset context.
    pub async fn read_status(&mut self, req_label: &str, sync_context: bool) -> AdbResult<()> {
        let mut status_buf = [0u8; 4];
        read_exact_tracked(&mut self.stream, &mut status_buf, req_label).await?;
        match protocol::parse_status(&status_buf)? {
            AdbStatus::Okay => Ok(()),
            AdbStatus::Fail => {
                let msg = self.read_message().await?;
                Err(AdbError::from_server_fail(
                    String::from_utf8_lossy(&msg).to_string(),
                    sync_context,
                ))
            }
        }
    }

    /// Cancel-aware `read_status`. On cancellation the transport is shut
    /// down immediately (no background reader is ever left running — there
    /// is none to leak, since this races the read in place with
    /// `tokio::select!` rather than spawning a task for it).
    pub async fn read_status_cancellable(
        &mut self,
        req_label: &str,
        sync_context: bool,
        token: &CancellationToken,
    ) -> AdbResult<()> {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                let _ = self.stream.shutdown().await;
                Err(AdbError::Timeout)
            }
            result = self.read_status(req_label, sync_context) => result,
        }
    }

    /// Cancel-aware `write_request`.
    pub async fn write_request_cancellable(
        &mut self,
        body: &[u8],
        token: &CancellationToken,
    ) -> AdbResult<()> {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                let _ = self.stream.shutdown().await;
                Err(AdbError::Timeout)
            }
            result = self.write_request(body) => result,
        }
    }

    /// Read a length-prefixed response body (4-hex-digit length + data).
    pub async fn read_message(&mut self) -> AdbResult<Vec<u8>> {
        let mut len_buf = [0u8; 4];
        read_exact_tracked(&mut self.stream, &mut len_buf, "message length").await?;
        let len = protocol::parse_hex_length(&len_buf)?;
        if len == 0 {
            return Ok(Vec::new());
        }
        let mut data = vec![0u8; len];
        read_exact_tracked(&mut self.stream, &mut data, "message body").await?;
        Ok(data)
    }

    /// Cancel-aware `read_message`.
    pub async fn read_message_cancellable(
        &mut self,
        token: &CancellationToken,
    ) -> AdbResult<Vec<u8>> {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                let _ = self.stream.shutdown().await;
                Err(AdbError::Timeout)
            }
            result = self.read_message() => result,
        }
    }

    /// Read all remaining data from the stream until EOF. Used for shell
    /// output, which has no length prefix: the server simply closes the
    /// connection when the command exits.
    pub async fn read_until_eof(&mut self) -> AdbResult<Vec<u8>> {
        let mut data = Vec::new();
        self.stream.read_to_end(&mut data).await?;
        Ok(data)
    }

    /// Cancel-aware `read_until_eof`.
    pub async fn read_until_eof_cancellable(
        &mut self,
        token: &CancellationToken,
    ) -> AdbResult<Vec<u8>> {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                let _ = self.stream.shutdown().await;
                Err(AdbError::Timeout)
            }
            result = self.read_until_eof() => result,
        }
    }

    /// Read an 8-byte sync header (4-byte command id + u32-LE length).
    pub async fn read_sync_header(&mut self) -> AdbResult<SyncHeader> {
        let mut buf = [0u8; 8];
        read_exact_tracked(&mut self.stream, &mut buf, "sync header").await?;
        SyncHeader::from_bytes(&buf)
    }

    /// Read exactly `len` bytes of sync frame payload.
    pub async fn read_sync_payload(&mut self, len: u32) -> AdbResult<Vec<u8>> {
        let mut data = vec![0u8; len as usize];
        read_exact_tracked(&mut self.stream, &mut data, "sync payload").await?;
        Ok(data)
    }

    /// Read one full sync frame: header plus payload.
    pub async fn sync_read_frame(&mut self) -> AdbResult<(SyncHeader, Vec<u8>)> {
        let header = self.read_sync_header().await?;
        let payload = self.read_sync_payload(header.length).await?;
        Ok((header, payload))
    }

    /// Cancel-aware `sync_read_frame`.
    pub async fn sync_read_frame_cancellable(
        &mut self,
        token: &CancellationToken,
    ) -> AdbResult<(SyncHeader, Vec<u8>)> {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                let _ = self.stream.shutdown().await;
                Err(AdbError::Timeout)
            }
            result = self.sync_read_frame() => result,
        }
    }

    /// Write a raw sync frame: `cmd` (4 ASCII bytes) + LE length + payload.
    pub async fn sync_send_frame(&mut self, cmd: &[u8; 4], payload: &[u8]) -> AdbResult<()> {
        let mut buf = Vec::with_capacity(8 + payload.len());
        buf.extend_from_slice(cmd);
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(payload);
        self.stream.write_all(&buf).await?;
        Ok(())
    }

    /// Write raw bytes with no framing applied (used by sync send/recv,
    /// which build their own frames via `sync::encode_*`).
    pub async fn write_raw(&mut self, bytes: &[u8]) -> AdbResult<()> {
        self.stream.write_all(bytes).await?;
        Ok(())
    }

    /// Cancel-aware `write_raw`.
    pub async fn write_raw_cancellable(
        &mut self,
        bytes: &[u8],
        token: &CancellationToken,
    ) -> AdbResult<()> {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                let _ = self.stream.shutdown().await;
                Err(AdbError::Timeout)
            }
            result = self.write_raw(bytes) => result,
        }
    }
}

/// Read exactly `buf.len()` bytes, distinguishing "peer closed before
/// anything arrived" (`ConnectionReset`) from "peer closed mid-message"
/// (`Protocol`), per the dispatcher's error-mapping rules.
async fn read_exact_tracked(
    stream: &mut TcpStream,
    buf: &mut [u8],
    what: &str,
) -> AdbResult<()> {
    let mut total = 0usize;
    while total < buf.len() {
        let n = stream.read(&mut buf[total..]).await?;
        if n == 0 {
            return if total == 0 {
                Err(AdbError::ConnectionReset(what.to_string()))
            } else {
                Err(AdbError::Protocol(format!(
                    "short read during {what}: got {total} of {} bytes",
                    buf.len()
                )))
            };
        }
        total += n;
    }
    Ok(())
}
