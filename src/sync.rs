use crate::error::{AdbError, AdbResult};

/// Maximum chunk size for DATA packets in sync protocol (64 KB).
pub const SYNC_DATA_MAX: u32 = 64 * 1024;

/// Sync protocol command IDs -- 4 ASCII characters.
///
/// Every sync message has an 8-byte header: a 4-byte ASCII command ID
/// followed by a 4-byte little-endian u32 length/value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncId {
    /// Query file metadata.
    Stat,
    /// List directory contents.
    List,
    /// Send (push) a file to the device.
    Send,
    /// Receive (pull) a file from the device.
    Recv,
    /// Data chunk within a send/recv transfer.
    Data,
    /// Marks the end of a file transfer.
    Done,
    /// Success acknowledgment.
    Okay,
    /// Error response.
    Fail,
    /// Directory entry (response to LIST).
    Dent,
    /// Quit sync mode.
    Quit,
}

impl SyncId {
    /// The 4-byte ASCII representation of this command ID.
    pub fn as_bytes(&self) -> &[u8; 4] {
        match self {
            SyncId::Stat => b"STAT",
            SyncId::List => b"LIST",
            SyncId::Send => b"SEND",
            SyncId::Recv => b"RECV",
            SyncId::Data => b"DATA",
            SyncId::Done => b"DONE",
            SyncId::Okay => b"OKAY",
            SyncId::Fail => b"FAIL",
            SyncId::Dent => b"DENT",
            SyncId::Quit => b"QUIT",
        }
    }

    /// Parse a 4-byte ASCII slice into a `SyncId`.
    pub fn from_bytes(bytes: &[u8]) -> AdbResult<SyncId> {
        if bytes.len() < 4 {
            return Err(AdbError::Protocol(format!(
                "Sync ID too short: {} bytes, need 4",
                bytes.len()
            )));
        }
        match &bytes[..4] {
            b"STAT" => Ok(SyncId::Stat),
            b"LIST" => Ok(SyncId::List),
            b"SEND" => Ok(SyncId::Send),
            b"RECV" => Ok(SyncId::Recv),
            b"DATA" => Ok(SyncId::Data),
            b"DONE" => Ok(SyncId::Done),
            b"OKAY" => Ok(SyncId::Okay),
            b"FAIL" => Ok(SyncId::Fail),
            b"DENT" => Ok(SyncId::Dent),
            b"QUIT" => Ok(SyncId::Quit),
            other => Err(AdbError::Protocol(format!(
                "Unknown sync ID: {:?}",
                String::from_utf8_lossy(other)
            ))),
        }
    }
}

/// The 8-byte sync header: 4-byte command ID + 4-byte little-endian u32 length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncHeader {
    pub id: SyncId,
    pub length: u32,
}

impl SyncHeader {
    pub fn new(id: SyncId, length: u32) -> Self {
        Self { id, length }
    }

    /// Serialize to exactly 8 bytes.
    pub fn to_bytes(&self) -> [u8; 8] {
        let mut buf = [0u8; 8];
        buf[0..4].copy_from_slice(self.id.as_bytes());
        buf[4..8].copy_from_slice(&self.length.to_le_bytes());
        buf
    }

    /// Parse from a byte slice (must be at least 8 bytes).
    pub fn from_bytes(buf: &[u8]) -> AdbResult<Self> {
        if buf.len() < 8 {
            return Err(AdbError::Protocol(format!(
                "Sync header too short: {} bytes, need 8",
                buf.len()
            )));
        }
        let id = SyncId::from_bytes(&buf[0..4])?;
        let length = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        Ok(Self { id, length })
    }
}

/// STAT response: file metadata returned by the device.
///
/// The on-wire format is 16 bytes total: `STAT` (4) + mode (4) + size (4) + mtime (4).
/// This struct holds the 12 bytes after the `STAT` id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatResponse {
    /// Unix file mode (type + permissions).
    pub mode: u32,
    /// File size in bytes.
    pub size: u32,
    /// Last modification time (Unix timestamp).
    pub mtime: u32,
}

impl StatResponse {
    /// Parse from the 12 bytes following the STAT id.
    pub fn from_bytes(buf: &[u8]) -> AdbResult<Self> {
        if buf.len() < 12 {
            return Err(AdbError::Protocol(format!(
                "STAT response too short: {} bytes, need 12",
                buf.len()
            )));
        }
        let mode = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let size = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let mtime = u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
        Ok(Self { mode, size, mtime })
    }

    /// Whether this is a regular file (S_IFREG = 0o100000).
    pub fn is_file(&self) -> bool {
        (self.mode & 0o170000) == 0o100000
    }

    /// Whether this is a directory (S_IFDIR = 0o040000).
    pub fn is_directory(&self) -> bool {
        (self.mode & 0o170000) == 0o040000
    }

    /// Extract the permission bits (lower 12 bits).
    pub fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }
}

/// Directory entry from LIST command response (DENT).
///
/// On-wire format: `DENT` (4) + mode (4) + size (4) + mtime (4) + namelen (4) + name.
/// This struct holds everything after the `DENT` id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DentEntry {
    /// Unix file mode.
    pub mode: u32,
    /// File size in bytes.
    pub size: u32,
    /// Last modification time.
    pub mtime: u32,
    /// File/directory name.
    pub name: String,
}

impl DentEntry {
    /// Parse from raw bytes: mode (4) + size (4) + mtime (4) + namelen (4) + name.
    pub fn from_bytes(buf: &[u8]) -> AdbResult<Self> {
        if buf.len() < 16 {
            return Err(AdbError::Protocol(format!(
                "DENT entry too short: {} bytes, need at least 16",
                buf.len()
            )));
        }
        let mode = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let size = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let mtime = u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
        let namelen = u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]) as usize;

        if buf.len() < 16 + namelen {
            return Err(AdbError::Protocol(format!(
                "DENT entry name truncated: have {} bytes, need {}",
                buf.len() - 16,
                namelen
            )));
        }
        let name = String::from_utf8_lossy(&buf[16..16 + namelen]).to_string();
        Ok(Self {
            mode,
            size,
            mtime,
            name,
        })
    }

    /// Total byte size of this entry on the wire (excluding the DENT id).
    pub fn wire_size(&self) -> usize {
        16 + self.name.len()
    }
}

/// Encode a STAT request: `STAT` + LE path length + path bytes.
pub fn encode_stat_request(remote_path: &str) -> Vec<u8> {
    let path_bytes = remote_path.as_bytes();
    let mut buf = Vec::with_capacity(8 + path_bytes.len());
    buf.extend_from_slice(b"STAT");
    buf.extend_from_slice(&(path_bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(path_bytes);
    buf
}

/// Encode a LIST request: `LIST` + LE path length + path bytes.
pub fn encode_list_request(remote_path: &str) -> Vec<u8> {
    let path_bytes = remote_path.as_bytes();
    let mut buf = Vec::with_capacity(8 + path_bytes.len());
    buf.extend_from_slice(b"LIST");
    buf.extend_from_slice(&(path_bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(path_bytes);
    buf
}

/// Encode a RECV request: `RECV` + LE path length + path bytes.
pub fn encode_recv_request(remote_path: &str) -> Vec<u8> {
    let path_bytes = remote_path.as_bytes();
    let mut buf = Vec::with_capacity(8 + path_bytes.len());
    buf.extend_from_slice(b"RECV");
    buf.extend_from_slice(&(path_bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(path_bytes);
    buf
}

/// Encode a SEND request: `SEND` + LE length + `{remote_path},{mode}`.
pub fn encode_send_request(remote_path: &str, mode: u32) -> Vec<u8> {
    let payload = format!("{},{}", remote_path, mode);
    let payload_bytes = payload.as_bytes();
    let mut buf = Vec::with_capacity(8 + payload_bytes.len());
    buf.extend_from_slice(b"SEND");
    buf.extend_from_slice(&(payload_bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(payload_bytes);
    buf
}

/// Encode a DATA chunk: `DATA` + LE data length + data bytes.
pub fn encode_data_chunk(data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + data.len());
    buf.extend_from_slice(b"DATA");
    buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
    buf.extend_from_slice(data);
    buf
}

/// Encode a DONE message with modification time: `DONE` + LE mtime.
pub fn encode_done(mtime: u32) -> [u8; 8] {
    let mut buf = [0u8; 8];
    buf[0..4].copy_from_slice(b"DONE");
    buf[4..8].copy_from_slice(&mtime.to_le_bytes());
    buf
}

/// Encode a QUIT message: `QUIT` + LE 0.
pub fn encode_quit() -> [u8; 8] {
    let mut buf = [0u8; 8];
    buf[0..4].copy_from_slice(b"QUIT");
    // length is already 0
    buf
}

/// State of a [`SyncSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncState {
    /// No command in flight; a new STAT/LIST/SEND/RECV may begin.
    Idle,
    /// A command has been sent and its reply/stream hasn't finished yet.
    InCommand,
    /// A FAIL frame was observed; the session is dead and must be closed.
    Poisoned,
}

/// A sync session layered over a transport already switched into `sync:`
/// mode, implementing the Idle -> InCommand -> Idle state machine (any FAIL
/// frame transitions unconditionally to Poisoned, which is terminal).
///
/// Requests are strictly serial: a session sends and receives exactly one
/// command at a time.
pub struct SyncSession {
    framer: crate::framer::Framer,
    state: SyncState,
}

impl SyncSession {
    /// Wrap a transport that has just completed the `sync:` switch.
    pub fn new(framer: crate::framer::Framer) -> Self {
        Self {
            framer,
            state: SyncState::Idle,
        }
    }

    fn begin_command(&mut self) -> AdbResult<()> {
        match self.state {
            SyncState::Idle => {
                self.state = SyncState::InCommand;
                Ok(())
            }
            SyncState::InCommand => Err(AdbError::AssertionViolation(
                "sync session already has a command in flight".into(),
            )),
            SyncState::Poisoned => Err(AdbError::AssertionViolation(
                "sync session is poisoned after a prior FAIL".into(),
            )),
        }
    }

    fn poison(&mut self) {
        self.state = SyncState::Poisoned;
    }

    fn end_command(&mut self) {
        if self.state == SyncState::InCommand {
            self.state = SyncState::Idle;
        }
    }

    async fn read_message_or_fail(&mut self, header: &SyncHeader) -> AdbResult<AdbError> {
        let msg = self.framer.read_sync_payload(header.length).await?;
        self.poison();
        Ok(AdbError::from_server_fail(
            String::from_utf8_lossy(&msg).to_string(),
            true,
        ))
    }

    /// STAT: query metadata for `remote_path`. `mode == 0` in the response
    /// means the path does not exist.
    pub async fn stat(&mut self, remote_path: &str) -> AdbResult<StatResponse> {
        self.begin_command()?;
        let req = encode_stat_request(remote_path);
        if let Err(e) = self.framer.write_raw(&req).await {
            self.poison();
            return Err(e);
        }

        let header = match self.framer.read_sync_header().await {
            Ok(h) => h,
            Err(e) => {
                self.poison();
                return Err(e);
            }
        };

        let result = match header.id {
            SyncId::Stat => match self.framer.read_sync_payload(header.length).await {
                Ok(payload) => StatResponse::from_bytes(&payload),
                Err(e) => {
                    self.poison();
                    return Err(e);
                }
            },
            SyncId::Fail => Err(self.read_message_or_fail(&header).await?),
            other => {
                self.poison();
                Err(AdbError::Protocol(format!(
                    "expected STAT response, got {other:?}"
                )))
            }
        };
        self.end_command();
        result
    }

    /// LIST: fetch every directory entry for `remote_path`. Reads the full
    /// `DENT*` stream up to `DONE` (the core engine has no resumable
    /// mid-listing cursor; a consumer wanting to stop early must close the
    /// underlying session instead).
    pub async fn list(&mut self, remote_path: &str) -> AdbResult<Vec<DentEntry>> {
        self.begin_command()?;
        let req = encode_list_request(remote_path);
        if let Err(e) = self.framer.write_raw(&req).await {
            self.poison();
            return Err(e);
        }

        let mut entries = Vec::new();
        loop {
            let header = match self.framer.read_sync_header().await {
                Ok(h) => h,
                Err(e) => {
                    self.poison();
                    return Err(e);
                }
            };
            match header.id {
                SyncId::Dent => {
                    let payload = match self.framer.read_sync_payload(header.length).await {
                        Ok(p) => p,
                        Err(e) => {
                            self.poison();
                            return Err(e);
                        }
                    };
                    match DentEntry::from_bytes(&payload) {
                        Ok(entry) => entries.push(entry),
                        Err(e) => {
                            self.poison();
                            return Err(e);
                        }
                    }
                }
                SyncId::Done => break,
                SyncId::Fail => return Err(self.read_message_or_fail(&header).await?),
                other => {
                    self.poison();
                    return Err(AdbError::Protocol(format!(
                        "unexpected sync ID in LIST response: {other:?}"
                    )));
                }
            }
        }
        self.end_command();
        Ok(entries)
    }

    /// RECV: pull `remote_path`, returning the concatenation of all DATA
    /// payloads.
    pub async fn recv(&mut self, remote_path: &str) -> AdbResult<Vec<u8>> {
        self.begin_command()?;
        let req = encode_recv_request(remote_path);
        if let Err(e) = self.framer.write_raw(&req).await {
            self.poison();
            return Err(e);
        }

        let mut data = Vec::new();
        loop {
            let header = match self.framer.read_sync_header().await {
                Ok(h) => h,
                Err(e) => {
                    self.poison();
                    return Err(e);
                }
            };
            match header.id {
                SyncId::Data => {
                    let chunk = match self.framer.read_sync_payload(header.length).await {
                        Ok(c) => c,
                        Err(e) => {
                            self.poison();
                            return Err(e);
                        }
                    };
                    data.extend_from_slice(&chunk);
                }
                SyncId::Done => break,
                SyncId::Fail => return Err(self.read_message_or_fail(&header).await?),
                other => {
                    self.poison();
                    return Err(AdbError::Protocol(format!(
                        "expected DATA/DONE in RECV, got {other:?}"
                    )));
                }
            }
        }
        self.end_command();
        Ok(data)
    }

    /// SEND: push `data` to `remote_path` with POSIX mode bits `mode`,
    /// stamping `mtime` (seconds since epoch) into the closing DONE frame.
    /// Splits `data` into <= 64 KiB DATA frames; the 64 KiB cap is a hard
    /// limit on outgoing frames, never on the total transfer size.
    pub async fn send(
        &mut self,
        remote_path: &str,
        mode: u32,
        data: &[u8],
        mtime: u32,
    ) -> AdbResult<()> {
        self.begin_command()?;
        let req = encode_send_request(remote_path, mode);
        if let Err(e) = self.framer.write_raw(&req).await {
            self.poison();
            return Err(e);
        }

        for chunk in data.chunks(SYNC_DATA_MAX as usize) {
            let msg = encode_data_chunk(chunk);
            if let Err(e) = self.framer.write_raw(&msg).await {
                self.poison();
                return Err(e);
            }
        }
        if let Err(e) = self.framer.write_raw(&encode_done(mtime)).await {
            self.poison();
            return Err(e);
        }

        let header = match self.framer.read_sync_header().await {
            Ok(h) => h,
            Err(e) => {
                self.poison();
                return Err(e);
            }
        };
        let result = match header.id {
            SyncId::Okay => Ok(()),
            SyncId::Fail => Err(self.read_message_or_fail(&header).await?),
            other => {
                self.poison();
                Err(AdbError::Protocol(format!(
                    "expected OKAY after SEND, got {other:?}"
                )))
            }
        };
        self.end_command();
        result
    }

    /// Cancel-aware `stat`. Cancellation closes the transport and reports
    /// `Timeout`; the session is left `Poisoned` since the underlying stream
    /// is no longer usable.
    pub async fn stat_cancellable(
        &mut self,
        remote_path: &str,
        token: &tokio_util::sync::CancellationToken,
    ) -> AdbResult<StatResponse> {
        self.begin_command()?;
        let req = encode_stat_request(remote_path);
        if let Err(e) = self.framer.write_raw_cancellable(&req, token).await {
            self.poison();
            return Err(e);
        }
        let (header, payload) = match self.framer.sync_read_frame_cancellable(token).await {
            Ok(v) => v,
            Err(e) => {
                self.poison();
                return Err(e);
            }
        };
        let result = match header.id {
            SyncId::Stat => StatResponse::from_bytes(&payload),
            SyncId::Fail => {
                self.poison();
                Err(AdbError::from_server_fail(
                    String::from_utf8_lossy(&payload).to_string(),
                    true,
                ))
            }
            other => {
                self.poison();
                Err(AdbError::Protocol(format!(
                    "expected STAT response, got {other:?}"
                )))
            }
        };
        self.end_command();
        result
    }

    /// Cancel-aware `recv`. Checked between DATA frames, so cancellation of a
    /// large pull resolves at the next frame boundary rather than only at
    /// the start.
    pub async fn recv_cancellable(
        &mut self,
        remote_path: &str,
        token: &tokio_util::sync::CancellationToken,
    ) -> AdbResult<Vec<u8>> {
        self.begin_command()?;
        let req = encode_recv_request(remote_path);
        if let Err(e) = self.framer.write_raw_cancellable(&req, token).await {
            self.poison();
            return Err(e);
        }

        let mut data = Vec::new();
        loop {
            let (header, payload) = match self.framer.sync_read_frame_cancellable(token).await {
                Ok(v) => v,
                Err(e) => {
                    self.poison();
                    return Err(e);
                }
            };
            match header.id {
                SyncId::Data => data.extend_from_slice(&payload),
                SyncId::Done => break,
                SyncId::Fail => {
                    self.poison();
                    return Err(AdbError::from_server_fail(
                        String::from_utf8_lossy(&payload).to_string(),
                        true,
                    ));
                }
                other => {
                    self.poison();
                    return Err(AdbError::Protocol(format!(
                        "expected DATA/DONE in RECV, got {other:?}"
                    )));
                }
            }
        }
        self.end_command();
        Ok(data)
    }

    /// Cancel-aware `list`. Checked between DENT frames, same rationale as
    /// `recv_cancellable`.
    pub async fn list_cancellable(
        &mut self,
        remote_path: &str,
        token: &tokio_util::sync::CancellationToken,
    ) -> AdbResult<Vec<DentEntry>> {
        self.begin_command()?;
        let req = encode_list_request(remote_path);
        if let Err(e) = self.framer.write_raw_cancellable(&req, token).await {
            self.poison();
            return Err(e);
        }

        let mut entries = Vec::new();
        loop {
            let (header, payload) = match self.framer.sync_read_frame_cancellable(token).await {
                Ok(v) => v,
                Err(e) => {
                    self.poison();
                    return Err(e);
                }
            };
            match header.id {
                SyncId::Dent => entries.push(DentEntry::from_bytes(&payload)?),
                SyncId::Done => break,
                SyncId::Fail => {
                    self.poison();
                    return Err(AdbError::from_server_fail(
                        String::from_utf8_lossy(&payload).to_string(),
                        true,
                    ));
                }
                other => {
                    self.poison();
                    return Err(AdbError::Protocol(format!(
                        "unexpected sync ID in LIST response: {other:?}"
                    )));
                }
            }
        }
        self.end_command();
        Ok(entries)
    }

    /// Cancel-aware `send`. Checked between DATA frames, so cancelling a
    /// large push stops at the next chunk boundary instead of blocking for
    /// the whole transfer.
    pub async fn send_cancellable(
        &mut self,
        remote_path: &str,
        mode: u32,
        data: &[u8],
        mtime: u32,
        token: &tokio_util::sync::CancellationToken,
    ) -> AdbResult<()> {
        self.begin_command()?;
        let req = encode_send_request(remote_path, mode);
        if let Err(e) = self.framer.write_raw_cancellable(&req, token).await {
            self.poison();
            return Err(e);
        }

        for chunk in data.chunks(SYNC_DATA_MAX as usize) {
            let msg = encode_data_chunk(chunk);
            if let Err(e) = self.framer.write_raw_cancellable(&msg, token).await {
                self.poison();
                return Err(e);
            }
        }
        if let Err(e) = self
            .framer
            .write_raw_cancellable(&encode_done(mtime), token)
            .await
        {
            self.poison();
            return Err(e);
        }

        let (header, payload) = match self.framer.sync_read_frame_cancellable(token).await {
            Ok(v) => v,
            Err(e) => {
                self.poison();
                return Err(e);
            }
        };
        let result = match header.id {
            SyncId::Okay => Ok(()),
            SyncId::Fail => {
                self.poison();
                Err(AdbError::from_server_fail(
                    String::from_utf8_lossy(&payload).to_string(),
                    true,
                ))
            }
            other => {
                self.poison();
                Err(AdbError::Protocol(format!(
                    "expected OKAY after SEND, got {other:?}"
                )))
            }
        };
        self.end_command();
        result
    }

    /// QUIT: sent before closing a session that will not be reused. Optional
    /// — dropping the session without calling this is fine if the transport
    /// is about to be closed anyway.
    pub async fn quit(&mut self) -> AdbResult<()> {
        self.framer.write_raw(&encode_quit()).await
    }

    /// Consume the session, returning the underlying framer. Used when the
    /// caller wants to close the transport explicitly.
    pub fn into_framer(self) -> crate::framer::Framer {
        self.framer
    }
}


#[cfg(test)]
mod sync_session_tests {
    use super::*;
    use crate::framer::Framer;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    async fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept_fut = listener.accept();
        let connect_fut = TcpStream::connect(addr);
        let (accepted, client) = tokio::join!(accept_fut, connect_fut);
        (accepted.unwrap().0, client.unwrap())
    }

    #[tokio::test]
    async fn test_send_splits_large_payload_into_two_data_frames() {
        let (mut server, client) = connected_pair().await;

        let data_len = 100 * 1024usize;
        let payload: Vec<u8> = (0..data_len).map(|i| (i % 251) as u8).collect();
        let payload_for_server = payload.clone();

        let server_task = tokio::spawn(async move {
            // Read SEND header + "<path>,<mode>" payload.
            let mut header = [0u8; 8];
            server.read_exact(&mut header).await.unwrap();
            assert_eq!(&header[0..4], b"SEND");
            let send_len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
            let mut send_payload = vec![0u8; send_len as usize];
            server.read_exact(&mut send_payload).await.unwrap();

            // Read two DATA frames of 65536 and 34464 bytes.
            let mut received = Vec::new();
            let mut frame_sizes = Vec::new();
            loop {
                let mut h = [0u8; 8];
                server.read_exact(&mut h).await.unwrap();
                let len = u32::from_le_bytes([h[4], h[5], h[6], h[7]]);
                if &h[0..4] == b"DONE" {
                    break;
                }
                assert_eq!(&h[0..4], b"DATA");
                frame_sizes.push(len);
                let mut buf = vec![0u8; len as usize];
                server.read_exact(&mut buf).await.unwrap();
                received.extend_from_slice(&buf);
            }

            assert_eq!(frame_sizes, vec![65536, 34464]);
            assert_eq!(received, payload_for_server);

            server.write_all(b"OKAY\0\0\0\0").await.unwrap();
        });

        let mut session = SyncSession::new(Framer::from_stream(client));
        session
            .send("/tmp/x", 0o100644, &payload, 1_700_000_000)
            .await
            .unwrap();

        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_stat_reads_fixed_reply() {
        let (mut server, client) = connected_pair().await;

        let server_task = tokio::spawn(async move {
            let mut req = [0u8; 8 + 6];
            server.read_exact(&mut req).await.unwrap();
            let mut resp = Vec::new();
            resp.extend_from_slice(b"STAT");
            resp.extend_from_slice(&33188u32.to_le_bytes());
            resp.extend_from_slice(&102400u32.to_le_bytes());
            resp.extend_from_slice(&1_700_000_000u32.to_le_bytes());
            server.write_all(&resp).await.unwrap();
        });

        let mut session = SyncSession::new(Framer::from_stream(client));
        let stat = session.stat("/tmp/x").await.unwrap();
        assert_eq!(stat.mode, 33188);
        assert_eq!(stat.size, 102400);
        assert_eq!(stat.mtime, 1_700_000_000);

        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_fail_frame_poisons_session() {
        let (mut server, client) = connected_pair().await;

        let server_task = tokio::spawn(async move {
            let mut req = [0u8; 8 + 6];
            server.read_exact(&mut req).await.unwrap();
            let msg = b"/tmp/x: No such file or directory";
            let mut resp = Vec::new();
            resp.extend_from_slice(b"FAIL");
            resp.extend_from_slice(&(msg.len() as u32).to_le_bytes());
            resp.extend_from_slice(msg);
            server.write_all(&resp).await.unwrap();
        });

        let mut session = SyncSession::new(Framer::from_stream(client));
        let err = session.stat("/tmp/x").await.unwrap_err();
        assert!(matches!(err, AdbError::FileNoExist(_)));

        // Session is now poisoned; reuse is an assertion violation, not a
        // silent reconnect.
        let err2 = session.stat("/tmp/y").await.unwrap_err();
        assert!(matches!(err2, AdbError::AssertionViolation(_)));

        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_list_collects_until_done() {
        let (mut server, client) = connected_pair().await;

        let server_task = tokio::spawn(async move {
            let mut req = [0u8; 8 + 1];
            server.read_exact(&mut req).await.unwrap();

            for name in ["a.txt", "b.txt"] {
                let mut frame = Vec::new();
                frame.extend_from_slice(b"DENT");
                let body_len = 16 + name.len();
                frame.extend_from_slice(&(body_len as u32).to_le_bytes());
                frame.extend_from_slice(&0o100644u32.to_le_bytes());
                frame.extend_from_slice(&10u32.to_le_bytes());
                frame.extend_from_slice(&1_700_000_000u32.to_le_bytes());
                frame.extend_from_slice(&(name.len() as u32).to_le_bytes());
                frame.extend_from_slice(name.as_bytes());
                server.write_all(&frame).await.unwrap();
            }
            server.write_all(b"DONE\0\0\0\0").await.unwrap();
        });

        let mut session = SyncSession::new(Framer::from_stream(client));
        let entries = session.list("/").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "a.txt");
        assert_eq!(entries[1].name, "b.txt");

        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_stat_cancellable_returns_promptly_on_stalled_server() {
        use tokio_util::sync::CancellationToken;

        let (_server, client) = connected_pair().await; // never writes anything

        let mut session = SyncSession::new(Framer::from_stream(client));
        let token = CancellationToken::new();
        let token2 = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            token2.cancel();
        });

        let start = std::time::Instant::now();
        let err = session
            .stat_cancellable("/tmp/x", &token)
            .await
            .unwrap_err();
        assert!(matches!(err, AdbError::Timeout));
        assert!(start.elapsed() < std::time::Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_send_cancellable_stops_between_frames() {
        use tokio_util::sync::CancellationToken;

        let (mut server, client) = connected_pair().await;
        let token = CancellationToken::new();
        let token2 = token.clone();

        let data_len = 200 * 1024usize;
        let payload: Vec<u8> = (0..data_len).map(|i| (i % 251) as u8).collect();

        let server_task = tokio::spawn(async move {
            let mut header = [0u8; 8];
            server.read_exact(&mut header).await.unwrap();
            let send_len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
            let mut send_payload = vec![0u8; send_len as usize];
            server.read_exact(&mut send_payload).await.unwrap();

            // Read only the first DATA frame, then stall without an OKAY.
            let mut h = [0u8; 8];
            server.read_exact(&mut h).await.unwrap();
            let len = u32::from_le_bytes([h[4], h[5], h[6], h[7]]);
            let mut buf = vec![0u8; len as usize];
            server.read_exact(&mut buf).await.unwrap();

            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        });

        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(30)).await;
            token2.cancel();
        });

        let mut session = SyncSession::new(Framer::from_stream(client));
        let start = std::time::Instant::now();
        let err = session
            .send_cancellable("/tmp/x", 0o100644, &payload, 1_700_000_000, &token)
            .await
            .unwrap_err();
        assert!(matches!(err, AdbError::Timeout));
        assert!(start.elapsed() < std::time::Duration::from_secs(2));

        server_task.abort();
    }

    #[tokio::test]
    async fn test_list_cancellable_stops_between_frames() {
        use tokio_util::sync::CancellationToken;

        let (mut server, client) = connected_pair().await;
        let token = CancellationToken::new();
        let token2 = token.clone();

        let server_task = tokio::spawn(async move {
            let mut req = [0u8; 8 + 1];
            server.read_exact(&mut req).await.unwrap();

            let name = "a.txt";
            let mut frame = Vec::new();
            frame.extend_from_slice(b"DENT");
            let body_len = 16 + name.len();
            frame.extend_from_slice(&(body_len as u32).to_le_bytes());
            frame.extend_from_slice(&0o100644u32.to_le_bytes());
            frame.extend_from_slice(&10u32.to_le_bytes());
            frame.extend_from_slice(&1_700_000_000u32.to_le_bytes());
            frame.extend_from_slice(&(name.len() as u32).to_le_bytes());
            frame.extend_from_slice(name.as_bytes());
            server.write_all(&frame).await.unwrap();

            // Stall instead of sending DONE.
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        });

        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(30)).await;
            token2.cancel();
        });

        let mut session = SyncSession::new(Framer::from_stream(client));
        let start = std::time::Instant::now();
        let err = session.list_cancellable("/", &token).await.unwrap_err();
        assert!(matches!(err, AdbError::Timeout));
        assert!(start.elapsed() < std::time::Duration::from_secs(2));

        server_task.abort();
    }

    #[tokio::test]
    async fn test_recv_cancellable_stops_between_frames() {
        use tokio_util::sync::CancellationToken;

        let (mut server, client) = connected_pair().await;
        let token = CancellationToken::new();
        let token2 = token.clone();

        let server_task = tokio::spawn(async move {
            let mut req = [0u8; 8 + 6];
            server.read_exact(&mut req).await.unwrap();
            // Send one DATA frame promptly, then stall without sending DONE.
            let frame = encode_data_chunk(b"partial");
            server.write_all(&frame).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        });

        // Cancel independently of the server, after the first frame has had
        // time to arrive -- exercises cancellation observed between frames
        // rather than at the very first read.
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(30)).await;
            token2.cancel();
        });

        let mut session = SyncSession::new(Framer::from_stream(client));
        let start = std::time::Instant::now();
        let err = session
            .recv_cancellable("/tmp/x", &token)
            .await
            .unwrap_err();
        assert!(matches!(err, AdbError::Timeout));
        assert!(start.elapsed() < std::time::Duration::from_secs(2));

        server_task.abort();
    }
}
