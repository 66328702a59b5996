use thiserror::Error;

/// Errors produced by the ADB client.
///
/// Variants map onto the error kinds a caller needs to branch on
/// programmatically (`DeviceNotFound`, `FileNoExist`, `Timeout`, ...) rather
/// than parsing message text.
#[derive(Error, Debug)]
pub enum AdbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ADB server returned FAIL: {0}")]
    ServerFail(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid response: expected {expected}, got {actual}")]
    InvalidResponse { expected: String, actual: String },

    #[error("No device connected")]
    NoDevice,

    #[error("Multiple devices connected; specify a serial number")]
    MultipleDevices,

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Dialing the server failed with connection-refused (or the platform
    /// equivalent). The caller may start the server and retry.
    #[error("could not reach the ADB server (try starting it): {0}")]
    ServerNotAvailable(String),

    /// Kept distinct from `ServerNotAvailable` so callers pattern-matching
    /// on the historical variant keep working.
    #[error("Connection refused: is the ADB server running? (try 'adb start-server')")]
    ConnectionRefused,

    /// The peer closed the connection before a complete message was read.
    #[error("connection reset by peer during {0}")]
    ConnectionReset(String),

    #[error("Sync protocol error: {0}")]
    SyncError(String),

    /// A sync `FAIL` whose message indicates the remote path does not exist.
    #[error("remote file does not exist: {0}")]
    FileNoExist(String),

    /// A *local* path passed to `push` could not be opened.
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Programmer error: invalid argument or reuse of a poisoned session.
    #[error("assertion violation: {0}")]
    AssertionViolation(String),

    /// A cancellation token's deadline elapsed before the operation completed.
    #[error("operation timed out")]
    Timeout,

    /// Wraps a lower-level error with additional context, forming an
    /// explicit cause chain independent of `std::error::Error::source`.
    #[error("{context}")]
    Context {
        context: String,
        #[source]
        cause: Box<AdbError>,
    },
}

pub type AdbResult<T> = Result<T, AdbError>;

impl AdbError {
    /// Wrap this error with additional context, keeping it as the cause.
    pub fn context(self, context: impl Into<String>) -> AdbError {
        AdbError::Context {
            context: context.into(),
            cause: Box::new(self),
        }
    }

    /// Map a `std::io::Error` from opening a transport into the appropriate
    /// variant: connection-refused becomes `ServerNotAvailable`, everything
    /// else stays `Io`.
    pub fn from_connect_io(err: std::io::Error, addr: &str) -> AdbError {
        match err.kind() {
            std::io::ErrorKind::ConnectionRefused => {
                AdbError::ServerNotAvailable(format!("connection refused to {addr}"))
            }
            _ => AdbError::Io(err),
        }
    }

    /// Re-tag an `AdbServerError`/`ServerFail` per the request-dispatcher
    /// error-mapping rules: `device '<s>' not found` becomes
    /// `DeviceNotFound`; in sync contexts, `No such file or directory`
    /// becomes `FileNoExist`.
    pub fn from_server_fail(message: String, sync_context: bool) -> AdbError {
        if let Some(serial) = extract_device_not_found(&message) {
            return AdbError::DeviceNotFound(serial);
        }
        if sync_context && message.contains("No such file or directory") {
            return AdbError::FileNoExist(message);
        }
        if sync_context {
            AdbError::SyncError(message)
        } else {
            AdbError::ServerFail(message)
        }
    }

    /// Walk the cause chain (both `Context` links and `std::error::Error`
    /// `source()` links), innermost last. Lets a caller ask "is any link a
    /// connection reset" without downcasting by hand.
    pub fn source_chain(&self) -> Vec<&(dyn std::error::Error + 'static)> {
        let mut chain: Vec<&(dyn std::error::Error + 'static)> = vec![self];
        let mut current: &(dyn std::error::Error + 'static) = self;
        while let Some(next) = current.source() {
            chain.push(next);
            current = next;
        }
        chain
    }

    /// True if this error or any link in its cause chain is a connection
    /// reset. The mechanism callers use to decide whether a retry is sane.
    pub fn is_connection_reset(&self) -> bool {
        self.source_chain()
            .iter()
            .any(|e| matches!(e.downcast_ref::<AdbError>(), Some(AdbError::ConnectionReset(_))))
    }

    /// True if this error or any link in its cause chain signals the server
    /// was unreachable.
    pub fn is_server_not_available(&self) -> bool {
        self.source_chain().iter().any(|e| {
            matches!(
                e.downcast_ref::<AdbError>(),
                Some(AdbError::ServerNotAvailable(_)) | Some(AdbError::ConnectionRefused)
            )
        })
    }
}

fn extract_device_not_found(message: &str) -> Option<String> {
    let rest = message.strip_prefix("device '")?;
    let end = rest.find('\'')?;
    if rest[end..].starts_with("' not found") {
        Some(rest[..end].to_string())
    } else {
        None
    }
}
