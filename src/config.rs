use std::path::PathBuf;
use std::time::Duration;

/// Configuration for reaching the ADB server.
///
/// Mirrors `goadb`'s `ServerConfig`: the host/port the server listens on, an
/// optional path to the `adb` executable (used only by `start_server`), and
/// a per-connect deadline.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host of the ADB server, e.g. `"127.0.0.1"` or `"localhost"`.
    pub host: String,
    /// TCP port of the ADB server.
    pub port: u16,
    /// Path to the `adb` executable. Only consulted by `start_server`.
    pub path_to_adb: Option<PathBuf>,
    /// Deadline applied to each connection attempt.
    pub dial_timeout: Duration,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5037,
            path_to_adb: None,
            dial_timeout: Duration::from_secs(10),
        }
    }
}
