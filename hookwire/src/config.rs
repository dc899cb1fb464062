//! Peer endpoint resolution.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Environment variable overriding the peer socket path.
pub const ENV_SOCKET: &str = "HOOKWIRE_SOCKET";

/// Subdirectory of the runtime dir holding the socket.
const SOCKET_DIR: &str = "hookwire";

/// Socket file name inside [`SOCKET_DIR`].
const SOCKET_NAME: &str = "peer.sock";

/// Fallback socket name in the temp dir when no runtime dir exists.
const FALLBACK_NAME: &str = "hookwire-peer.sock";

/// Location of the peer's socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Path of the Unix socket.
    path: PathBuf,
}

impl Endpoint {
    /// An endpoint at an explicit socket path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Resolves the endpoint from the environment.
    ///
    /// Search order:
    /// 1. `$HOOKWIRE_SOCKET`, if set and non-empty.
    /// 2. `{runtime_dir}/hookwire/peer.sock` (e.g. `$XDG_RUNTIME_DIR`).
    /// 3. `{temp_dir}/hookwire-peer.sock`.
    pub fn from_env() -> Self {
        resolve(std::env::var_os(ENV_SOCKET), dirs::runtime_dir())
    }

    /// Path of the socket.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::from_env()
    }
}

impl From<PathBuf> for Endpoint {
    fn from(path: PathBuf) -> Self {
        Self::new(path)
    }
}

impl From<&Path> for Endpoint {
    fn from(path: &Path) -> Self {
        Self::new(path)
    }
}

/// Applies the search order to already-read inputs.
fn resolve(var: Option<OsString>, runtime_dir: Option<PathBuf>) -> Endpoint {
    if let Some(path) = var.filter(|v| !v.is_empty()) {
        return Endpoint::new(path);
    }
    match runtime_dir {
        Some(dir) => Endpoint::new(dir.join(SOCKET_DIR).join(SOCKET_NAME)),
        None => Endpoint::new(std::env::temp_dir().join(FALLBACK_NAME)),
    }
}
