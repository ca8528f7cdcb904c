//! Entry points: opening locators and the digest / encoding helpers used by
//! [`FileHandle`].

use std::io::Read;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha1::{Digest, Sha1};
use tracing::debug;

use crate::backend::{FileSystem, OpenMode};
use crate::config::{Locator, LoginCredentials, RemoteLocator};
use crate::handle::FileHandle;
use crate::local::LocalFileSystem;
use crate::remote::{SessionConfig, SshFileSystem};

const DEFAULT_SSH_PORT: u16 = 22;

/// Opens `locator`.
///
/// `ssh://` and `sftp://` locators connect to the server they name, filling
/// in whatever the locator leaves out from `credentials`. Everything else is a
/// path on the shared local file system.
pub fn open(locator: &str, credentials: Option<&LoginCredentials>) -> FileHandle {
    match Locator::parse(locator) {
        Locator::Local(path) => local_fs().open(&path),
        Locator::Remote(remote) => {
            let path = remote.path.clone();
            let config = session_config(remote, credentials);
            debug!("Opening {} on {}@{}:{}", path, config.username, config.host, config.port);
            let fs = SshFileSystem::connect(config);
            fs.open(&path)
        }
    }
}

/// The process-wide local file system.
pub fn local_fs() -> Arc<LocalFileSystem> {
    static LOCAL: OnceLock<Arc<LocalFileSystem>> = OnceLock::new();
    LOCAL.get_or_init(LocalFileSystem::new).clone()
}

fn session_config(remote: RemoteLocator, credentials: Option<&LoginCredentials>) -> SessionConfig {
    let setting = |key: &str| {
        credentials
            .filter(|credentials| credentials.is_set(key))
            .map(|credentials| credentials.value(key).to_string())
    };

    if setting("publicKey").is_some() {
        debug!("Ignoring publicKey, the public half is derived from privateKey");
    }

    let port = remote
        .port
        .or_else(|| setting("port").and_then(|port| port.trim().parse().ok()))
        .unwrap_or(DEFAULT_SSH_PORT);
    let username = remote
        .username
        .or_else(|| setting("username"))
        .unwrap_or_else(current_user);
    let password = remote.password.or_else(|| setting("password"));
    let private_key = setting("privateKey")
        .map(|path| expand_home(&path))
        .or_else(|| dirs::home_dir().map(|home| home.join(".ssh").join("id_rsa")));

    SessionConfig {
        host: remote.host,
        port,
        username,
        password,
        private_key,
    }
}

fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_default()
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Hex SHA-1 of the file behind `handle`, empty if it is not a readable file.
pub fn sha1(handle: &FileHandle) -> String {
    if !handle.is_file() {
        return String::new();
    }
    let Some(mut input) = handle.create_input_stream(OpenMode::binary()) else {
        return String::new();
    };

    let mut hasher = Sha1::new();
    let mut buffer = [0u8; 16 * 1024];
    loop {
        match input.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buffer[..n]),
            Err(e) => {
                debug!("Failed to hash {}: {}", handle.path(), e);
                return String::new();
            }
        }
    }
    hash_to_string(&hasher.finalize())
}

pub fn sha1_of(data: &[u8]) -> String {
    hash_to_string(&Sha1::digest(data))
}

pub fn base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decodes standard base64, `None` if `encoded` is malformed.
pub fn from_base64(encoded: &str) -> Option<Vec<u8>> {
    STANDARD.decode(encoded.trim()).ok()
}

/// Lowercase hex, two digits per byte.
pub fn hash_to_string(hash: &[u8]) -> String {
    hash.iter().map(|byte| format!("{:02x}", byte)).collect()
}
