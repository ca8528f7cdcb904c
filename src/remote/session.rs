use std::io;
use std::path::PathBuf;

use russh_sftp::client::error::Error as SftpError;
use russh_sftp::protocol::StatusCode;
use snafu::Snafu;

/// Identifies a file opened through a [`RemoteSession`].
pub type RemoteFileId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemoteFileType {
    #[default]
    Other,
    File,
    Directory,
    Symlink,
}

/// The subset of SFTP attributes the handle backend exposes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteAttributes {
    pub file_type: RemoteFileType,
    pub size: u64,
    pub access_time: u64,
    pub modification_time: u64,
    pub user_id: u32,
    pub group_id: u32,
    /// Mode bits without the file type.
    pub permissions: u32,
}

/// How a remote file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAccess {
    Read,
    /// Create if missing and truncate.
    Write,
    /// Create if missing and write at the end.
    Append,
}

/// A connected, path-keyed file transfer session.
///
/// Calls block until the server answered. Errors for which
/// [`SessionError::is_fatal`] holds mean the session is unusable.
pub trait RemoteSession: Send {
    /// Entry names of `path`, `.` and `..` excluded.
    fn read_dir(&mut self, path: &str) -> Result<Vec<String>, SessionError>;

    fn stat(&mut self, path: &str) -> Result<RemoteAttributes, SessionError>;

    /// Like [`RemoteSession::stat`] without following a final symbolic link.
    fn lstat(&mut self, path: &str) -> Result<RemoteAttributes, SessionError>;

    fn set_owner(&mut self, path: &str, uid: u32, gid: u32) -> Result<(), SessionError>;

    fn set_permissions(&mut self, path: &str, mode: u32) -> Result<(), SessionError>;

    fn open(&mut self, path: &str, access: FileAccess) -> Result<RemoteFileId, SessionError>;

    fn read(
        &mut self,
        file: RemoteFileId,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<usize, SessionError>;

    fn write(
        &mut self,
        file: RemoteFileId,
        offset: u64,
        data: &[u8],
    ) -> Result<usize, SessionError>;

    /// Current size of an open file.
    fn file_size(&mut self, file: RemoteFileId) -> Result<u64, SessionError>;

    fn close(&mut self, file: RemoteFileId) -> Result<(), SessionError>;

    fn rename(&mut self, from: &str, to: &str) -> Result<(), SessionError>;

    fn create_dir(&mut self, path: &str, mode: u32) -> Result<(), SessionError>;

    fn remove_dir(&mut self, path: &str) -> Result<(), SessionError>;

    fn remove_file(&mut self, path: &str) -> Result<(), SessionError>;

    /// Creates a symbolic link at `link` pointing to `target`.
    fn symlink(&mut self, target: &str, link: &str) -> Result<(), SessionError>;

    /// Creates a hard link at `link` to `target`. SFTP has no portable request
    /// for this, so sessions refuse it unless they override it.
    fn hard_link(&mut self, target: &str, link: &str) -> Result<(), SessionError> {
        let _ = (target, link);
        UnsupportedSnafu {
            operation: "hard links",
        }
        .fail()
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SessionError {
    #[snafu(display("Failed to start the SSH runtime"))]
    Runtime { source: io::Error },

    #[snafu(display("Failed to connect to {}:{}", host, port))]
    Connect {
        host: String,
        port: u16,
        source: russh::Error,
    },

    #[snafu(display("Failed to load private key {}", path.display()))]
    LoadKey {
        path: PathBuf,
        source: russh::keys::Error,
    },

    #[snafu(display("The server rejected every authentication method for {}", user))]
    Authenticate { user: String },

    #[snafu(display("SSH request failed: {}", request))]
    Ssh {
        request: &'static str,
        source: russh::Error,
    },

    #[snafu(display("Failed to start the SFTP subsystem"))]
    Subsystem { source: SftpError },

    #[snafu(display("Failed to {} {}", operation, path))]
    Sftp {
        operation: &'static str,
        path: String,
        source: SftpError,
    },

    #[snafu(display("Failed to {} remote file {}", operation, id))]
    Transfer {
        operation: &'static str,
        id: RemoteFileId,
        source: io::Error,
    },

    #[snafu(display("No open remote file with id {}", id))]
    UnknownFile { id: RemoteFileId },

    #[snafu(display("No such remote entry {}", path))]
    NotFound { path: String },

    #[snafu(display("The server refused to {} {}", operation, path))]
    Refused {
        operation: &'static str,
        path: String,
    },

    #[snafu(display("{} are not supported by this session", operation))]
    Unsupported { operation: &'static str },

    #[snafu(display("The remote session is closed"))]
    Closed,
}

impl SessionError {
    /// Whether the session that produced this error has to be replaced.
    pub fn is_fatal(&self) -> bool {
        match self {
            SessionError::Runtime { .. }
            | SessionError::Connect { .. }
            | SessionError::Ssh { .. }
            | SessionError::Subsystem { .. }
            | SessionError::Closed => true,
            SessionError::Sftp { source, .. } => connection_lost(source),
            SessionError::Transfer { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::NotConnected
                    | io::ErrorKind::TimedOut
            ),
            SessionError::LoadKey { .. }
            | SessionError::Authenticate { .. }
            | SessionError::UnknownFile { .. }
            | SessionError::NotFound { .. }
            | SessionError::Refused { .. }
            | SessionError::Unsupported { .. } => false,
        }
    }
}

fn connection_lost(error: &SftpError) -> bool {
    match error {
        SftpError::Status(status) => matches!(
            status.status_code,
            StatusCode::NoConnection | StatusCode::ConnectionLost
        ),
        SftpError::Timeout | SftpError::IO(_) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connection_problems_are_fatal() {
        assert!(SessionError::Closed.is_fatal());
        assert!(!SessionError::NotFound { path: "/x".into() }.is_fatal());
        assert!(
            SessionError::Transfer {
                operation: "read",
                id: 1,
                source: io::Error::from(io::ErrorKind::BrokenPipe),
            }
            .is_fatal()
        );
        assert!(
            !SessionError::Transfer {
                operation: "read",
                id: 1,
                source: io::Error::from(io::ErrorKind::PermissionDenied),
            }
            .is_fatal()
        );
    }
}
