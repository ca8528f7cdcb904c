//! The SFTP backend: a [`RemoteSession`] protocol seam, the russh-based
//! session behind it, and the handle, iterator and stream types on top.

#[cfg(test)]
mod memory_session;
mod session;
mod sftp_session;
mod ssh_file_handle;
mod ssh_file_iterator;
mod ssh_file_system;
mod stream_buffer;

pub use session::{
    FileAccess, RemoteAttributes, RemoteFileId, RemoteFileType, RemoteSession, SessionError,
};
pub use sftp_session::{SessionConfig, SftpSession};
pub use ssh_file_handle::SshFileHandle;
pub use ssh_file_iterator::SshFileIterator;
pub use ssh_file_system::SshFileSystem;
pub use stream_buffer::{RemoteReader, RemoteWriter};
