use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::Arc;

use russh::Disconnect;
use russh::client::{self, Config, Handle};
use russh::keys::{HashAlg, PrivateKeyWithHashAlg, PublicKey, load_secret_key};
use russh_sftp::client::SftpSession as SftpClient;
use russh_sftp::client::fs::File;
use russh_sftp::protocol::{FileAttributes, OpenFlags};
use snafu::{OptionExt, ResultExt};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info, warn};

use crate::remote::session::{
    AuthenticateSnafu, ConnectSnafu, LoadKeySnafu, RuntimeSnafu, SftpSnafu, SshSnafu,
    SubsystemSnafu, TransferSnafu, UnknownFileSnafu,
};
use crate::remote::{
    FileAccess, RemoteAttributes, RemoteFileId, RemoteFileType, RemoteSession, SessionError,
};

const TYPE_MASK: u32 = 0o170000;
const TYPE_DIRECTORY: u32 = 0o040000;
const TYPE_FILE: u32 = 0o100000;
const TYPE_SYMLINK: u32 = 0o120000;

/// Where and as whom to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    /// Password for password authentication, also tried as passphrase of
    /// the private key.
    pub password: Option<String>,
    pub private_key: Option<PathBuf>,
}

struct ClientHandler;

impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        // TODO: verify against ~/.ssh/known_hosts
        warn!(
            "Accepting server key {} without verification",
            server_public_key.fingerprint(HashAlg::Sha256)
        );
        Ok(true)
    }
}

/// A [`RemoteSession`] speaking SFTP over an SSH connection.
///
/// The async client is driven by a single-threaded runtime owned by the
/// session, so every call blocks the caller until the server answered.
pub struct SftpSession {
    connection: Handle<ClientHandler>,
    sftp: SftpClient,
    files: HashMap<RemoteFileId, File>,
    next_file: RemoteFileId,
    // Dropped last: the connection task runs on it.
    runtime: Runtime,
}

impl SftpSession {
    /// Connects, authenticates (public key first, then password) and starts
    /// the SFTP subsystem.
    pub fn connect(config: &SessionConfig) -> Result<Self, SessionError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .context(RuntimeSnafu)?;

        let (connection, sftp) = runtime.block_on(establish(config))?;
        info!("Connected to {}@{}:{}", config.username, config.host, config.port);

        Ok(Self {
            connection,
            sftp,
            files: HashMap::new(),
            next_file: 1,
            runtime,
        })
    }

    fn attributes(
        &self,
        operation: &'static str,
        path: &str,
        follow: bool,
    ) -> Result<RemoteAttributes, SessionError> {
        let meta = if follow {
            self.runtime.block_on(self.sftp.metadata(path))
        } else {
            self.runtime.block_on(self.sftp.symlink_metadata(path))
        }
        .context(SftpSnafu { operation, path })?;
        Ok(convert(&meta))
    }

    fn set_metadata(&self, path: &str, attrs: FileAttributes) -> Result<(), SessionError> {
        self.runtime
            .block_on(self.sftp.set_metadata(path, attrs))
            .context(SftpSnafu {
                operation: "change attributes of",
                path,
            })
    }
}

async fn establish(
    config: &SessionConfig,
) -> Result<(Handle<ClientHandler>, SftpClient), SessionError> {
    let mut connection = client::connect(
        Arc::new(Config::default()),
        (config.host.as_str(), config.port),
        ClientHandler,
    )
    .await
    .context(ConnectSnafu {
        host: config.host.as_str(),
        port: config.port,
    })?;

    if !authenticate(&mut connection, config).await? {
        return AuthenticateSnafu {
            user: config.username.as_str(),
        }
        .fail();
    }

    let channel = connection
        .channel_open_session()
        .await
        .context(SshSnafu {
            request: "open session channel",
        })?;
    channel
        .request_subsystem(true, "sftp")
        .await
        .context(SshSnafu {
            request: "start sftp subsystem",
        })?;

    let sftp = SftpClient::new(channel.into_stream())
        .await
        .context(SubsystemSnafu)?;
    Ok((connection, sftp))
}

async fn authenticate(
    connection: &mut Handle<ClientHandler>,
    config: &SessionConfig,
) -> Result<bool, SessionError> {
    if let Some(path) = config.private_key.as_ref() {
        match load_secret_key(path, config.password.as_deref()).context(LoadKeySnafu { path }) {
            Ok(key) => {
                let hash = connection
                    .best_supported_rsa_hash()
                    .await
                    .ok()
                    .flatten()
                    .flatten();
                let result = connection
                    .authenticate_publickey(
                        config.username.as_str(),
                        PrivateKeyWithHashAlg::new(Arc::new(key), hash),
                    )
                    .await
                    .context(SshSnafu {
                        request: "public key authentication",
                    })?;
                if result.success() {
                    return Ok(true);
                }
                debug!("Server rejected key {}", path.display());
            }
            Err(e) => debug!("{}", e),
        }
    }

    if let Some(password) = config.password.as_ref() {
        let result = connection
            .authenticate_password(config.username.as_str(), password.as_str())
            .await
            .context(SshSnafu {
                request: "password authentication",
            })?;
        return Ok(result.success());
    }

    Ok(false)
}

fn convert(meta: &FileAttributes) -> RemoteAttributes {
    let mode = meta.permissions.unwrap_or(0);
    let file_type = match mode & TYPE_MASK {
        TYPE_DIRECTORY => RemoteFileType::Directory,
        TYPE_FILE => RemoteFileType::File,
        TYPE_SYMLINK => RemoteFileType::Symlink,
        _ => RemoteFileType::Other,
    };

    RemoteAttributes {
        file_type,
        size: meta.size.unwrap_or(0),
        access_time: meta.atime.map_or(0, u64::from),
        modification_time: meta.mtime.map_or(0, u64::from),
        user_id: meta.uid.unwrap_or(0),
        group_id: meta.gid.unwrap_or(0),
        permissions: mode & !TYPE_MASK,
    }
}

impl RemoteSession for SftpSession {
    fn read_dir(&mut self, path: &str) -> Result<Vec<String>, SessionError> {
        let entries = self
            .runtime
            .block_on(self.sftp.read_dir(path))
            .context(SftpSnafu {
                operation: "list",
                path,
            })?;

        Ok(entries
            .map(|entry| entry.file_name())
            .filter(|name| name != "." && name != "..")
            .collect())
    }

    fn stat(&mut self, path: &str) -> Result<RemoteAttributes, SessionError> {
        self.attributes("stat", path, true)
    }

    fn lstat(&mut self, path: &str) -> Result<RemoteAttributes, SessionError> {
        self.attributes("lstat", path, false)
    }

    fn set_owner(&mut self, path: &str, uid: u32, gid: u32) -> Result<(), SessionError> {
        let mut attrs = FileAttributes::empty();
        attrs.uid = Some(uid);
        attrs.gid = Some(gid);
        self.set_metadata(path, attrs)
    }

    fn set_permissions(&mut self, path: &str, mode: u32) -> Result<(), SessionError> {
        let mut attrs = FileAttributes::empty();
        attrs.permissions = Some(mode);
        self.set_metadata(path, attrs)
    }

    fn open(&mut self, path: &str, access: FileAccess) -> Result<RemoteFileId, SessionError> {
        let flags = match access {
            FileAccess::Read => OpenFlags::READ,
            FileAccess::Write => OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE,
            FileAccess::Append => OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::APPEND,
        };

        let file = self
            .runtime
            .block_on(self.sftp.open_with_flags(path, flags))
            .context(SftpSnafu {
                operation: "open",
                path,
            })?;

        let id = self.next_file;
        self.next_file += 1;
        self.files.insert(id, file);
        Ok(id)
    }

    fn read(
        &mut self,
        file: RemoteFileId,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<usize, SessionError> {
        let handle = self
            .files
            .get_mut(&file)
            .context(UnknownFileSnafu { id: file })?;

        self.runtime
            .block_on(async {
                handle.seek(SeekFrom::Start(offset)).await?;
                handle.read(buf).await
            })
            .context(TransferSnafu {
                operation: "read",
                id: file,
            })
    }

    fn write(
        &mut self,
        file: RemoteFileId,
        offset: u64,
        data: &[u8],
    ) -> Result<usize, SessionError> {
        let handle = self
            .files
            .get_mut(&file)
            .context(UnknownFileSnafu { id: file })?;

        self.runtime
            .block_on(async {
                handle.seek(SeekFrom::Start(offset)).await?;
                handle.write_all(data).await?;
                handle.flush().await
            })
            .context(TransferSnafu {
                operation: "write",
                id: file,
            })?;
        Ok(data.len())
    }

    fn file_size(&mut self, file: RemoteFileId) -> Result<u64, SessionError> {
        let handle = self
            .files
            .get(&file)
            .context(UnknownFileSnafu { id: file })?;

        let meta = self
            .runtime
            .block_on(handle.metadata())
            .context(SftpSnafu {
                operation: "stat",
                path: format!("open file {}", file),
            })?;
        Ok(meta.size.unwrap_or(0))
    }

    fn close(&mut self, file: RemoteFileId) -> Result<(), SessionError> {
        let mut handle = self
            .files
            .remove(&file)
            .context(UnknownFileSnafu { id: file })?;

        self.runtime
            .block_on(handle.shutdown())
            .context(TransferSnafu {
                operation: "close",
                id: file,
            })
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), SessionError> {
        self.runtime
            .block_on(self.sftp.rename(from, to))
            .context(SftpSnafu {
                operation: "rename",
                path: from,
            })
    }

    fn create_dir(&mut self, path: &str, mode: u32) -> Result<(), SessionError> {
        self.runtime
            .block_on(self.sftp.create_dir(path))
            .context(SftpSnafu {
                operation: "create directory",
                path,
            })?;

        if let Err(e) = self.set_permissions(path, mode) {
            debug!("{}", e);
        }
        Ok(())
    }

    fn remove_dir(&mut self, path: &str) -> Result<(), SessionError> {
        self.runtime
            .block_on(self.sftp.remove_dir(path))
            .context(SftpSnafu {
                operation: "remove directory",
                path,
            })
    }

    fn remove_file(&mut self, path: &str) -> Result<(), SessionError> {
        self.runtime
            .block_on(self.sftp.remove_file(path))
            .context(SftpSnafu {
                operation: "remove",
                path,
            })
    }

    fn symlink(&mut self, target: &str, link: &str) -> Result<(), SessionError> {
        self.runtime
            .block_on(self.sftp.symlink(link, target))
            .context(SftpSnafu {
                operation: "create symbolic link",
                path: link,
            })
    }
}

impl Drop for SftpSession {
    fn drop(&mut self) {
        let open: Vec<RemoteFileId> = self.files.keys().copied().collect();
        for file in open {
            if let Err(e) = self.close(file) {
                debug!("{}", e);
            }
        }

        let goodbye = self
            .connection
            .disconnect(Disconnect::ByApplication, "", "en");
        if let Err(e) = self.runtime.block_on(goodbye) {
            debug!("Failed to disconnect cleanly: {}", e);
        }
    }
}
