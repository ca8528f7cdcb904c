use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::{info, warn};

use crate::backend::{FileSystem, FileWatcherBackend};
use crate::handle::FileHandle;
use crate::remote::session::ClosedSnafu;
use crate::remote::{RemoteSession, SessionConfig, SessionError, SftpSession, SshFileHandle};
use crate::watcher::{NullWatcher, WatcherError};

type Connector = Box<dyn Fn() -> Result<Box<dyn RemoteSession>, SessionError> + Send + Sync>;

/// A file system on the far side of an SSH connection.
///
/// All handles share one session. When a call fails in a way that leaves the
/// session unusable, the session is dropped and one reconnect is attempted;
/// the failing call itself still reports failure. While no session is open,
/// every operation fails immediately.
pub struct SshFileSystem {
    this: Weak<SshFileSystem>,
    connector: Option<Connector>,
    session: Mutex<Option<Box<dyn RemoteSession>>>,
}

impl SshFileSystem {
    /// Connects over SFTP. A failed connection is logged and leaves the file
    /// system without a session; see [`SshFileSystem::reconnect`].
    pub fn connect(config: SessionConfig) -> Arc<Self> {
        Self::with_connector(move || {
            SftpSession::connect(&config).map(|session| Box::new(session) as Box<dyn RemoteSession>)
        })
    }

    /// Uses `connector` to open sessions, now and on every reconnect.
    pub fn with_connector(
        connector: impl Fn() -> Result<Box<dyn RemoteSession>, SessionError>
            + Send
            + Sync
            + 'static,
    ) -> Arc<Self> {
        let fs = Arc::new_cyclic(|this| Self {
            this: this.clone(),
            connector: Some(Box::new(connector)),
            session: Mutex::new(None),
        });
        fs.reconnect();
        fs
    }

    /// Wraps an already connected session that cannot be re-established.
    pub fn from_session(session: Box<dyn RemoteSession>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            connector: None,
            session: Mutex::new(Some(session)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Option<Box<dyn RemoteSession>>> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_connected(&self) -> bool {
        self.lock().is_some()
    }

    /// Replaces the current session with a fresh one.
    pub fn reconnect(&self) -> bool {
        let Some(connector) = self.connector.as_ref() else {
            return false;
        };

        let fresh = match connector() {
            Ok(session) => {
                info!("Remote session established");
                Some(session)
            }
            Err(e) => {
                warn!("Failed to open remote session: {}", e);
                None
            }
        };

        let connected = fresh.is_some();
        *self.lock() = fresh;
        connected
    }

    pub fn disconnect(&self) {
        self.lock().take();
    }

    /// Runs `op` against the live session.
    pub(crate) fn run<T>(
        &self,
        op: impl FnOnce(&mut dyn RemoteSession) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        let result = {
            let mut session = self.lock();
            let Some(session) = session.as_mut() else {
                return ClosedSnafu.fail();
            };
            op(session.as_mut())
        };

        if let Err(e) = &result {
            if e.is_fatal() {
                warn!("Remote session lost: {}", e);
                self.disconnect();
                self.reconnect();
            }
        }
        result
    }

    pub(crate) fn shared(&self) -> Option<Arc<SshFileSystem>> {
        self.this.upgrade()
    }
}

impl FileSystem for SshFileSystem {
    fn open(&self, path: &str) -> FileHandle {
        match self.shared() {
            Some(fs) => FileHandle::new(Box::new(SshFileHandle::new(fs, path))),
            None => FileHandle::default(),
        }
    }

    /// SFTP cannot push change notifications.
    fn create_file_watcher(&self) -> Result<Arc<dyn FileWatcherBackend>, WatcherError> {
        let fs: Arc<dyn FileSystem> = self.shared().ok_or(WatcherError::FileSystemGone)?;
        Ok(Arc::new(NullWatcher::new(fs)))
    }
}
