use std::sync::{Arc, Weak};

use crate::backend::{FileSystem, FileWatcherBackend};
use crate::handle::FileHandle;
use crate::local::LocalFileHandle;
use crate::watcher::WatcherError;

/// The file system of the host.
///
/// Always lives inside an `Arc`; handles opened from it keep it alive.
pub struct LocalFileSystem {
    this: Weak<LocalFileSystem>,
}

impl LocalFileSystem {
    /// Creates a new, independent local file system instance.
    ///
    /// Handles from different instances never share native copy or move, so
    /// operations between them take the stream fallback.
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|this| Self { this: this.clone() })
    }

    fn shared(&self) -> Option<Arc<dyn FileSystem>> {
        self.this
            .upgrade()
            .map(|fs| fs as Arc<dyn FileSystem>)
    }
}

impl FileSystem for LocalFileSystem {
    fn open(&self, path: &str) -> FileHandle {
        match self.shared() {
            Some(fs) => FileHandle::new(Box::new(LocalFileHandle::new(fs, path))),
            None => FileHandle::default(),
        }
    }

    #[cfg(target_os = "linux")]
    fn create_file_watcher(&self) -> Result<Arc<dyn FileWatcherBackend>, WatcherError> {
        let fs = self.shared().ok_or(WatcherError::FileSystemGone)?;
        let backend = crate::watcher::InotifyWatcher::new(fs)?;
        Ok(Arc::new(backend))
    }

    #[cfg(not(target_os = "linux"))]
    fn create_file_watcher(&self) -> Result<Arc<dyn FileWatcherBackend>, WatcherError> {
        let fs = self.shared().ok_or(WatcherError::FileSystemGone)?;
        let backend = crate::watcher::PortableWatcher::new(fs)?;
        Ok(Arc::new(backend))
    }
}
