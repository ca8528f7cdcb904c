use std::sync::Arc;

use crate::backend::FileWatcherBackend;
use crate::handle::FileHandle;
use crate::watcher::WatcherError;

/// Factory for the handles and watchers of one storage medium.
///
/// Every backend created by a file system keeps an `Arc` to it, so the file
/// system lives as long as anything derived from it.
pub trait FileSystem: Send + Sync {
    /// Opens a handle for `path`. The path does not need to exist.
    fn open(&self, path: &str) -> FileHandle;

    /// Creates the watcher backend suited to this medium. Failing to set up
    /// the native notification primitive is fatal for the watcher.
    fn create_file_watcher(&self) -> Result<Arc<dyn FileWatcherBackend>, WatcherError>;
}

/// Whether two references point at the same file system instance.
pub fn same_file_system(a: &Arc<dyn FileSystem>, b: &Arc<dyn FileSystem>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
