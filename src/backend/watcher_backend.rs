use std::sync::Arc;

use crate::backend::FileSystem;
use crate::handle::FileHandle;
use crate::watcher::{FileEvent, RecursiveMode, WatcherError};

/// Receives decoded events while a backend is inside `watch`.
pub type EventSink<'a> = dyn FnMut(&FileHandle, FileEvent) + 'a;

/// A source of change notifications for one file system.
///
/// Backends are shared between a watcher and its registrars, so every method
/// takes `&self`; the registration table lives behind a lock. `add` must wake
/// a concurrent `watch` so the new registration takes effect immediately.
pub trait FileWatcherBackend: Send + Sync {
    fn file_system(&self) -> Arc<dyn FileSystem>;

    /// Registers `dir` for `events`. With [`RecursiveMode::Recursive`] every
    /// existing subdirectory is registered too, and subdirectories created
    /// later are picked up as their creation is observed.
    fn add(
        &self,
        dir: &FileHandle,
        events: FileEvent,
        mode: RecursiveMode,
    ) -> Result<(), WatcherError>;

    /// Blocks until at least one event arrives, the timeout elapses or a
    /// registration change interrupts the wait. A negative timeout waits
    /// indefinitely. Every decoded event is passed to `sink` before returning.
    fn watch(&self, timeout_ms: i32, sink: &mut EventSink<'_>) -> Result<(), WatcherError>;

    /// Wakes a blocked `watch` without delivering an event.
    fn interrupt(&self);
}
