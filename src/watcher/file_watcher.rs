use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::backend::{FileSystem, FileWatcherBackend, same_file_system};
use crate::handle::FileHandle;
use crate::watcher::{
    FileEvent, FileEventHandler, FunctionalFileEventHandler, RecursiveMode, WatcherError,
};

enum RegisteredHandler {
    Shared(Arc<dyn FileEventHandler>),
    Owned(FunctionalFileEventHandler),
}

impl RegisteredHandler {
    fn handler(&self) -> &dyn FileEventHandler {
        match self {
            RegisteredHandler::Shared(handler) => handler.as_ref(),
            RegisteredHandler::Owned(handler) => handler,
        }
    }
}

/// Watches directories of one file system and forwards changes to handlers.
///
/// Not `Clone`: use [`FileWatcher::registrar`] to add directories from other
/// threads while this watcher blocks in [`FileWatcher::watch`].
#[derive(Default)]
pub struct FileWatcher {
    fs: Option<Arc<dyn FileSystem>>,
    backend: Option<Arc<dyn FileWatcherBackend>>,
    handlers: Vec<RegisteredHandler>,
}

impl FileWatcher {
    /// Creates a watcher with the backend `fs` provides.
    pub fn new(fs: Arc<dyn FileSystem>) -> Result<Self, WatcherError> {
        let backend = fs.create_file_watcher()?;
        Ok(Self::with_backend(fs, backend))
    }

    /// Creates a watcher driven by an explicitly chosen backend.
    pub fn with_backend(fs: Arc<dyn FileSystem>, backend: Arc<dyn FileWatcherBackend>) -> Self {
        Self {
            fs: Some(fs),
            backend: Some(backend),
            handlers: Vec::new(),
        }
    }

    pub fn file_system(&self) -> Option<Arc<dyn FileSystem>> {
        self.fs.clone()
    }

    /// Starts watching `dir`. Handles of other file systems and anything that
    /// is not a directory are ignored.
    pub fn add(
        &self,
        dir: &FileHandle,
        events: FileEvent,
        mode: RecursiveMode,
    ) -> Result<(), WatcherError> {
        self.registrar().add(dir, events, mode)
    }

    pub fn add_handler(&mut self, handler: Arc<dyn FileEventHandler>) {
        self.handlers.push(RegisteredHandler::Shared(handler));
    }

    /// Registers a closure as handler. The watcher owns it.
    pub fn add_handler_fn(
        &mut self,
        func: impl Fn(&FileHandle, FileEvent) + Send + Sync + 'static,
    ) {
        self.handlers
            .push(RegisteredHandler::Owned(FunctionalFileEventHandler::new(func)));
    }

    /// Removes a handler previously passed to [`FileWatcher::add_handler`].
    pub fn remove_handler(&mut self, handler: &Arc<dyn FileEventHandler>) {
        self.handlers.retain(|registered| match registered {
            RegisteredHandler::Shared(shared) => !Arc::ptr_eq(shared, handler),
            RegisteredHandler::Owned(_) => true,
        });
    }

    /// Waits for changes and delivers them to every handler in registration
    /// order. A negative timeout waits until something happens.
    pub fn watch(&self, timeout_ms: i32) -> Result<(), WatcherError> {
        let Some(backend) = self.backend.as_ref() else {
            return Ok(());
        };

        backend.watch(timeout_ms, &mut |handle, event| {
            debug!("{} {}", event, handle.path());
            for registered in &self.handlers {
                registered.handler().on_file_event(handle, event);
            }
        })
    }

    /// Wakes a blocked [`FileWatcher::watch`] without delivering an event.
    pub fn interrupt(&self) {
        if let Some(backend) = self.backend.as_ref() {
            backend.interrupt();
        }
    }

    /// A cheap, thread-safe handle for adding directories to this watcher.
    pub fn registrar(&self) -> WatchRegistrar {
        WatchRegistrar {
            fs: self.fs.clone(),
            backend: self.backend.clone(),
        }
    }
}

impl fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileWatcher")
            .field("active", &self.backend.is_some())
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// Adds directories to a [`FileWatcher`] from any thread.
#[derive(Clone, Default)]
pub struct WatchRegistrar {
    fs: Option<Arc<dyn FileSystem>>,
    backend: Option<Arc<dyn FileWatcherBackend>>,
}

impl WatchRegistrar {
    /// Same rules as [`FileWatcher::add`]. Wakes the watcher so the new
    /// registration is in effect for its next wait.
    pub fn add(
        &self,
        dir: &FileHandle,
        events: FileEvent,
        mode: RecursiveMode,
    ) -> Result<(), WatcherError> {
        let (Some(fs), Some(backend)) = (self.fs.as_ref(), self.backend.as_ref()) else {
            return Ok(());
        };

        let same_fs = dir
            .file_system()
            .is_some_and(|dir_fs| same_file_system(fs, &dir_fs));
        if !same_fs {
            debug!("Ignoring {}: it belongs to another file system", dir.path());
            return Ok(());
        }
        if !dir.is_directory() {
            debug!("Ignoring {}: not a directory", dir.path());
            return Ok(());
        }

        backend.add(dir, events, mode)
    }

    pub fn interrupt(&self) {
        if let Some(backend) = self.backend.as_ref() {
            backend.interrupt();
        }
    }
}
