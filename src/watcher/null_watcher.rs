use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use tracing::debug;

use crate::backend::{EventSink, FileSystem, FileWatcherBackend};
use crate::handle::FileHandle;
use crate::watcher::{FileEvent, RecursiveMode, WatcherError};

/// Backend for file systems that cannot report changes.
///
/// Registrations are accepted and ignored. `watch` only returns when the
/// timeout elapses or the watcher is interrupted.
pub struct NullWatcher {
    fs: Arc<dyn FileSystem>,
    rearmed: Mutex<bool>,
    wake: Condvar,
}

impl NullWatcher {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            rearmed: Mutex::new(false),
            wake: Condvar::new(),
        }
    }
}

impl FileWatcherBackend for NullWatcher {
    fn file_system(&self) -> Arc<dyn FileSystem> {
        self.fs.clone()
    }

    fn add(
        &self,
        dir: &FileHandle,
        _events: FileEvent,
        _mode: RecursiveMode,
    ) -> Result<(), WatcherError> {
        debug!("Change notifications are not available for {}", dir.path());
        self.interrupt();
        Ok(())
    }

    fn watch(&self, timeout_ms: i32, _sink: &mut EventSink<'_>) -> Result<(), WatcherError> {
        let guard = self
            .rearmed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut guard = if timeout_ms < 0 {
            self.wake
                .wait_while(guard, |rearmed| !*rearmed)
                .unwrap_or_else(|poisoned| poisoned.into_inner())
        } else {
            self.wake
                .wait_timeout_while(guard, Duration::from_millis(timeout_ms as u64), |rearmed| {
                    !*rearmed
                })
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0)
        };

        *guard = false;
        Ok(())
    }

    fn interrupt(&self) {
        let mut rearmed = self
            .rearmed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *rearmed = true;
        self.wake.notify_all();
    }
}
