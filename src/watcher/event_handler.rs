use std::fmt;

use crate::handle::FileHandle;
use crate::watcher::FileEvent;

/// Receives events from a [`FileWatcher`](crate::watcher::FileWatcher).
///
/// Override `on_file_event` to see everything, or the per-kind methods.
pub trait FileEventHandler: Send + Sync {
    fn on_file_event(&self, handle: &FileHandle, event: FileEvent) {
        if event == FileEvent::CREATED {
            self.on_file_created(handle);
        } else if event == FileEvent::REMOVED {
            self.on_file_removed(handle);
        } else if event == FileEvent::MODIFIED {
            self.on_file_modified(handle);
        } else if event == FileEvent::ATTR_CHANGED {
            self.on_file_attr_changed(handle);
        }
    }

    fn on_file_created(&self, _handle: &FileHandle) {}

    fn on_file_removed(&self, _handle: &FileHandle) {}

    fn on_file_modified(&self, _handle: &FileHandle) {}

    fn on_file_attr_changed(&self, _handle: &FileHandle) {}
}

type EventFn = Box<dyn Fn(&FileHandle, FileEvent) + Send + Sync>;

/// A handler wrapping a closure.
pub struct FunctionalFileEventHandler {
    func: EventFn,
}

impl FunctionalFileEventHandler {
    pub fn new(func: impl Fn(&FileHandle, FileEvent) + Send + Sync + 'static) -> Self {
        Self {
            func: Box::new(func),
        }
    }
}

impl FileEventHandler for FunctionalFileEventHandler {
    fn on_file_event(&self, handle: &FileHandle, event: FileEvent) {
        (self.func)(handle, event);
    }
}

impl fmt::Debug for FunctionalFileEventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FunctionalFileEventHandler")
    }
}
