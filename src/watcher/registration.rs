use std::collections::HashSet;

use crate::backend::EventSink;
use crate::handle::FileHandle;
use crate::watcher::{FileEvent, RecursiveMode};

/// What a single native watch was registered for.
pub(crate) struct Registration {
    pub handle: FileHandle,
    pub events: FileEvent,
    pub mode: RecursiveMode,
}

impl Registration {
    pub fn new(handle: &FileHandle, events: FileEvent, mode: RecursiveMode) -> Self {
        Self {
            handle: handle.clone(),
            events,
            mode,
        }
    }
}

/// Paths reported by scanning a freshly registered directory.
///
/// The native create event for such a path may still be queued; it is
/// swallowed if it arrives within the same or the following `watch` call.
#[derive(Default)]
pub(crate) struct CreatedLedger {
    previous: HashSet<String>,
    current: HashSet<String>,
}

impl CreatedLedger {
    pub fn start_round(&mut self) {
        self.previous = std::mem::take(&mut self.current);
    }

    pub fn record(&mut self, path: String) {
        self.current.insert(path);
    }

    /// Returns true if `path` was already reported by a scan.
    pub fn take(&mut self, path: &str) -> bool {
        let in_previous = self.previous.remove(path);
        let in_current = self.current.remove(path);
        in_previous || in_current
    }
}

/// Reports every entry already present below `dir` as created, pre-order.
///
/// Used right after a directory that appeared under a recursive watch has
/// been registered, since anything created in it before that went unseen.
pub(crate) fn report_existing(
    dir: &FileHandle,
    events: FileEvent,
    ledger: &mut CreatedLedger,
    sink: &mut EventSink<'_>,
) {
    for name in dir.begin() {
        let child = dir.open(&name);
        if events.contains(FileEvent::CREATED) {
            ledger.record(child.path());
            sink(&child, FileEvent::CREATED);
        }
        if child.is_directory() && !child.is_symbolic_link() {
            report_existing(&child, events, ledger, sink);
        }
    }
}

/// Subdirectories of `dir` that a recursive registration must also cover.
pub(crate) fn subdirectories(dir: &FileHandle) -> Vec<FileHandle> {
    dir.begin()
        .map(|name| dir.open(&name))
        .filter(|child| child.is_directory() && !child.is_symbolic_link())
        .collect()
}
