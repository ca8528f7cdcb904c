use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, Watcher};
use snafu::ResultExt;
use tracing::{debug, warn};

use crate::backend::{EventSink, FileSystem, FileWatcherBackend};
use crate::handle::FileHandle;
use crate::watcher::registration::{CreatedLedger, Registration, report_existing, subdirectories};
use crate::watcher::watcher_error::{NotifyInitSnafu, NotifyRegisterSnafu};
use crate::watcher::{FileEvent, RecursiveMode, WatcherError};

enum Signal {
    Change(notify::Result<Event>),
    Rearm,
}

/// Watcher backend on top of the `notify` crate, for hosts without inotify.
///
/// Each directory is registered non-recursively and recursion is emulated the
/// same way as on Linux, so every platform reports the same event stream.
/// Rearming is a control message on the channel the notifier feeds.
pub struct PortableWatcher {
    fs: Arc<dyn FileSystem>,
    notifier: Mutex<RecommendedWatcher>,
    receiver: Mutex<Receiver<Signal>>,
    sender: Sender<Signal>,
    registrations: Mutex<HashMap<PathBuf, Registration>>,
    ledger: Mutex<CreatedLedger>,
    #[cfg(test)]
    refused: Mutex<Vec<String>>,
}

impl PortableWatcher {
    pub fn new(fs: Arc<dyn FileSystem>) -> Result<Self, WatcherError> {
        let (sender, receiver) = mpsc::channel();
        let change_sender = sender.clone();

        let notifier = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = change_sender.send(Signal::Change(res));
            },
            Config::default(),
        )
        .context(NotifyInitSnafu)?;

        Ok(Self {
            fs,
            notifier: Mutex::new(notifier),
            receiver: Mutex::new(receiver),
            sender,
            registrations: Mutex::new(HashMap::new()),
            ledger: Mutex::new(CreatedLedger::default()),
            #[cfg(test)]
            refused: Mutex::new(Vec::new()),
        })
    }

    fn registrations(&self) -> MutexGuard<'_, HashMap<PathBuf, Registration>> {
        self.registrations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ledger(&self) -> MutexGuard<'_, CreatedLedger> {
        self.ledger
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn add_native_watch(&self, path: &str) -> notify::Result<()> {
        #[cfg(test)]
        if self
            .refused
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .any(|refused| refused == path)
        {
            return Err(notify::Error::io(std::io::Error::from(
                std::io::ErrorKind::PermissionDenied,
            )));
        }
        self.notifier
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .watch(Path::new(path), notify::RecursiveMode::NonRecursive)
    }

    /// Registers `dir` and, for recursive watches, every directory below it.
    ///
    /// Only a failure on `dir` itself is returned. Subdirectories that cannot
    /// be watched are skipped with a warning.
    fn register(
        &self,
        dir: &FileHandle,
        events: FileEvent,
        mode: RecursiveMode,
    ) -> Result<(), WatcherError> {
        let path = dir.path();
        let result = self.add_native_watch(&path);

        match result {
            Ok(()) => {
                debug!("Watching {} ({})", path, events);
                self.registrations().insert(
                    registry_key(Path::new(&path)),
                    Registration::new(dir, events, mode),
                );
            }
            Err(e) if matches!(e.kind, notify::ErrorKind::MaxFilesWatch) => {
                warn!("Watch limit reached, not watching {}", path);
                return Ok(());
            }
            Err(e) if matches!(e.kind, notify::ErrorKind::PathNotFound) => {
                debug!("{} vanished before it could be watched", path);
                return Ok(());
            }
            Err(e) => return Err(e).context(NotifyRegisterSnafu { path }),
        }

        if mode == RecursiveMode::Recursive {
            for child in subdirectories(dir) {
                self.register_discovered(&child, events, mode);
            }
        }
        Ok(())
    }

    fn register_discovered(&self, dir: &FileHandle, events: FileEvent, mode: RecursiveMode) {
        if let Err(e) = self.register(dir, events, mode) {
            warn!("{}, changes below it will not be reported", e);
        }
    }

    fn dispatch(&self, signal: Signal, sink: &mut EventSink<'_>) {
        let event = match signal {
            Signal::Rearm => return,
            Signal::Change(Err(e)) => {
                warn!("Change notifier reported an error: {}", e);
                return;
            }
            Signal::Change(Ok(event)) => event,
        };

        match event.kind {
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
                self.deliver(&event.paths[0], FileEvent::REMOVED, sink);
                self.deliver(&event.paths[1], FileEvent::CREATED, sink);
            }
            kind => {
                if let Some(kind) = classify(kind) {
                    for path in &event.paths {
                        self.deliver(path, kind, sink);
                    }
                }
            }
        }
    }

    fn deliver(&self, path: &Path, kind: FileEvent, sink: &mut EventSink<'_>) {
        let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
            return;
        };
        let registered = self
            .registrations()
            .get(&registry_key(parent))
            .map(|registration| {
                (
                    registration.handle.clone(),
                    registration.events,
                    registration.mode,
                )
            });
        let Some((parent, events, mode)) = registered else {
            return;
        };

        let handle = parent.open(&name.to_string_lossy());

        if kind == FileEvent::CREATED {
            if self.ledger().take(&handle.path()) {
                return;
            }

            let is_real_directory = handle.is_directory() && !handle.is_symbolic_link();
            if mode == RecursiveMode::Recursive && is_real_directory {
                self.register_discovered(&handle, events, mode);
                if events.contains(FileEvent::CREATED) {
                    sink(&handle, FileEvent::CREATED);
                }
                report_existing(&handle, events, &mut self.ledger(), sink);
                return;
            }
        }

        if kind == FileEvent::REMOVED {
            self.registrations().remove(&registry_key(path));
            self.ledger().take(&handle.path());
        }

        if events.contains(kind) {
            sink(&handle, kind);
        }
    }
}

impl FileWatcherBackend for PortableWatcher {
    fn file_system(&self) -> Arc<dyn FileSystem> {
        self.fs.clone()
    }

    fn add(
        &self,
        dir: &FileHandle,
        events: FileEvent,
        mode: RecursiveMode,
    ) -> Result<(), WatcherError> {
        if !dir.is_directory() {
            return Ok(());
        }
        self.register(dir, events, mode)?;
        self.interrupt();
        Ok(())
    }

    fn watch(&self, timeout_ms: i32, sink: &mut EventSink<'_>) -> Result<(), WatcherError> {
        self.ledger().start_round();

        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let first = if timeout_ms < 0 {
            receiver.recv().ok()
        } else {
            match receiver.recv_timeout(Duration::from_millis(timeout_ms as u64)) {
                Ok(signal) => Some(signal),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
            }
        };

        let Some(first) = first else {
            return Ok(());
        };

        let pending: Vec<Signal> = std::iter::once(first).chain(receiver.try_iter()).collect();
        drop(receiver);

        for signal in pending {
            self.dispatch(signal, sink);
        }
        Ok(())
    }

    fn interrupt(&self) {
        let _ = self.sender.send(Signal::Rearm);
    }
}

/// Normalizes a directory path for lookups, since notifiers may report
/// canonical paths that differ from the registered spelling.
fn registry_key(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn classify(kind: EventKind) -> Option<FileEvent> {
    match kind {
        EventKind::Create(_) => Some(FileEvent::CREATED),
        EventKind::Remove(_) => Some(FileEvent::REMOVED),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(FileEvent::REMOVED),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(FileEvent::CREATED),
        EventKind::Modify(ModifyKind::Name(_)) => None,
        EventKind::Modify(ModifyKind::Metadata(_)) => Some(FileEvent::ATTR_CHANGED),
        EventKind::Modify(_) => Some(FileEvent::MODIFIED),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FileSystem;
    use crate::local::LocalFileSystem;
    use crate::watcher::FileWatcher;
    use notify::event::{CreateKind, MetadataKind, RemoveKind};
    use rstest::*;
    use std::fs;
    use std::time::Instant;
    use tempfile::TempDir;

    #[rstest]
    #[case(EventKind::Create(CreateKind::File), Some(FileEvent::CREATED))]
    #[case(EventKind::Remove(RemoveKind::Folder), Some(FileEvent::REMOVED))]
    #[case(
        EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
        Some(FileEvent::ATTR_CHANGED)
    )]
    #[case(EventKind::Modify(ModifyKind::Any), Some(FileEvent::MODIFIED))]
    #[case(EventKind::Modify(ModifyKind::Name(RenameMode::From)), Some(FileEvent::REMOVED))]
    #[case(EventKind::Modify(ModifyKind::Name(RenameMode::To)), Some(FileEvent::CREATED))]
    #[case(EventKind::Any, None)]
    fn classifies_notify_kinds(#[case] kind: EventKind, #[case] expected: Option<FileEvent>) {
        assert_eq!(classify(kind), expected);
    }

    #[test]
    fn recursive_watch_reports_new_subdirectory_then_its_file() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let local = LocalFileSystem::new();
        let root = local.open(&dir.path().to_string_lossy());
        let shared: Arc<dyn FileSystem> = local.clone();

        let backend = PortableWatcher::new(shared.clone()).expect("Failed to create watcher");
        let mut watcher = FileWatcher::with_backend(shared, Arc::new(backend));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        watcher.add_handler_fn(move |handle, event| {
            if event == FileEvent::CREATED {
                sink.lock().expect("Poisoned").push(handle.file_name());
            }
        });
        watcher
            .add(&root, FileEvent::ALL, RecursiveMode::Recursive)
            .expect("Failed to register directory");

        fs::create_dir(dir.path().join("sub")).expect("Failed to create sub directory");
        fs::write(dir.path().join("sub/file.txt"), b"x").expect("Failed to write file");

        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline && seen.lock().expect("Poisoned").len() < 2 {
            watcher.watch(200).expect("Watch failed");
        }

        let seen = seen.lock().expect("Poisoned").clone();
        let sub = seen.iter().position(|name| name == "sub").expect("Missed sub");
        let file = seen.iter().position(|name| name == "file.txt").expect("Missed file.txt");
        assert!(sub < file);
    }

    #[test]
    fn unwatchable_subdirectory_does_not_drop_other_events() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let local: Arc<dyn FileSystem> = LocalFileSystem::new();
        let root = local.open(&dir.path().to_string_lossy());
        let backend = PortableWatcher::new(local.clone()).expect("Failed to create watcher");
        backend
            .add(&root, FileEvent::ALL, RecursiveMode::Recursive)
            .expect("Failed to register directory");
        backend
            .refused
            .lock()
            .expect("Poisoned")
            .push(root.open("locked").path());

        fs::create_dir(dir.path().join("locked")).expect("Failed to create directory");
        fs::write(dir.path().join("after.txt"), b"x").expect("Failed to write file");

        let mut created = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline && created.len() < 2 {
            backend
                .watch(200, &mut |handle, event| {
                    if event == FileEvent::CREATED && !created.contains(&handle.file_name()) {
                        created.push(handle.file_name());
                    }
                })
                .expect("Watch failed");
        }

        created.sort();
        assert_eq!(created, vec!["after.txt", "locked"]);
    }
}
