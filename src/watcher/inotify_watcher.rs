use std::collections::HashMap;
use std::fs::File;
use std::io::{self, ErrorKind, Read, Write};
use std::os::fd::AsFd;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::sys::inotify::{AddWatchFlags, InitFlags, Inotify, InotifyEvent, WatchDescriptor};
use nix::unistd::pipe2;
use snafu::ResultExt;
use tracing::{debug, warn};

use crate::backend::{EventSink, FileSystem, FileWatcherBackend};
use crate::handle::FileHandle;
use crate::watcher::registration::{CreatedLedger, Registration, report_existing, subdirectories};
use crate::watcher::watcher_error::{InitSnafu, RegisterSnafu, WaitSnafu};
use crate::watcher::{FileEvent, RecursiveMode, WatcherError};

/// inotify-based watcher backend.
///
/// inotify only watches one directory level, so recursive registrations add
/// one watch per subdirectory. The wait covers the inotify descriptor and the
/// read end of a pipe that `add` and `interrupt` write to.
pub struct InotifyWatcher {
    fs: Arc<dyn FileSystem>,
    inotify: Inotify,
    registrations: Mutex<HashMap<WatchDescriptor, Registration>>,
    ledger: Mutex<CreatedLedger>,
    rearm_reader: File,
    rearm_writer: File,
    #[cfg(test)]
    refused: Mutex<Vec<String>>,
}

impl InotifyWatcher {
    pub fn new(fs: Arc<dyn FileSystem>) -> Result<Self, WatcherError> {
        let inotify = Inotify::init(InitFlags::IN_NONBLOCK | InitFlags::IN_CLOEXEC)
            .map_err(io::Error::from)
            .context(InitSnafu)?;
        let (reader, writer) = pipe2(OFlag::O_NONBLOCK | OFlag::O_CLOEXEC)
            .map_err(io::Error::from)
            .context(InitSnafu)?;

        Ok(Self {
            fs,
            inotify,
            registrations: Mutex::new(HashMap::new()),
            ledger: Mutex::new(CreatedLedger::default()),
            rearm_reader: File::from(reader),
            rearm_writer: File::from(writer),
            #[cfg(test)]
            refused: Mutex::new(Vec::new()),
        })
    }

    fn registrations(&self) -> MutexGuard<'_, HashMap<WatchDescriptor, Registration>> {
        self.registrations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ledger(&self) -> MutexGuard<'_, CreatedLedger> {
        self.ledger
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn add_native_watch(&self, path: &str, flags: AddWatchFlags) -> Result<WatchDescriptor, Errno> {
        #[cfg(test)]
        if self
            .refused
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .any(|refused| refused == path)
        {
            return Err(Errno::EACCES);
        }
        self.inotify.add_watch(Path::new(path), flags)
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
        let mut flags = native_mask(events) | AddWatchFlags::IN_ONLYDIR;
        if mode == RecursiveMode::Recursive {
            flags |= AddWatchFlags::IN_CREATE | AddWatchFlags::IN_MOVED_TO;
        }
        if events.contains(FileEvent::CREATED) {
            // Removals clear the created ledger even when they are not reported.
            flags |= AddWatchFlags::IN_DELETE | AddWatchFlags::IN_MOVED_FROM;
        }

        let path = dir.path();
        match self.add_native_watch(&path, flags) {
            Ok(wd) => {
                debug!("Watching {} ({})", path, events);
                self.registrations()
                    .insert(wd, Registration::new(dir, events, mode));
            }
            Err(Errno::ENOSPC) => {
                warn!("inotify watch limit reached, not watching {}", path);
                return Ok(());
            }
            Err(Errno::ENOENT) | Err(Errno::ENOTDIR) => {
                debug!("{} vanished before it could be watched", path);
                return Ok(());
            }
            Err(e) => {
                return Err(io::Error::from(e)).context(RegisterSnafu { path });
            }
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

    fn drain_rearm(&self) {
        let mut buf = [0u8; 64];
        while matches!((&self.rearm_reader).read(&mut buf), Ok(n) if n > 0) {}
    }

    fn dispatch(&self, sink: &mut EventSink<'_>) -> Result<(), WatcherError> {
        let events = match self.inotify.read_events() {
            Ok(events) => events,
            Err(Errno::EAGAIN) => return Ok(()),
            Err(e) => return Err(io::Error::from(e)).context(WaitSnafu),
        };

        for event in events {
            self.dispatch_one(event, sink);
        }
        Ok(())
    }

    fn dispatch_one(&self, event: InotifyEvent, sink: &mut EventSink<'_>) {
        if event.mask.contains(AddWatchFlags::IN_Q_OVERFLOW) {
            warn!("inotify queue overflowed, change events were lost");
            return;
        }
        if event.mask.contains(AddWatchFlags::IN_IGNORED) {
            self.registrations().remove(&event.wd);
            return;
        }

        let Some(name) = event.name else {
            return;
        };
        let Some((parent, events, mode)) = self.registrations().get(&event.wd).map(|registration| {
            (
                registration.handle.clone(),
                registration.events,
                registration.mode,
            )
        }) else {
            return;
        };
        let Some(kind) = classify(event.mask) else {
            return;
        };

        let handle = parent.open(&name.to_string_lossy());

        if kind == FileEvent::CREATED {
            if self.ledger().take(&handle.path()) {
                return;
            }

            if mode == RecursiveMode::Recursive && event.mask.contains(AddWatchFlags::IN_ISDIR) {
                self.register_discovered(&handle, events, mode);
                if events.contains(FileEvent::CREATED) {
                    sink(&handle, FileEvent::CREATED);
                }
                report_existing(&handle, events, &mut self.ledger(), sink);
                return;
            }
        }

        if kind == FileEvent::REMOVED {
            self.ledger().take(&handle.path());
        }

        if events.contains(kind) {
            sink(&handle, kind);
        }
    }
}

impl FileWatcherBackend for InotifyWatcher {
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

        let timeout = if timeout_ms < 0 {
            PollTimeout::NONE
        } else {
            PollTimeout::try_from(timeout_ms).unwrap_or(PollTimeout::MAX)
        };

        let (changes_ready, rearmed) = {
            let mut fds = [
                PollFd::new(self.inotify.as_fd(), PollFlags::POLLIN),
                PollFd::new(self.rearm_reader.as_fd(), PollFlags::POLLIN),
            ];
            match poll(&mut fds, timeout) {
                Ok(0) => return Ok(()),
                Ok(_) => {}
                Err(Errno::EINTR) => return Ok(()),
                Err(e) => return Err(io::Error::from(e)).context(WaitSnafu),
            }

            let readable = |fd: &PollFd<'_>| {
                fd.revents()
                    .is_some_and(|revents| revents.contains(PollFlags::POLLIN))
            };
            (readable(&fds[0]), readable(&fds[1]))
        };

        if rearmed {
            self.drain_rearm();
        }
        if changes_ready {
            self.dispatch(sink)?;
        }
        Ok(())
    }

    fn interrupt(&self) {
        if let Err(e) = (&self.rearm_writer).write(&[1]) {
            if e.kind() != ErrorKind::WouldBlock {
                warn!("Failed to interrupt watcher: {}", e);
            }
        }
    }
}

fn native_mask(events: FileEvent) -> AddWatchFlags {
    let mut flags = AddWatchFlags::empty();
    if events.contains(FileEvent::CREATED) {
        flags |= AddWatchFlags::IN_CREATE | AddWatchFlags::IN_MOVED_TO;
    }
    if events.contains(FileEvent::REMOVED) {
        flags |= AddWatchFlags::IN_DELETE | AddWatchFlags::IN_MOVED_FROM;
    }
    if events.contains(FileEvent::MODIFIED) {
        flags |= AddWatchFlags::IN_MODIFY;
    }
    if events.contains(FileEvent::ATTR_CHANGED) {
        flags |= AddWatchFlags::IN_ATTRIB;
    }
    flags
}

fn classify(mask: AddWatchFlags) -> Option<FileEvent> {
    if mask.intersects(AddWatchFlags::IN_CREATE | AddWatchFlags::IN_MOVED_TO) {
        Some(FileEvent::CREATED)
    } else if mask.intersects(AddWatchFlags::IN_DELETE | AddWatchFlags::IN_MOVED_FROM) {
        Some(FileEvent::REMOVED)
    } else if mask.contains(AddWatchFlags::IN_MODIFY) {
        Some(FileEvent::MODIFIED)
    } else if mask.contains(AddWatchFlags::IN_ATTRIB) {
        Some(FileEvent::ATTR_CHANGED)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalFileSystem;
    use rstest::*;
    use std::fs;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    type Seen = Vec<(String, FileEvent)>;

    fn watch_until(watcher: &InotifyWatcher, seen: &mut Seen, done: impl Fn(&Seen) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline && !done(seen) {
            watcher
                .watch(100, &mut |handle, event| seen.push((handle.file_name(), event)))
                .expect("Watch failed");
        }
    }

    fn created(seen: &Seen, name: &str) -> usize {
        seen.iter()
            .filter(|(seen_name, event)| seen_name == name && *event == FileEvent::CREATED)
            .count()
    }

    #[rstest]
    #[case(AddWatchFlags::IN_CREATE, Some(FileEvent::CREATED))]
    #[case(AddWatchFlags::IN_CREATE | AddWatchFlags::IN_ISDIR, Some(FileEvent::CREATED))]
    #[case(AddWatchFlags::IN_MOVED_TO, Some(FileEvent::CREATED))]
    #[case(AddWatchFlags::IN_DELETE, Some(FileEvent::REMOVED))]
    #[case(AddWatchFlags::IN_MOVED_FROM, Some(FileEvent::REMOVED))]
    #[case(AddWatchFlags::IN_MODIFY, Some(FileEvent::MODIFIED))]
    #[case(AddWatchFlags::IN_ATTRIB, Some(FileEvent::ATTR_CHANGED))]
    #[case(AddWatchFlags::IN_CLOSE_WRITE, None)]
    fn classifies_native_masks(#[case] mask: AddWatchFlags, #[case] expected: Option<FileEvent>) {
        assert_eq!(classify(mask), expected);
    }

    #[test]
    fn native_mask_only_requests_wanted_kinds() {
        let mask = native_mask(FileEvent::REMOVED);
        assert!(mask.contains(AddWatchFlags::IN_DELETE));
        assert!(!mask.contains(AddWatchFlags::IN_CREATE));
        assert!(!mask.contains(AddWatchFlags::IN_MODIFY));
    }

    #[test]
    fn unwatchable_subdirectory_does_not_drop_other_events() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let local: Arc<dyn FileSystem> = LocalFileSystem::new();
        let root = local.open(&dir.path().to_string_lossy());
        let watcher = InotifyWatcher::new(local.clone()).expect("Failed to create watcher");
        watcher
            .add(&root, FileEvent::ALL, RecursiveMode::Recursive)
            .expect("Failed to register directory");

        let locked = root.open("locked").path();
        watcher.refused.lock().expect("Poisoned").push(locked);
        fs::create_dir(dir.path().join("locked")).expect("Failed to create directory");
        fs::write(dir.path().join("after.txt"), b"x").expect("Failed to write file");

        let mut seen = Seen::new();
        watch_until(&watcher, &mut seen, |seen| {
            created(seen, "locked") > 0 && created(seen, "after.txt") > 0
        });
        assert_eq!(created(&seen, "locked"), 1);
        assert_eq!(created(&seen, "after.txt"), 1);
    }

    #[test]
    fn recreating_a_scanned_file_is_reported_again() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let local: Arc<dyn FileSystem> = LocalFileSystem::new();
        let root = local.open(&dir.path().to_string_lossy());
        let watcher = InotifyWatcher::new(local.clone()).expect("Failed to create watcher");
        watcher
            .add(&root, FileEvent::ALL, RecursiveMode::Recursive)
            .expect("Failed to register directory");

        // sub/f.txt exists before sub is registered, so only the scan sees it.
        fs::create_dir(dir.path().join("sub")).expect("Failed to create directory");
        fs::write(dir.path().join("sub/f.txt"), b"1").expect("Failed to write file");
        let mut seen = Seen::new();
        watch_until(&watcher, &mut seen, |seen| created(seen, "f.txt") > 0);
        assert_eq!(created(&seen, "f.txt"), 1);

        fs::remove_file(dir.path().join("sub/f.txt")).expect("Failed to remove file");
        fs::write(dir.path().join("sub/f.txt"), b"2").expect("Failed to write file");
        watch_until(&watcher, &mut seen, |seen| created(seen, "f.txt") > 1);

        assert_eq!(created(&seen, "f.txt"), 2);
        assert!(seen.contains(&("f.txt".to_string(), FileEvent::REMOVED)));
    }
}
