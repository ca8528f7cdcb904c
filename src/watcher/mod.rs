//! Change notification: the watcher facade, its handlers and the backends.
//!
//! Native notification primitives only watch a single directory level;
//! recursive watches are emulated by registering every subdirectory, including
//! those that appear while the watch is running.

mod event_handler;
mod file_event;
mod file_watcher;
#[cfg(target_os = "linux")]
mod inotify_watcher;
mod null_watcher;
mod portable_watcher;
mod registration;
mod watcher_error;

pub use event_handler::{FileEventHandler, FunctionalFileEventHandler};
pub use file_event::{FileEvent, RecursiveMode};
pub use file_watcher::{FileWatcher, WatchRegistrar};
#[cfg(target_os = "linux")]
pub use inotify_watcher::InotifyWatcher;
pub use null_watcher::NullWatcher;
pub use portable_watcher::PortableWatcher;
pub use watcher_error::WatcherError;
