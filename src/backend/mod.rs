//! Capability traits every storage backend implements, and the small value
//! types they exchange.

mod file_system;
mod handle_backend;
mod iterator_backend;
mod permissions;
mod stream;
mod watcher_backend;

pub use file_system::{FileSystem, same_file_system};
pub use handle_backend::{FileHandleBackend, target_path};
pub use iterator_backend::{FileIteratorBackend, replay_to};
pub use permissions::Permissions;
pub use stream::{InputStream, OpenMode, OutputStream};
pub use watcher_backend::{EventSink, FileWatcherBackend};
