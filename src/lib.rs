//! A uniform handle, iterator and watcher API over local disks and SFTP
//! servers, plus directory snapshots and the diffs between them.

pub mod backend;
pub mod config;
pub mod ext;
pub mod fs;
pub mod handle;
pub mod local;
pub mod path;
pub mod remote;
pub mod tree;
pub mod watcher;

pub use backend::{FileSystem, OpenMode, Permissions};
pub use config::LoginCredentials;
pub use handle::{FileHandle, FileIterator, FileVisitor, FunctionalFileVisitor};
pub use path::FilePath;
pub use tree::{Change, ChangeOperation, Diff, Tree};
pub use watcher::{FileEvent, FileEventHandler, FileWatcher, RecursiveMode};
