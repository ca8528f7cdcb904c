use std::sync::Arc;

use crate::backend::FileSystem;

/// A cursor over the entries of one directory.
///
/// A fresh backend is already positioned on the first entry (index 0) when the
/// directory has one. The index is -1 only while nothing has been read.
pub trait FileIteratorBackend: Send {
    /// Opens a new cursor on the same directory and replays it to the same index.
    fn clone_backend(&self) -> Box<dyn FileIteratorBackend>;

    fn file_system(&self) -> Arc<dyn FileSystem>;

    fn valid(&self) -> bool;

    fn directory_path(&self) -> &str;

    fn index(&self) -> i64;

    fn name(&self) -> String;

    fn next(&mut self);
}

/// Advances a freshly opened cursor until it reaches `index` or runs dry.
pub fn replay_to(backend: &mut dyn FileIteratorBackend, index: i64) {
    while backend.valid() && backend.index() < index {
        backend.next();
    }
}
