use std::sync::Arc;

use tracing::debug;

use crate::backend::{FileIteratorBackend, FileSystem};
use crate::remote::SshFileSystem;

/// Cursor over a remote directory listing, fetched once when created.
pub struct SshFileIterator {
    fs: Arc<SshFileSystem>,
    directory: String,
    entries: Vec<String>,
    index: i64,
}

impl SshFileIterator {
    pub fn new(fs: Arc<SshFileSystem>, directory: &str) -> Self {
        let entries = fs
            .run(|session| session.read_dir(directory))
            .unwrap_or_else(|e| {
                debug!("{}", e);
                Vec::new()
            });

        let index = if entries.is_empty() { -1 } else { 0 };
        Self {
            fs,
            directory: directory.to_string(),
            entries,
            index,
        }
    }

    fn current(&self) -> Option<&String> {
        usize::try_from(self.index)
            .ok()
            .and_then(|index| self.entries.get(index))
    }
}

impl FileIteratorBackend for SshFileIterator {
    fn clone_backend(&self) -> Box<dyn FileIteratorBackend> {
        Box::new(SshFileIterator {
            fs: self.fs.clone(),
            directory: self.directory.clone(),
            entries: self.entries.clone(),
            index: self.index,
        })
    }

    fn file_system(&self) -> Arc<dyn FileSystem> {
        self.fs.clone()
    }

    fn valid(&self) -> bool {
        self.current().is_some()
    }

    fn directory_path(&self) -> &str {
        &self.directory
    }

    fn index(&self) -> i64 {
        self.index
    }

    fn name(&self) -> String {
        self.current().cloned().unwrap_or_default()
    }

    fn next(&mut self) {
        if self.valid() {
            self.index += 1;
        }
    }
}
