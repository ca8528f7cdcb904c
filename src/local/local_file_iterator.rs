use std::fs::{self, ReadDir};
use std::sync::Arc;

use tracing::debug;

use crate::backend::{FileIteratorBackend, FileSystem, replay_to};

pub struct LocalFileIterator {
    fs: Arc<dyn FileSystem>,
    directory: String,
    entries: Option<ReadDir>,
    index: i64,
    current: Option<String>,
}

impl LocalFileIterator {
    /// Opens `directory` and positions the cursor on its first entry.
    pub fn new(fs: Arc<dyn FileSystem>, directory: &str) -> Self {
        let entries = match fs::read_dir(directory) {
            Ok(entries) => Some(entries),
            Err(e) => {
                debug!("Failed to open directory {}: {}", directory, e);
                None
            }
        };

        let mut iterator = Self {
            fs,
            directory: directory.to_string(),
            entries,
            index: -1,
            current: None,
        };
        iterator.read_next_entry();
        iterator
    }

    fn read_next_entry(&mut self) {
        let Some(entries) = self.entries.as_mut() else {
            self.current = None;
            return;
        };

        for entry in entries.by_ref() {
            match entry {
                Ok(entry) => {
                    self.current = Some(entry.file_name().to_string_lossy().into_owned());
                    self.index += 1;
                    return;
                }
                Err(e) => debug!("Skipping unreadable entry in {}: {}", self.directory, e),
            }
        }

        self.current = None;
        self.entries = None;
    }
}

impl FileIteratorBackend for LocalFileIterator {
    fn clone_backend(&self) -> Box<dyn FileIteratorBackend> {
        let mut clone = LocalFileIterator::new(self.fs.clone(), &self.directory);
        replay_to(&mut clone, self.index);
        Box::new(clone)
    }

    fn file_system(&self) -> Arc<dyn FileSystem> {
        self.fs.clone()
    }

    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn directory_path(&self) -> &str {
        &self.directory
    }

    fn index(&self) -> i64 {
        self.index
    }

    fn name(&self) -> String {
        self.current.clone().unwrap_or_default()
    }

    fn next(&mut self) {
        self.read_next_entry();
    }
}
