use std::fmt;

use crate::backend::{FileIteratorBackend, same_file_system};

/// A cursor over the entries of a directory.
///
/// Also usable as a plain [`Iterator`] over entry names. The default value is
/// the invalid iterator that marks the end of every directory.
#[derive(Default)]
pub struct FileIterator {
    backend: Option<Box<dyn FileIteratorBackend>>,
}

impl FileIterator {
    pub fn new(backend: Box<dyn FileIteratorBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    pub fn valid(&self) -> bool {
        self.backend.as_ref().is_some_and(|backend| backend.valid())
    }

    /// Position of the current entry, -1 before the first read.
    pub fn index(&self) -> i64 {
        self.backend.as_ref().map_or(-1, |backend| backend.index())
    }

    /// Name of the current entry, empty once the cursor ran dry.
    pub fn name(&self) -> String {
        self.backend
            .as_ref()
            .filter(|backend| backend.valid())
            .map(|backend| backend.name())
            .unwrap_or_default()
    }

    pub fn directory_path(&self) -> String {
        self.backend
            .as_ref()
            .map(|backend| backend.directory_path().to_string())
            .unwrap_or_default()
    }

    /// Moves to the next entry.
    pub fn advance(&mut self) {
        if let Some(backend) = self.backend.as_mut() {
            backend.next();
        }
    }
}

impl Iterator for FileIterator {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if !self.valid() {
            return None;
        }
        let name = self.name();
        self.advance();
        Some(name)
    }
}

impl Clone for FileIterator {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.as_ref().map(|backend| backend.clone_backend()),
        }
    }
}

impl PartialEq for FileIterator {
    fn eq(&self, other: &Self) -> bool {
        match (self.valid(), other.valid()) {
            (false, false) => true,
            (true, true) => match (self.backend.as_ref(), other.backend.as_ref()) {
                (Some(a), Some(b)) => {
                    same_file_system(&a.file_system(), &b.file_system())
                        && a.directory_path() == b.directory_path()
                        && a.index() == b.index()
                }
                _ => false,
            },
            _ => false,
        }
    }
}

impl fmt::Debug for FileIterator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileIterator")
            .field("directory", &self.directory_path())
            .field("index", &self.index())
            .field("valid", &self.valid())
            .finish()
    }
}
