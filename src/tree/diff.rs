use std::fmt;

use tracing::{debug, warn};

use crate::handle::FileHandle;
use crate::tree::{Change, ChangeOperation, Tree};

/// An ordered list of changes that reconciles one tree with another.
///
/// The order is part of the result: at every directory level removals come
/// before additions, and levels appear in pre-order. Replay in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    changes: Vec<Change>,
}

impl Diff {
    /// Computes the changes that turn `current` into `target`.
    ///
    /// Nothing is produced unless `target` is a directory. An absent
    /// `current` yields a single `CopyDir` for the whole target. Files match
    /// by name and count as changed when their sizes differ or when both
    /// sides carry a digest and the digests differ.
    pub fn create_diff(current: Option<&Tree>, target: Option<&Tree>) -> Self {
        let mut diff = Diff::default();
        Tree::collect_diff(current, target, &mut diff);
        diff
    }

    pub fn add(&mut self, operation: ChangeOperation, path: impl Into<String>) {
        self.changes.push(Change::new(operation, path));
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Change> {
        self.changes.iter()
    }

    /// Replays the changes, copying from `source_root` into
    /// `destination_root`. Returns how many changes succeeded; a failed
    /// change is logged and the rest are still attempted.
    pub fn apply(&self, source_root: &FileHandle, destination_root: &FileHandle) -> usize {
        let mut applied = 0;

        for change in &self.changes {
            let mut destination = destination_root.open(change.path());
            let done = match change.operation() {
                ChangeOperation::CopyFile => source_root.open(change.path()).copy(&mut destination),
                ChangeOperation::CopyDir => {
                    source_root.open(change.path()).copy_directory_rec(&mut destination)
                }
                ChangeOperation::RemoveFile => destination.remove(),
                ChangeOperation::RemoveDir => destination.remove_directory_rec(),
            };

            if done {
                debug!("{}", change);
                applied += 1;
            } else {
                warn!("Failed to apply {}", change);
            }
        }

        applied
    }

    /// Prints one change per line to stdout.
    pub fn print(&self) {
        print!("{}", self);
    }
}

impl fmt::Display for Diff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for change in &self.changes {
            writeln!(f, "{}", change)?;
        }
        Ok(())
    }
}

impl IntoIterator for Diff {
    type Item = Change;
    type IntoIter = std::vec::IntoIter<Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diff {
    type Item = &'a Change;
    type IntoIter = std::slice::Iter<'a, Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}
