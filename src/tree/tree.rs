use std::fmt;

use tracing::debug;

use crate::backend::Permissions;
use crate::handle::FileHandle;
use crate::path::FilePath;
use crate::tree::{ChangeOperation, Diff};

/// A recursive snapshot of a directory's metadata at one point in time.
///
/// Paths are relative to the root of the snapshot, the root itself having an
/// empty path unless one was given to [`Tree::read`]. Children keep the order
/// the directory listing returned them in. A snapshot never follows later
/// changes of the file system.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    path: String,
    file_name: String,
    directory: bool,
    size: u64,
    access_time: u64,
    modification_time: u64,
    user_id: u32,
    group_id: u32,
    permissions: Permissions,
    digest: Option<String>,
    children: Vec<Tree>,
}

impl Tree {
    /// Snapshots `handle` and everything below it.
    ///
    /// Returns `None` if `handle` does not exist. Entries that disappear while
    /// the snapshot is taken are left out. File digests are only computed
    /// when `include_digest` is set, since that reads every file in full.
    pub fn read(handle: &FileHandle, path: &str, include_digest: bool) -> Option<Tree> {
        if !handle.exists() {
            return None;
        }

        let directory = handle.is_directory();
        let mut builder = TreeBuilder::new(path)
            .file_name(handle.file_name())
            .directory(directory)
            .size(handle.size())
            .access_time(handle.access_time())
            .modification_time(handle.modification_time())
            .user_id(handle.user_id())
            .group_id(handle.group_id())
            .permissions(handle.permissions());

        if include_digest && !directory {
            builder = builder.digest(handle.sha1());
        }

        // Symbolic links to directories are recorded but not entered, a link
        // back to an ancestor would never terminate.
        if directory && !handle.is_symbolic_link() {
            for name in handle.begin() {
                let child = handle.open(&name);
                if !child.exists() {
                    debug!("{} vanished while reading the tree", child.path());
                    continue;
                }

                let child_path = if path.is_empty() {
                    child.file_name()
                } else {
                    format!("{}/{}", path, child.file_name())
                };

                if let Some(subtree) = Tree::read(&child, &child_path, include_digest) {
                    builder = builder.child(subtree);
                }
            }
        }

        Some(builder.build())
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn is_file(&self) -> bool {
        !self.directory
    }

    pub fn is_directory(&self) -> bool {
        self.directory
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn access_time(&self) -> u64 {
        self.access_time
    }

    pub fn modification_time(&self) -> u64 {
        self.modification_time
    }

    pub fn user_id(&self) -> u32 {
        self.user_id
    }

    pub fn group_id(&self) -> u32 {
        self.group_id
    }

    pub fn permissions(&self) -> Permissions {
        self.permissions
    }

    /// SHA-1 of the file content, if it was requested when reading.
    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    pub fn children(&self) -> &[Tree] {
        &self.children
    }

    /// Names of the direct children, empty for files.
    pub fn list_files(&self) -> Vec<String> {
        self.children
            .iter()
            .map(|child| child.file_name.clone())
            .collect()
    }

    fn child(&self, file_name: &str) -> Option<&Tree> {
        self.children
            .iter()
            .find(|child| child.file_name == file_name)
    }

    /// Computes the changes that turn `self` into `target`.
    pub fn create_diff(&self, target: &Tree) -> Diff {
        Diff::create_diff(Some(self), Some(target))
    }

    pub(crate) fn collect_diff(current: Option<&Tree>, target: Option<&Tree>, diff: &mut Diff) {
        let Some(target) = target.filter(|target| target.is_directory()) else {
            return;
        };

        let Some(current) = current else {
            diff.add(ChangeOperation::CopyDir, target.path());
            return;
        };

        for stale in current
            .children
            .iter()
            .filter(|child| target.child(&child.file_name).is_none())
        {
            let operation = if stale.is_directory() {
                ChangeOperation::RemoveDir
            } else {
                ChangeOperation::RemoveFile
            };
            diff.add(operation, stale.path());
        }

        for wanted in &target.children {
            let existing = current.child(&wanted.file_name);

            if wanted.is_directory() {
                Tree::collect_diff(existing, Some(wanted), diff);
                continue;
            }

            let outdated = match existing {
                None => true,
                Some(existing) => {
                    existing.size != wanted.size
                        || matches!(
                            (existing.digest(), wanted.digest()),
                            (Some(have), Some(want)) if have != want
                        )
                }
            };
            if outdated {
                diff.add(ChangeOperation::CopyFile, wanted.path());
            }
        }
    }

    /// Prints the tree to stdout, one entry per line, indented by depth.
    pub fn print(&self) {
        print!("{}", self);
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        writeln!(f, "{:indent$}{}", "", self.file_name, indent = depth * 2)?;
        for child in &self.children {
            child.write_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}

/// Assembles a [`Tree`] node. Trees cannot be changed once built.
#[derive(Debug, Default)]
pub struct TreeBuilder {
    tree: Tree,
}

impl TreeBuilder {
    /// Starts a node at `path`. The file name defaults to the last component.
    pub fn new(path: &str) -> Self {
        let file_name = FilePath::new(path).file_name().to_string();
        Self {
            tree: Tree {
                path: path.to_string(),
                file_name,
                ..Tree::default()
            },
        }
    }

    pub fn file_name(mut self, file_name: impl Into<String>) -> Self {
        self.tree.file_name = file_name.into();
        self
    }

    pub fn directory(mut self, directory: bool) -> Self {
        self.tree.directory = directory;
        self
    }

    pub fn size(mut self, size: u64) -> Self {
        self.tree.size = size;
        self
    }

    pub fn access_time(mut self, time: u64) -> Self {
        self.tree.access_time = time;
        self
    }

    pub fn modification_time(mut self, time: u64) -> Self {
        self.tree.modification_time = time;
        self
    }

    pub fn user_id(mut self, uid: u32) -> Self {
        self.tree.user_id = uid;
        self
    }

    pub fn group_id(mut self, gid: u32) -> Self {
        self.tree.group_id = gid;
        self
    }

    pub fn permissions(mut self, permissions: Permissions) -> Self {
        self.tree.permissions = permissions;
        self
    }

    pub fn digest(mut self, digest: impl Into<String>) -> Self {
        self.tree.digest = Some(digest.into());
        self
    }

    /// Appends a child. Only directories keep children.
    pub fn child(mut self, child: Tree) -> Self {
        self.tree.children.push(child);
        self
    }

    pub fn build(mut self) -> Tree {
        if !self.tree.directory {
            self.tree.children.clear();
        }
        self.tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FileSystem;
    use crate::local::LocalFileSystem;
    use std::fs;
    use tempfile::TempDir;

    fn sample_dir() -> TempDir {
        let dir = TempDir::new().expect("Failed to create temp directory");
        fs::write(dir.path().join("a.txt"), b"abc").expect("Failed to write a.txt");
        fs::create_dir(dir.path().join("b")).expect("Failed to create b");
        fs::write(dir.path().join("b/inner.txt"), b"hello").expect("Failed to write inner.txt");
        dir
    }

    #[test]
    fn read_captures_structure_with_relative_paths() {
        let dir = sample_dir();
        let root = LocalFileSystem::new().open(&dir.path().to_string_lossy());

        let tree = Tree::read(&root, "", false).expect("Failed to read tree");

        assert!(tree.is_directory());
        assert_eq!(tree.path(), "");
        let mut names = tree.list_files();
        names.sort();
        assert_eq!(names, vec!["a.txt", "b"]);

        let b = tree.child("b").expect("Missing b");
        assert_eq!(b.path(), "b");
        let inner = b.child("inner.txt").expect("Missing inner.txt");
        assert_eq!(inner.path(), "b/inner.txt");
        assert_eq!(inner.size(), 5);
        assert!(inner.is_file());
        assert!(inner.children().is_empty());
    }

    #[test]
    fn digests_are_opt_in() {
        let dir = sample_dir();
        let root = LocalFileSystem::new().open(&dir.path().to_string_lossy());

        let plain = Tree::read(&root, "", false).expect("Failed to read tree");
        let hashed = Tree::read(&root, "", true).expect("Failed to read tree");

        assert_eq!(plain.child("a.txt").and_then(Tree::digest), None);
        assert_eq!(
            hashed.child("a.txt").and_then(Tree::digest),
            Some("a9993e364706816aba3e25717850c26c9cd0d89d")
        );
        assert_eq!(hashed.digest(), None);
    }

    #[test]
    fn read_of_missing_handle_is_none() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let missing = LocalFileSystem::new().open(&dir.path().join("nope").to_string_lossy());
        assert!(Tree::read(&missing, "", false).is_none());
        assert!(missing.read_tree("", false).is_none());
    }

    #[test]
    fn builder_drops_children_of_files() {
        let tree = TreeBuilder::new("x")
            .child(TreeBuilder::new("x/y").build())
            .build();
        assert!(tree.children().is_empty());
        assert_eq!(tree.file_name(), "x");
    }

    #[test]
    fn display_indents_by_depth() {
        let tree = TreeBuilder::new("")
            .file_name("root")
            .directory(true)
            .child(
                TreeBuilder::new("sub")
                    .directory(true)
                    .child(TreeBuilder::new("sub/leaf.txt").build())
                    .build(),
            )
            .build();

        assert_eq!(tree.to_string(), "root\n  sub\n    leaf.txt\n");
    }
}
