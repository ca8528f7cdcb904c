use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;

use tracing::debug;

use crate::backend::{
    FileHandleBackend, FileSystem, InputStream, OpenMode, OutputStream, Permissions,
    same_file_system,
};
use crate::handle::{FileIterator, FileVisitor, FunctionalFileVisitor};
use crate::path::FilePath;
use crate::tree::Tree;
use crate::watcher::{FileEvent, FileWatcher, RecursiveMode, WatcherError};

/// A backend-agnostic reference to a location in one file system.
///
/// The location does not have to exist. A handle without a backend (the
/// [`Default`] value) answers every query with an empty value and refuses
/// every mutation.
#[derive(Default)]
pub struct FileHandle {
    backend: Option<Box<dyn FileHandleBackend>>,
}

impl FileHandle {
    pub fn new(backend: Box<dyn FileHandleBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.backend.is_none()
    }

    pub fn file_system(&self) -> Option<Arc<dyn FileSystem>> {
        self.backend.as_ref().map(|backend| backend.file_system())
    }

    /// Whether both handles belong to the same file system instance.
    pub fn shares_file_system(&self, other: &FileHandle) -> bool {
        match (self.file_system(), other.file_system()) {
            (Some(a), Some(b)) => same_file_system(&a, &b),
            _ => false,
        }
    }

    pub fn path(&self) -> String {
        self.backend
            .as_ref()
            .map(|backend| backend.path().path().to_string())
            .unwrap_or_default()
    }

    pub fn file_name(&self) -> String {
        self.backend
            .as_ref()
            .map(|backend| backend.path().file_name().to_string())
            .unwrap_or_default()
    }

    /// Drops the cached stat so the next query hits the backend again.
    pub fn update_file_info(&mut self) {
        if let Some(backend) = self.backend.as_mut() {
            backend.update_file_info();
        }
    }

    pub fn exists(&self) -> bool {
        self.query(|backend| backend.exists())
    }

    pub fn is_file(&self) -> bool {
        self.query(|backend| backend.is_file())
    }

    pub fn is_directory(&self) -> bool {
        self.query(|backend| backend.is_directory())
    }

    pub fn is_symbolic_link(&self) -> bool {
        self.query(|backend| backend.is_symbolic_link())
    }

    pub fn list_files(&self) -> Vec<String> {
        self.query(|backend| backend.list_files())
    }

    /// Returns a cursor over the directory entries. The cursor is invalid when
    /// this is not a readable directory.
    pub fn begin(&self) -> FileIterator {
        self.backend
            .as_ref()
            .and_then(|backend| backend.begin())
            .map(FileIterator::new)
            .unwrap_or_default()
    }

    pub fn size(&self) -> u64 {
        self.query(|backend| backend.size())
    }

    pub fn access_time(&self) -> u64 {
        self.query(|backend| backend.access_time())
    }

    pub fn modification_time(&self) -> u64 {
        self.query(|backend| backend.modification_time())
    }

    pub fn user_id(&self) -> u32 {
        self.query(|backend| backend.user_id())
    }

    pub fn set_user_id(&mut self, uid: u32) -> bool {
        self.mutate(|backend| backend.set_user_id(uid))
    }

    pub fn group_id(&self) -> u32 {
        self.query(|backend| backend.group_id())
    }

    pub fn set_group_id(&mut self, gid: u32) -> bool {
        self.mutate(|backend| backend.set_group_id(gid))
    }

    pub fn permissions(&self) -> Permissions {
        self.query(|backend| backend.permissions())
    }

    pub fn set_permissions(&mut self, permissions: Permissions) -> bool {
        self.mutate(|backend| backend.set_permissions(permissions))
    }

    /// Opens the directory containing this entry.
    pub fn parent_directory(&self) -> FileHandle {
        let Some(backend) = self.backend.as_ref() else {
            return FileHandle::default();
        };
        let parent = backend.path().resolve(&FilePath::new("..")).resolved();
        backend.file_system().open(&parent)
    }

    /// Opens `path` relative to this handle, on the same file system.
    pub fn open(&self, path: &str) -> FileHandle {
        let Some(backend) = self.backend.as_ref() else {
            return FileHandle::default();
        };
        let resolved = backend.path().resolve(&FilePath::new(path));
        backend.file_system().open(resolved.full_path())
    }

    pub fn create_directory(&mut self) -> bool {
        self.mutate(|backend| backend.create_directory())
    }

    pub fn remove_directory(&mut self) -> bool {
        self.mutate(|backend| backend.remove_directory())
    }

    /// Copies this file to `dest`. Handles on different file systems are
    /// copied through streams.
    pub fn copy(&mut self, dest: &mut FileHandle) -> bool {
        if self.shares_file_system(dest) {
            return self.with_pair(dest, |source, dest| source.copy(dest));
        }
        self.generic_copy(dest)
    }

    /// Moves this entry to `dest`. Across file systems this is a stream copy
    /// followed by removal of the source.
    pub fn move_to(&mut self, dest: &mut FileHandle) -> bool {
        if self.shares_file_system(dest) {
            return self.with_pair(dest, |source, dest| source.move_to(dest));
        }
        self.generic_move(dest)
    }

    /// Creates a hard link at `dest`. Links never cross file systems.
    pub fn create_link(&mut self, dest: &mut FileHandle) -> bool {
        if !self.shares_file_system(dest) {
            debug!("Refusing to link {} across file systems", self.path());
            return false;
        }
        self.with_pair(dest, |source, dest| source.create_link(dest))
    }

    /// Creates a symbolic link at `dest`. Links never cross file systems.
    pub fn create_symbolic_link(&mut self, dest: &mut FileHandle) -> bool {
        if !self.shares_file_system(dest) {
            debug!("Refusing to symlink {} across file systems", self.path());
            return false;
        }
        self.with_pair(dest, |source, dest| source.create_symbolic_link(dest))
    }

    pub fn rename(&mut self, file_name: &str) -> bool {
        self.mutate(|backend| backend.rename(file_name))
    }

    /// Removes a file. Use [`FileHandle::remove_directory`] or
    /// [`FileHandle::remove_directory_rec`] for directories.
    pub fn remove(&mut self) -> bool {
        self.mutate(|backend| backend.remove())
    }

    /// Copies this directory into `dest`, creating it if needed.
    ///
    /// Every child is attempted; the result is `false` if any of them failed.
    pub fn copy_directory_rec(&mut self, dest: &mut FileHandle) -> bool {
        if !self.is_directory() {
            return false;
        }

        if !dest.exists() {
            if !dest.create_directory() {
                debug!("Failed to create directory {}", dest.path());
                return false;
            }
            dest.update_file_info();
        }

        let mut success = true;
        for name in self.begin() {
            let mut source = self.open(&name);
            let mut target = dest.open(&name);

            let copied = if source.is_directory() {
                source.copy_directory_rec(&mut target)
            } else {
                source.copy(&mut target)
            };
            success &= copied;
        }
        success
    }

    /// Removes this directory and everything below it.
    pub fn remove_directory_rec(&mut self) -> bool {
        if !self.is_directory() {
            return false;
        }

        for name in self.begin() {
            let mut child = self.open(&name);
            if child.is_directory() && !child.is_symbolic_link() {
                child.remove_directory_rec();
            } else {
                child.remove();
            }
        }

        self.remove_directory()
    }

    pub fn create_input_stream(&self, mode: OpenMode) -> Option<Box<dyn InputStream>> {
        self.backend
            .as_ref()
            .and_then(|backend| backend.create_input_stream(mode))
    }

    pub fn create_output_stream(&mut self, mode: OpenMode) -> Option<Box<dyn OutputStream>> {
        self.backend
            .as_mut()
            .and_then(|backend| backend.create_output_stream(mode))
    }

    /// Reads the whole file. Returns nothing if it cannot be opened or read.
    pub fn read_file(&self) -> Option<Vec<u8>> {
        let mut input = self.create_input_stream(OpenMode::binary())?;
        let mut content = Vec::new();
        match input.read_to_end(&mut content) {
            Ok(_) => Some(content),
            Err(e) => {
                debug!("Failed to read {}: {}", self.path(), e);
                None
            }
        }
    }

    /// Replaces the file content with `content`, creating the file if needed.
    pub fn write_file(&mut self, content: &[u8]) -> bool {
        let Some(mut output) = self.create_output_stream(OpenMode::binary()) else {
            return false;
        };
        let result = output.write_all(content).and_then(|_| output.flush());
        drop(output);
        self.update_file_info();

        if let Err(e) = result {
            debug!("Failed to write {}: {}", self.path(), e);
            return false;
        }
        true
    }

    /// Hex-encoded SHA-1 of the file content, empty if it cannot be read.
    pub fn sha1(&self) -> String {
        crate::fs::sha1(self)
    }

    /// Base64 encoding of the file content, empty if it cannot be read.
    pub fn base64(&self) -> String {
        self.read_file()
            .map(|content| crate::fs::base64(&content))
            .unwrap_or_default()
    }

    /// Decodes `base64` and writes the result as the new file content.
    pub fn write_file_base64(&mut self, base64: &str) -> bool {
        match crate::fs::from_base64(base64) {
            Some(content) => self.write_file(&content),
            None => {
                debug!("Refusing to write {}: invalid base64 input", self.path());
                false
            }
        }
    }

    /// Takes a snapshot of this entry and everything below it.
    ///
    /// `path` becomes the root node's path, children get `path/name`. Content
    /// digests are only computed when `include_digest` is set.
    pub fn read_tree(&self, path: &str, include_digest: bool) -> Option<Tree> {
        Tree::read(self, path, include_digest)
    }

    /// Visits this entry and, where the visitor asks for it, its descendants
    /// in pre-order.
    pub fn traverse(&mut self, visitor: &mut dyn FileVisitor) {
        let descend = visitor.on_file_entry(self);
        if !(descend && self.is_directory()) {
            return;
        }

        for name in self.begin() {
            self.open(&name).traverse(visitor);
        }
    }

    /// Traverses with a single closure deciding whether to descend.
    pub fn traverse_with<F>(&mut self, on_entry: F)
    where
        F: FnMut(&mut FileHandle) -> bool,
    {
        let mut visitor = FunctionalFileVisitor::entries(on_entry);
        self.traverse(&mut visitor);
    }

    /// Traverses with separate closures for files and directories.
    pub fn traverse_split<F, D>(&mut self, on_file: F, on_directory: D)
    where
        F: FnMut(&mut FileHandle) -> bool,
        D: FnMut(&mut FileHandle) -> bool,
    {
        let mut visitor = FunctionalFileVisitor::split(on_file, on_directory);
        self.traverse(&mut visitor);
    }

    /// Creates a watcher on this handle's file system with this directory
    /// already registered.
    pub fn watch(
        &self,
        events: FileEvent,
        mode: RecursiveMode,
    ) -> Result<FileWatcher, WatcherError> {
        let Some(file_system) = self.file_system() else {
            return Ok(FileWatcher::default());
        };
        let watcher = FileWatcher::new(file_system)?;
        watcher.add(self, events, mode)?;
        Ok(watcher)
    }

    fn generic_copy(&mut self, dest: &mut FileHandle) -> bool {
        if self.is_empty() || dest.is_empty() || !self.is_file() {
            return false;
        }

        if dest.is_directory() {
            let mut inner = dest.open(&self.file_name());
            return self.generic_copy(&mut inner);
        }

        debug!("Copying {} to {} through streams", self.path(), dest.path());
        let Some(mut input) = self.create_input_stream(OpenMode::binary()) else {
            return false;
        };
        let Some(mut output) = dest.create_output_stream(OpenMode::binary()) else {
            return false;
        };

        let result = io::copy(&mut input, &mut output).and_then(|_| output.flush());
        drop(output);
        drop(input);
        dest.update_file_info();

        match result {
            Ok(()) => true,
            Err(e) => {
                debug!("Stream copy of {} failed: {}", self.path(), e);
                false
            }
        }
    }

    fn generic_move(&mut self, dest: &mut FileHandle) -> bool {
        if !self.generic_copy(dest) {
            return false;
        }
        self.remove()
    }

    fn with_pair<F>(&mut self, dest: &mut FileHandle, op: F) -> bool
    where
        F: FnOnce(&mut dyn FileHandleBackend, &mut dyn FileHandleBackend) -> bool,
    {
        match (self.backend.as_mut(), dest.backend.as_mut()) {
            (Some(source), Some(dest)) => op(source.as_mut(), dest.as_mut()),
            _ => false,
        }
    }

    fn query<T: Default>(&self, op: impl FnOnce(&dyn FileHandleBackend) -> T) -> T {
        self.backend
            .as_ref()
            .map(|backend| op(backend.as_ref()))
            .unwrap_or_default()
    }

    fn mutate(&mut self, op: impl FnOnce(&mut dyn FileHandleBackend) -> bool) -> bool {
        self.backend
            .as_mut()
            .map(|backend| op(backend.as_mut()))
            .unwrap_or(false)
    }
}

impl Clone for FileHandle {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.as_ref().map(|backend| backend.clone_backend()),
        }
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.backend.as_ref() {
            Some(backend) => f.debug_tuple("FileHandle").field(&backend.path().path()).finish(),
            None => f.write_str("FileHandle(<empty>)"),
        }
    }
}
