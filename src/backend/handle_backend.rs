use std::sync::Arc;

use crate::backend::{
    FileIteratorBackend, FileSystem, InputStream, OpenMode, OutputStream, Permissions,
};
use crate::path::FilePath;

/// Per-location state and operations of one storage backend.
///
/// Attribute queries are answered from a stat cache that is only refreshed by
/// [`FileHandleBackend::update_file_info`] or by a mutating call on the same
/// backend. Operations taking a second backend require it to belong to the
/// same file system; the facade never passes a foreign one.
pub trait FileHandleBackend: Send {
    /// Creates an independent backend for the same path with an empty cache.
    fn clone_backend(&self) -> Box<dyn FileHandleBackend>;

    fn file_system(&self) -> Arc<dyn FileSystem>;

    fn path(&self) -> &FilePath;

    fn update_file_info(&mut self);

    fn exists(&self) -> bool;
    fn is_file(&self) -> bool;
    fn is_directory(&self) -> bool;
    fn is_symbolic_link(&self) -> bool;

    /// Names of the directory entries, `.` and `..` excluded.
    fn list_files(&self) -> Vec<String>;

    fn begin(&self) -> Option<Box<dyn FileIteratorBackend>>;

    /// Size in bytes; 0 for anything but a regular file.
    fn size(&self) -> u64;
    /// Seconds since the Unix epoch.
    fn access_time(&self) -> u64;
    /// Seconds since the Unix epoch.
    fn modification_time(&self) -> u64;

    fn user_id(&self) -> u32;
    fn set_user_id(&mut self, uid: u32) -> bool;
    fn group_id(&self) -> u32;
    fn set_group_id(&mut self, gid: u32) -> bool;
    fn permissions(&self) -> Permissions;
    fn set_permissions(&mut self, permissions: Permissions) -> bool;

    /// Fails if anything already exists at the path.
    fn create_directory(&mut self) -> bool;
    /// Fails unless the path is an empty directory.
    fn remove_directory(&mut self) -> bool;

    fn copy(&mut self, dest: &mut dyn FileHandleBackend) -> bool;
    /// Moves the entry and points this backend at its new location.
    fn move_to(&mut self, dest: &mut dyn FileHandleBackend) -> bool;
    /// Creates a hard link to this entry at `dest`.
    fn create_link(&mut self, dest: &mut dyn FileHandleBackend) -> bool;
    /// Creates a symbolic link to this entry at `dest`.
    fn create_symbolic_link(&mut self, dest: &mut dyn FileHandleBackend) -> bool;
    /// Renames the entry within its directory and follows it.
    fn rename(&mut self, file_name: &str) -> bool;
    /// Removes a file. Directories are refused.
    fn remove(&mut self) -> bool;

    fn create_input_stream(&self, mode: OpenMode) -> Option<Box<dyn InputStream>>;
    fn create_output_stream(&mut self, mode: OpenMode) -> Option<Box<dyn OutputStream>>;
}

/// Resolves the final destination of a copy, move or link: an existing
/// directory receives the entry under the source's own file name.
pub fn target_path(source: &FilePath, dest: &dyn FileHandleBackend) -> FilePath {
    if dest.is_directory() {
        dest.path().resolve(&FilePath::new(source.file_name()))
    } else {
        dest.path().clone()
    }
}
