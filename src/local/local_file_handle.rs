use std::cell::OnceCell;
use std::fs::{self, DirBuilder, File, Metadata, OpenOptions};
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;

use snafu::{ResultExt, ensure};

use crate::backend::{
    FileHandleBackend, FileIteratorBackend, FileSystem, InputStream, OpenMode, OutputStream,
    Permissions, target_path,
};
use crate::ext::SystemTimeExt;
use crate::local::LocalFileIterator;
use crate::local::local_error::{
    AlreadyExistsSnafu, IoSnafu, LocalError, WrongTypeSnafu, succeeded,
};
use crate::path::FilePath;

/// Metadata of the entry and of its symlink target, taken together.
struct StatSnapshot {
    file: Option<Metadata>,
    link: Option<Metadata>,
}

impl StatSnapshot {
    fn read(path: &Path) -> Self {
        let link = fs::symlink_metadata(path).ok();
        let file = match &link {
            Some(meta) if !meta.file_type().is_symlink() => Some(meta.clone()),
            Some(_) => fs::metadata(path).ok(),
            None => None,
        };
        Self { file, link }
    }
}

/// A handle backend over the native file APIs of the host.
pub struct LocalFileHandle {
    fs: Arc<dyn FileSystem>,
    path: FilePath,
    info: OnceCell<StatSnapshot>,
}

impl LocalFileHandle {
    pub fn new(fs: Arc<dyn FileSystem>, path: impl Into<FilePath>) -> Self {
        Self {
            fs,
            path: path.into(),
            info: OnceCell::new(),
        }
    }

    fn native(&self) -> &Path {
        Path::new(self.path.path())
    }

    fn snapshot(&self) -> &StatSnapshot {
        self.info.get_or_init(|| StatSnapshot::read(self.native()))
    }

    /// Metadata following symlinks.
    fn stat(&self) -> Option<&Metadata> {
        self.snapshot().file.as_ref()
    }

    /// Metadata of the entry itself.
    fn lstat(&self) -> Option<&Metadata> {
        self.snapshot().link.as_ref()
    }

    fn invalidate(&mut self) {
        self.info = OnceCell::new();
    }

    fn io_context(&self, operation: &'static str) -> IoSnafu<&'static str, String> {
        IoSnafu {
            operation,
            path: self.path.path().to_string(),
        }
    }

    fn try_create_directory(&self) -> Result<(), LocalError> {
        ensure!(
            self.lstat().is_none(),
            AlreadyExistsSnafu {
                path: self.path.path()
            }
        );

        let mut builder = DirBuilder::new();
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o755);
        }
        builder
            .create(self.native())
            .context(self.io_context("create directory"))
    }

    fn try_remove_directory(&self) -> Result<(), LocalError> {
        ensure!(
            self.is_directory(),
            WrongTypeSnafu {
                path: self.path.path(),
                expected: "directory"
            }
        );
        fs::remove_dir(self.native()).context(self.io_context("remove directory"))
    }

    fn try_copy(&self, dest: &dyn FileHandleBackend) -> Result<FilePath, LocalError> {
        ensure!(
            self.is_file(),
            WrongTypeSnafu {
                path: self.path.path(),
                expected: "file"
            }
        );
        let target = target_path(&self.path, dest);
        fs::copy(self.native(), target.path()).context(self.io_context("copy"))?;
        Ok(target)
    }

    fn try_move(&self, dest: &dyn FileHandleBackend) -> Result<FilePath, LocalError> {
        let target = target_path(&self.path, dest);
        fs::rename(self.native(), target.path()).context(self.io_context("move"))?;
        Ok(target)
    }

    fn try_hard_link(&self, dest: &dyn FileHandleBackend) -> Result<(), LocalError> {
        let target = target_path(&self.path, dest);
        fs::hard_link(self.native(), target.path()).context(self.io_context("link"))
    }

    fn try_symbolic_link(&self, dest: &dyn FileHandleBackend) -> Result<(), LocalError> {
        let target = target_path(&self.path, dest);

        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(self.native(), target.path())
                .context(self.io_context("symlink"))
        }
        #[cfg(windows)]
        {
            let result = if self.is_directory() {
                std::os::windows::fs::symlink_dir(self.native(), target.path())
            } else {
                std::os::windows::fs::symlink_file(self.native(), target.path())
            };
            result.context(self.io_context("symlink"))
        }
        #[cfg(not(any(unix, windows)))]
        {
            let _ = target;
            crate::local::local_error::UnsupportedSnafu {
                operation: "symlink",
            }
            .fail()
        }
    }

    fn try_rename(&self, file_name: &str) -> Result<FilePath, LocalError> {
        let target = FilePath::new(format!("{}{}", self.path.directory_path(), file_name));
        fs::rename(self.native(), target.path()).context(self.io_context("rename"))?;
        Ok(target)
    }

    fn try_remove(&self) -> Result<(), LocalError> {
        let removable = self
            .lstat()
            .is_some_and(|meta| meta.is_file() || meta.file_type().is_symlink());
        ensure!(
            removable,
            WrongTypeSnafu {
                path: self.path.path(),
                expected: "file"
            }
        );
        fs::remove_file(self.native()).context(self.io_context("remove"))
    }

    #[cfg(unix)]
    fn try_chown(&self, uid: Option<u32>, gid: Option<u32>) -> Result<(), LocalError> {
        std::os::unix::fs::chown(self.native(), uid, gid)
            .context(self.io_context("change owner of"))
    }

    #[cfg(not(unix))]
    fn try_chown(&self, _uid: Option<u32>, _gid: Option<u32>) -> Result<(), LocalError> {
        crate::local::local_error::UnsupportedSnafu {
            operation: "changing ownership",
        }
        .fail()
    }

    fn try_set_permissions(&self, permissions: Permissions) -> Result<(), LocalError> {
        #[cfg(unix)]
        let native = {
            use std::os::unix::fs::PermissionsExt;
            fs::Permissions::from_mode(permissions.bits())
        };
        #[cfg(not(unix))]
        let native = {
            let mut native = fs::metadata(self.native())
                .context(self.io_context("read permissions of"))?
                .permissions();
            native.set_readonly(!permissions.contains(Permissions::USER_WRITE));
            native
        };

        fs::set_permissions(self.native(), native).context(self.io_context("set permissions of"))
    }
}

impl FileHandleBackend for LocalFileHandle {
    fn clone_backend(&self) -> Box<dyn FileHandleBackend> {
        Box::new(LocalFileHandle::new(self.fs.clone(), self.path.clone()))
    }

    fn file_system(&self) -> Arc<dyn FileSystem> {
        self.fs.clone()
    }

    fn path(&self) -> &FilePath {
        &self.path
    }

    fn update_file_info(&mut self) {
        self.invalidate();
    }

    fn exists(&self) -> bool {
        self.stat().is_some()
    }

    fn is_file(&self) -> bool {
        self.stat().is_some_and(|meta| meta.is_file())
    }

    fn is_directory(&self) -> bool {
        self.stat().is_some_and(|meta| meta.is_dir())
    }

    fn is_symbolic_link(&self) -> bool {
        self.lstat().is_some_and(|meta| meta.file_type().is_symlink())
    }

    fn list_files(&self) -> Vec<String> {
        match fs::read_dir(self.native()) {
            Ok(entries) => entries
                .filter_map(Result::ok)
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn begin(&self) -> Option<Box<dyn FileIteratorBackend>> {
        if !self.is_directory() {
            return None;
        }
        Some(Box::new(LocalFileIterator::new(
            self.fs.clone(),
            self.path.path(),
        )))
    }

    fn size(&self) -> u64 {
        self.stat()
            .filter(|meta| meta.is_file())
            .map_or(0, |meta| meta.len())
    }

    fn access_time(&self) -> u64 {
        self.stat().map_or(0, |meta| meta.accessed().to_unix_seconds())
    }

    fn modification_time(&self) -> u64 {
        self.stat().map_or(0, |meta| meta.modified().to_unix_seconds())
    }

    #[cfg(unix)]
    fn user_id(&self) -> u32 {
        use std::os::unix::fs::MetadataExt;
        self.stat().map_or(0, |meta| meta.uid())
    }

    #[cfg(not(unix))]
    fn user_id(&self) -> u32 {
        0
    }

    fn set_user_id(&mut self, uid: u32) -> bool {
        let result = self.try_chown(Some(uid), None);
        self.invalidate();
        succeeded(result)
    }

    #[cfg(unix)]
    fn group_id(&self) -> u32 {
        use std::os::unix::fs::MetadataExt;
        self.stat().map_or(0, |meta| meta.gid())
    }

    #[cfg(not(unix))]
    fn group_id(&self) -> u32 {
        0
    }

    fn set_group_id(&mut self, gid: u32) -> bool {
        let result = self.try_chown(None, Some(gid));
        self.invalidate();
        succeeded(result)
    }

    #[cfg(unix)]
    fn permissions(&self) -> Permissions {
        use std::os::unix::fs::PermissionsExt;
        self.stat()
            .map_or(Permissions::NONE, |meta| Permissions::from_mode(meta.permissions().mode()))
    }

    #[cfg(not(unix))]
    fn permissions(&self) -> Permissions {
        self.stat().map_or(Permissions::NONE, |meta| {
            let readable =
                Permissions::USER_READ | Permissions::GROUP_READ | Permissions::OTHER_READ;
            let writable =
                Permissions::USER_WRITE | Permissions::GROUP_WRITE | Permissions::OTHER_WRITE;
            let executable =
                Permissions::USER_EXEC | Permissions::GROUP_EXEC | Permissions::OTHER_EXEC;

            let mut permissions = readable;
            if !meta.permissions().readonly() {
                permissions |= writable;
            }
            if meta.is_dir() {
                permissions |= executable;
            }
            permissions
        })
    }

    fn set_permissions(&mut self, permissions: Permissions) -> bool {
        let result = self.try_set_permissions(permissions);
        self.invalidate();
        succeeded(result)
    }

    fn create_directory(&mut self) -> bool {
        let result = self.try_create_directory();
        self.invalidate();
        succeeded(result)
    }

    fn remove_directory(&mut self) -> bool {
        let result = self.try_remove_directory();
        self.invalidate();
        succeeded(result)
    }

    fn copy(&mut self, dest: &mut dyn FileHandleBackend) -> bool {
        let result = self.try_copy(dest);
        dest.update_file_info();
        succeeded(result)
    }

    fn move_to(&mut self, dest: &mut dyn FileHandleBackend) -> bool {
        let result = self.try_move(dest);
        dest.update_file_info();
        self.invalidate();
        match result {
            Ok(target) => {
                self.path = target;
                true
            }
            Err(e) => succeeded::<()>(Err(e)),
        }
    }

    fn create_link(&mut self, dest: &mut dyn FileHandleBackend) -> bool {
        let result = self.try_hard_link(dest);
        dest.update_file_info();
        self.invalidate();
        succeeded(result)
    }

    fn create_symbolic_link(&mut self, dest: &mut dyn FileHandleBackend) -> bool {
        let result = self.try_symbolic_link(dest);
        dest.update_file_info();
        self.invalidate();
        succeeded(result)
    }

    fn rename(&mut self, file_name: &str) -> bool {
        let result = self.try_rename(file_name);
        self.invalidate();
        match result {
            Ok(target) => {
                self.path = target;
                true
            }
            Err(e) => succeeded::<()>(Err(e)),
        }
    }

    fn remove(&mut self) -> bool {
        let result = self.try_remove();
        self.invalidate();
        succeeded(result)
    }

    fn create_input_stream(&self, _mode: OpenMode) -> Option<Box<dyn InputStream>> {
        let file = File::open(self.native()).context(self.io_context("open"));
        match file {
            Ok(file) => Some(Box::new(BufReader::new(file))),
            Err(e) => {
                succeeded::<()>(Err(e));
                None
            }
        }
    }

    fn create_output_stream(&mut self, mode: OpenMode) -> Option<Box<dyn OutputStream>> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .append(mode.append)
            .truncate(mode.truncate && !mode.append)
            .open(self.native())
            .context(self.io_context("open for writing"));
        self.invalidate();

        match file {
            Ok(file) => Some(Box::new(BufWriter::new(file))),
            Err(e) => {
                succeeded::<()>(Err(e));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::{FileSystem, OpenMode, Permissions};
    use crate::handle::FileHandle;
    use crate::local::LocalFileSystem;
    use std::fs;
    use std::io::{Read, Seek, SeekFrom, Write};
    use tempfile::TempDir;

    fn open(dir: &TempDir, name: &str) -> FileHandle {
        LocalFileSystem::new().open(&dir.path().join(name).to_string_lossy())
    }

    fn open_pair(dir: &TempDir, a: &str, b: &str) -> (FileHandle, FileHandle) {
        let fs = LocalFileSystem::new();
        (
            fs.open(&dir.path().join(a).to_string_lossy()),
            fs.open(&dir.path().join(b).to_string_lossy()),
        )
    }

    #[test]
    fn missing_path_does_not_exist() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let handle = open(&dir, "nothing");
        assert!(!handle.exists());
        assert!(!handle.is_file());
        assert!(!handle.is_directory());
        assert_eq!(handle.size(), 0);
    }

    #[test]
    fn stat_is_cached_until_refreshed() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let mut handle = open(&dir, "later.txt");
        assert!(!handle.exists());

        fs::write(dir.path().join("later.txt"), b"now").expect("Failed to write file");
        assert!(!handle.exists());

        handle.update_file_info();
        assert!(handle.exists());
        assert_eq!(handle.size(), 3);
    }

    #[test]
    fn directory_size_is_zero() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let handle = LocalFileSystem::new().open(&dir.path().to_string_lossy());
        assert!(handle.is_directory());
        assert_eq!(handle.size(), 0);
    }

    #[test]
    fn create_directory_fails_when_path_exists() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let mut handle = open(&dir, "made");

        assert!(handle.create_directory());
        assert!(handle.is_directory());
        assert!(!handle.create_directory());
    }

    #[test]
    fn remove_directory_requires_an_empty_directory() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        fs::create_dir(dir.path().join("full")).expect("Failed to create directory");
        fs::write(dir.path().join("full/f"), b"").expect("Failed to write file");
        fs::write(dir.path().join("plain"), b"").expect("Failed to write file");

        assert!(!open(&dir, "full").remove_directory());
        assert!(!open(&dir, "plain").remove_directory());

        fs::remove_file(dir.path().join("full/f")).expect("Failed to remove file");
        assert!(open(&dir, "full").remove_directory());
    }

    #[test]
    fn remove_refuses_directories() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        fs::create_dir(dir.path().join("sub")).expect("Failed to create directory");
        assert!(!open(&dir, "sub").remove());
        assert!(dir.path().join("sub").exists());
    }

    #[test]
    fn copy_into_directory_keeps_file_name() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        fs::write(dir.path().join("a.txt"), b"alpha").expect("Failed to write file");
        fs::create_dir(dir.path().join("target")).expect("Failed to create directory");

        let (mut source, mut dest) = open_pair(&dir, "a.txt", "target");
        assert!(source.copy(&mut dest));
        assert_eq!(
            fs::read(dir.path().join("target/a.txt")).expect("Missing copy"),
            b"alpha"
        );
        assert!(source.exists());
    }

    #[test]
    fn move_follows_the_entry() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        fs::write(dir.path().join("old.txt"), b"x").expect("Failed to write file");

        let (mut source, mut dest) = open_pair(&dir, "old.txt", "new.txt");
        assert!(source.move_to(&mut dest));
        assert_eq!(source.file_name(), "new.txt");
        assert!(source.exists());
        assert!(dest.exists());
        assert!(!dir.path().join("old.txt").exists());
    }

    #[test]
    fn rename_stays_in_the_same_directory() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        fs::write(dir.path().join("before.txt"), b"x").expect("Failed to write file");

        let mut handle = open(&dir, "before.txt");
        assert!(handle.rename("after.txt"));
        assert_eq!(handle.file_name(), "after.txt");
        assert!(handle.exists());
        assert!(dir.path().join("after.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn links_are_created_on_the_same_file_system() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        fs::write(dir.path().join("target.txt"), b"linked").expect("Failed to write file");

        let fs = LocalFileSystem::new();
        let mut source = fs.open(&dir.path().join("target.txt").to_string_lossy());
        let mut hard = fs.open(&dir.path().join("hard.txt").to_string_lossy());
        let mut soft = fs.open(&dir.path().join("soft.txt").to_string_lossy());

        assert!(source.create_link(&mut hard));
        assert!(source.create_symbolic_link(&mut soft));
        assert!(hard.is_file());
        assert!(!hard.is_symbolic_link());
        assert!(soft.is_symbolic_link());
        assert_eq!(soft.read_file().as_deref(), Some(&b"linked"[..]));
    }

    #[cfg(unix)]
    #[test]
    fn set_permissions_round_trips_mode_bits() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        fs::write(dir.path().join("mode.txt"), b"").expect("Failed to write file");

        let mut handle = open(&dir, "mode.txt");
        let wanted = Permissions::USER_READ | Permissions::USER_WRITE | Permissions::GROUP_READ;
        assert!(handle.set_permissions(wanted));
        assert_eq!(handle.permissions(), wanted);
    }

    #[test]
    fn output_stream_appends_when_asked() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let mut handle = open(&dir, "log.txt");

        {
            let mut out = handle
                .create_output_stream(OpenMode::binary())
                .expect("Failed to open output stream");
            out.write_all(b"first").expect("Failed to write");
        }
        {
            let mut out = handle
                .create_output_stream(OpenMode::append())
                .expect("Failed to open output stream");
            out.write_all(b"+second").expect("Failed to write");
        }

        let mut input = handle
            .create_input_stream(OpenMode::binary())
            .expect("Failed to open input stream");
        input.seek(SeekFrom::Start(5)).expect("Failed to seek");
        let mut rest = String::new();
        input.read_to_string(&mut rest).expect("Failed to read");
        assert_eq!(rest, "+second");
    }

    #[test]
    fn input_stream_on_missing_file_is_none() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        assert!(open(&dir, "ghost").create_input_stream(OpenMode::binary()).is_none());
    }

    #[test]
    fn list_files_excludes_pseudo_entries() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        fs::write(dir.path().join("only"), b"").expect("Failed to write file");

        let handle = LocalFileSystem::new().open(&dir.path().to_string_lossy());
        assert_eq!(handle.list_files(), vec!["only".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn link_and_target_attributes_come_from_one_snapshot() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        fs::write(dir.path().join("target.txt"), b"data").expect("Failed to write file");
        std::os::unix::fs::symlink(dir.path().join("target.txt"), dir.path().join("link"))
            .expect("Failed to create symlink");

        let mut link = open(&dir, "link");
        assert!(link.is_symbolic_link());

        fs::remove_file(dir.path().join("target.txt")).expect("Failed to remove target");
        assert!(link.exists());
        assert!(link.is_file());
        assert_eq!(link.size(), 4);

        link.update_file_info();
        assert!(link.is_symbolic_link());
        assert!(!link.exists());
    }
}
