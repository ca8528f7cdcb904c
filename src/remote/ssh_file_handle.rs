use std::cell::OnceCell;
use std::sync::Arc;

use tracing::debug;

use crate::backend::{
    FileHandleBackend, FileIteratorBackend, FileSystem, InputStream, OpenMode, OutputStream,
    Permissions, target_path,
};
use crate::path::FilePath;
use crate::remote::session::RefusedSnafu;
use crate::remote::stream_buffer::BUFFER_SIZE;
use crate::remote::{
    FileAccess, RemoteAttributes, RemoteFileType, RemoteReader, RemoteWriter, SessionError,
    SshFileIterator, SshFileSystem,
};

/// Collapses a remote operation into the boolean handle contract.
fn succeeded<T>(result: Result<T, SessionError>) -> bool {
    match result {
        Ok(_) => true,
        Err(e) => {
            debug!("{}", e);
            false
        }
    }
}

/// Attributes of the entry and of its symlink target, fetched together.
struct StatSnapshot {
    file: Option<RemoteAttributes>,
    link: Option<RemoteAttributes>,
}

/// A handle backend talking to an [`SshFileSystem`].
pub struct SshFileHandle {
    fs: Arc<SshFileSystem>,
    path: FilePath,
    info: OnceCell<StatSnapshot>,
}

impl SshFileHandle {
    pub fn new(fs: Arc<SshFileSystem>, path: impl Into<FilePath>) -> Self {
        Self {
            fs,
            path: path.into(),
            info: OnceCell::new(),
        }
    }

    fn remote_path(&self) -> &str {
        self.path.full_path()
    }

    fn snapshot(&self) -> &StatSnapshot {
        self.info.get_or_init(|| {
            let path = self.remote_path();
            let link = self.fs.run(|session| session.lstat(path)).ok();
            let file = match &link {
                Some(attrs) if attrs.file_type != RemoteFileType::Symlink => Some(attrs.clone()),
                Some(_) => self.fs.run(|session| session.stat(path)).ok(),
                None => None,
            };
            StatSnapshot { file, link }
        })
    }

    fn stat(&self) -> Option<&RemoteAttributes> {
        self.snapshot().file.as_ref()
    }

    fn lstat(&self) -> Option<&RemoteAttributes> {
        self.snapshot().link.as_ref()
    }

    fn file_type(&self) -> Option<RemoteFileType> {
        self.stat().map(|attrs| attrs.file_type)
    }

    fn invalidate(&mut self) {
        self.info = OnceCell::new();
    }

    fn refuse(&self, operation: &'static str) -> Result<(), SessionError> {
        RefusedSnafu {
            operation,
            path: self.remote_path(),
        }
        .fail()
    }

    fn try_set_owner(&self, uid: Option<u32>, gid: Option<u32>) -> Result<(), SessionError> {
        let uid = uid.unwrap_or_else(|| self.user_id());
        let gid = gid.unwrap_or_else(|| self.group_id());
        self.fs
            .run(|session| session.set_owner(self.remote_path(), uid, gid))
    }

    /// SFTP has no server-side copy, so the bytes travel through the session.
    fn try_copy(&self, dest: &dyn FileHandleBackend) -> Result<(), SessionError> {
        if self.file_type() != Some(RemoteFileType::File) {
            return self.refuse("copy non-file");
        }
        let target = target_path(&self.path, dest);
        let (source, target) = (self.remote_path(), target.full_path());

        self.fs.run(|session| {
            let input = session.open(source, FileAccess::Read)?;
            let output = match session.open(target, FileAccess::Write) {
                Ok(output) => output,
                Err(e) => {
                    session.close(input)?;
                    return Err(e);
                }
            };

            let mut buffer = vec![0u8; BUFFER_SIZE];
            let mut offset = 0u64;
            let transfer = loop {
                match session.read(input, offset, &mut buffer) {
                    Ok(0) => break Ok(()),
                    Ok(n) => {
                        if let Err(e) = session.write(output, offset, &buffer[..n]) {
                            break Err(e);
                        }
                        offset += n as u64;
                    }
                    Err(e) => break Err(e),
                }
            };

            session.close(input)?;
            session.close(output)?;
            transfer
        })
    }

    fn try_move(&self, dest: &dyn FileHandleBackend) -> Result<FilePath, SessionError> {
        if self.stat().is_none() {
            self.refuse("move missing")?;
        }
        let target = target_path(&self.path, dest);
        self.fs
            .run(|session| session.rename(self.remote_path(), target.full_path()))?;
        Ok(target)
    }

    fn try_rename(&self, file_name: &str) -> Result<FilePath, SessionError> {
        if self.stat().is_none() {
            self.refuse("rename missing")?;
        }
        let target = FilePath::new(format!("{}{}", self.path.directory_path(), file_name));
        self.fs
            .run(|session| session.rename(self.remote_path(), target.full_path()))?;
        Ok(target)
    }

    fn open_stream(&self, access: FileAccess) -> Option<u64> {
        let result = self
            .fs
            .run(|session| session.open(self.remote_path(), access));
        match result {
            Ok(file) => Some(file),
            Err(e) => {
                debug!("{}", e);
                None
            }
        }
    }
}

impl FileHandleBackend for SshFileHandle {
    fn clone_backend(&self) -> Box<dyn FileHandleBackend> {
        Box::new(SshFileHandle::new(self.fs.clone(), self.path.clone()))
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
        self.file_type() == Some(RemoteFileType::File)
    }

    fn is_directory(&self) -> bool {
        self.file_type() == Some(RemoteFileType::Directory)
    }

    fn is_symbolic_link(&self) -> bool {
        self.lstat()
            .is_some_and(|attrs| attrs.file_type == RemoteFileType::Symlink)
    }

    fn list_files(&self) -> Vec<String> {
        self.fs
            .run(|session| session.read_dir(self.remote_path()))
            .unwrap_or_else(|e| {
                debug!("{}", e);
                Vec::new()
            })
    }

    fn begin(&self) -> Option<Box<dyn FileIteratorBackend>> {
        if !self.is_directory() {
            return None;
        }
        Some(Box::new(SshFileIterator::new(
            self.fs.clone(),
            self.remote_path(),
        )))
    }

    fn size(&self) -> u64 {
        self.stat()
            .filter(|attrs| attrs.file_type == RemoteFileType::File)
            .map_or(0, |attrs| attrs.size)
    }

    fn access_time(&self) -> u64 {
        self.stat().map_or(0, |attrs| attrs.access_time)
    }

    fn modification_time(&self) -> u64 {
        self.stat().map_or(0, |attrs| attrs.modification_time)
    }

    fn user_id(&self) -> u32 {
        self.stat().map_or(0, |attrs| attrs.user_id)
    }

    fn set_user_id(&mut self, uid: u32) -> bool {
        let result = self.try_set_owner(Some(uid), None);
        self.invalidate();
        succeeded(result)
    }

    fn group_id(&self) -> u32 {
        self.stat().map_or(0, |attrs| attrs.group_id)
    }

    fn set_group_id(&mut self, gid: u32) -> bool {
        let result = self.try_set_owner(None, Some(gid));
        self.invalidate();
        succeeded(result)
    }

    fn permissions(&self) -> Permissions {
        self.stat()
            .map_or(Permissions::NONE, |attrs| Permissions::from_mode(attrs.permissions))
    }

    fn set_permissions(&mut self, permissions: Permissions) -> bool {
        let result = self
            .fs
            .run(|session| session.set_permissions(self.remote_path(), permissions.bits()));
        self.invalidate();
        succeeded(result)
    }

    fn create_directory(&mut self) -> bool {
        let result = if self.lstat().is_some() {
            self.refuse("create existing directory")
        } else {
            self.fs
                .run(|session| session.create_dir(self.remote_path(), 0o755))
        };
        self.invalidate();
        succeeded(result)
    }

    fn remove_directory(&mut self) -> bool {
        let result = if self.is_directory() {
            self.fs
                .run(|session| session.remove_dir(self.remote_path()))
        } else {
            self.refuse("remove non-directory")
        };
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

    /// SFTP has no hard links.
    fn create_link(&mut self, dest: &mut dyn FileHandleBackend) -> bool {
        let target = target_path(&self.path, dest);
        let result = self
            .fs
            .run(|session| session.hard_link(self.remote_path(), target.full_path()));
        dest.update_file_info();
        succeeded(result)
    }

    fn create_symbolic_link(&mut self, dest: &mut dyn FileHandleBackend) -> bool {
        let target = target_path(&self.path, dest);
        let result = self
            .fs
            .run(|session| session.symlink(self.remote_path(), target.full_path()));
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
        let removable = self.lstat().is_some_and(|attrs| {
            matches!(attrs.file_type, RemoteFileType::File | RemoteFileType::Symlink)
        });
        let result = if removable {
            self.fs
                .run(|session| session.remove_file(self.remote_path()))
        } else {
            self.refuse("remove non-file")
        };
        self.invalidate();
        succeeded(result)
    }

    fn create_input_stream(&self, _mode: OpenMode) -> Option<Box<dyn InputStream>> {
        let file = self.open_stream(FileAccess::Read)?;
        Some(Box::new(RemoteReader::new(self.fs.clone(), file)))
    }

    fn create_output_stream(&mut self, mode: OpenMode) -> Option<Box<dyn OutputStream>> {
        let access = if mode.append {
            FileAccess::Append
        } else {
            FileAccess::Write
        };
        let file = self.open_stream(access);
        self.invalidate();
        Some(Box::new(RemoteWriter::new(self.fs.clone(), file?)))
    }
}
