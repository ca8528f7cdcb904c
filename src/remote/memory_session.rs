//! An in-process [`RemoteSession`] used to exercise the remote backend
//! without a server.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use snafu::OptionExt;

use crate::remote::session::{ClosedSnafu, NotFoundSnafu, RefusedSnafu, UnknownFileSnafu};
use crate::remote::{
    FileAccess, RemoteAttributes, RemoteFileId, RemoteFileType, RemoteSession, SessionError,
};

#[derive(Debug, Clone)]
enum Node {
    File(Vec<u8>),
    Directory,
    Link(String),
}

#[derive(Debug, Clone)]
struct Entry {
    node: Node,
    mode: u32,
    uid: u32,
    gid: u32,
}

impl Entry {
    fn new(node: Node, mode: u32) -> Self {
        Self {
            node,
            mode,
            uid: 1000,
            gid: 1000,
        }
    }
}

#[derive(Debug)]
struct State {
    entries: BTreeMap<String, Entry>,
    open: HashMap<RemoteFileId, (String, FileAccess)>,
    next_file: RemoteFileId,
    broken: bool,
}

/// Shared in-memory tree; clones see the same files.
#[derive(Debug, Clone)]
pub(crate) struct MemorySession {
    state: Arc<Mutex<State>>,
}

fn parent_of(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some(("", _)) => "/",
        Some((parent, _)) => parent,
        None => "/",
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { "/".to_string() } else { trimmed.to_string() }
}

impl MemorySession {
    pub(crate) fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert("/".to_string(), Entry::new(Node::Directory, 0o755));
        Self {
            state: Arc::new(Mutex::new(State {
                entries,
                open: HashMap::new(),
                next_file: 1,
                broken: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Locks the state, failing like a dropped connection when broken.
    fn live(&self) -> Result<MutexGuard<'_, State>, SessionError> {
        let state = self.lock();
        if state.broken {
            return ClosedSnafu.fail();
        }
        Ok(state)
    }

    pub(crate) fn put_dir(&self, path: &str) {
        self.lock()
            .entries
            .insert(normalize(path), Entry::new(Node::Directory, 0o755));
    }

    pub(crate) fn put_file(&self, path: &str, content: &[u8]) {
        self.lock()
            .entries
            .insert(normalize(path), Entry::new(Node::File(content.to_vec()), 0o644));
    }

    pub(crate) fn content(&self, path: &str) -> Option<Vec<u8>> {
        match self.lock().entries.get(&normalize(path)).map(|entry| &entry.node) {
            Some(Node::File(content)) => Some(content.clone()),
            _ => None,
        }
    }

    pub(crate) fn exists(&self, path: &str) -> bool {
        self.lock().entries.contains_key(&normalize(path))
    }

    pub(crate) fn open_files(&self) -> usize {
        self.lock().open.len()
    }

    pub(crate) fn set_broken(&self, broken: bool) {
        self.lock().broken = broken;
    }
}

impl State {
    fn resolve<'a>(&'a self, path: &str) -> Option<(&'a str, &'a Entry)> {
        let mut current = normalize(path);
        for _ in 0..16 {
            let (key, entry) = self.entries.get_key_value(&current)?;
            match &entry.node {
                Node::Link(target) => current = normalize(target),
                _ => return Some((key.as_str(), entry)),
            }
        }
        None
    }

    fn children(&self, dir: &str) -> Vec<String> {
        self.entries
            .keys()
            .filter(|key| key.as_str() != "/" && parent_of(key) == dir)
            .filter_map(|key| key.rsplit('/').next().map(str::to_string))
            .collect()
    }

    fn require_directory(&self, operation: &'static str, path: &str) -> Result<(), SessionError> {
        match self.resolve(path) {
            Some((_, Entry { node: Node::Directory, .. })) => Ok(()),
            Some(_) => RefusedSnafu { operation, path }.fail(),
            None => NotFoundSnafu { path }.fail(),
        }
    }
}

fn attributes(entry: &Entry) -> RemoteAttributes {
    let (file_type, size) = match &entry.node {
        Node::File(content) => (RemoteFileType::File, content.len() as u64),
        Node::Directory => (RemoteFileType::Directory, 0),
        Node::Link(_) => (RemoteFileType::Symlink, 0),
    };
    RemoteAttributes {
        file_type,
        size,
        access_time: 1_700_000_000,
        modification_time: 1_700_000_000,
        user_id: entry.uid,
        group_id: entry.gid,
        permissions: entry.mode,
    }
}

impl RemoteSession for MemorySession {
    fn read_dir(&mut self, path: &str) -> Result<Vec<String>, SessionError> {
        let state = self.live()?;
        state.require_directory("list", path)?;
        let resolved = state
            .resolve(path)
            .map(|(key, _)| key.to_string())
            .context(NotFoundSnafu { path })?;
        Ok(state.children(&resolved))
    }

    fn stat(&mut self, path: &str) -> Result<RemoteAttributes, SessionError> {
        let state = self.live()?;
        state
            .resolve(path)
            .map(|(_, entry)| attributes(entry))
            .context(NotFoundSnafu { path })
    }

    fn lstat(&mut self, path: &str) -> Result<RemoteAttributes, SessionError> {
        let state = self.live()?;
        state
            .entries
            .get(&normalize(path))
            .map(attributes)
            .context(NotFoundSnafu { path })
    }

    fn set_owner(&mut self, path: &str, uid: u32, gid: u32) -> Result<(), SessionError> {
        let mut state = self.live()?;
        let entry = state
            .entries
            .get_mut(&normalize(path))
            .context(NotFoundSnafu { path })?;
        entry.uid = uid;
        entry.gid = gid;
        Ok(())
    }

    fn set_permissions(&mut self, path: &str, mode: u32) -> Result<(), SessionError> {
        let mut state = self.live()?;
        let entry = state
            .entries
            .get_mut(&normalize(path))
            .context(NotFoundSnafu { path })?;
        entry.mode = mode & 0o7777;
        Ok(())
    }

    fn open(&mut self, path: &str, access: FileAccess) -> Result<RemoteFileId, SessionError> {
        let mut state = self.live()?;
        let key = normalize(path);

        match (state.entries.get_mut(&key).map(|entry| &mut entry.node), access) {
            (Some(Node::File(_)), FileAccess::Read | FileAccess::Append) => {}
            (Some(Node::File(content)), FileAccess::Write) => content.clear(),
            (Some(_), _) => return RefusedSnafu { operation: "open", path }.fail(),
            (None, FileAccess::Read) => return NotFoundSnafu { path }.fail(),
            (None, FileAccess::Write | FileAccess::Append) => {
                state.require_directory("create a file in", parent_of(&key))?;
                state
                    .entries
                    .insert(key.clone(), Entry::new(Node::File(Vec::new()), 0o644));
            }
        }

        let id = state.next_file;
        state.next_file += 1;
        state.open.insert(id, (key, access));
        Ok(id)
    }

    fn read(
        &mut self,
        file: RemoteFileId,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<usize, SessionError> {
        let state = self.live()?;
        let (path, _) = state.open.get(&file).context(UnknownFileSnafu { id: file })?;
        let Some(Entry { node: Node::File(content), .. }) = state.entries.get(path) else {
            return NotFoundSnafu { path: path.as_str() }.fail();
        };

        let start = (offset as usize).min(content.len());
        let n = (content.len() - start).min(buf.len());
        buf[..n].copy_from_slice(&content[start..start + n]);
        Ok(n)
    }

    fn write(
        &mut self,
        file: RemoteFileId,
        offset: u64,
        data: &[u8],
    ) -> Result<usize, SessionError> {
        let mut state = self.live()?;
        let (path, access) = state
            .open
            .get(&file)
            .cloned()
            .context(UnknownFileSnafu { id: file })?;
        let Some(Entry { node: Node::File(content), .. }) = state.entries.get_mut(&path) else {
            return NotFoundSnafu { path }.fail();
        };

        let start = if access == FileAccess::Append {
            content.len()
        } else {
            offset as usize
        };
        if content.len() < start + data.len() {
            content.resize(start + data.len(), 0);
        }
        content[start..start + data.len()].copy_from_slice(data);
        Ok(data.len())
    }

    fn file_size(&mut self, file: RemoteFileId) -> Result<u64, SessionError> {
        let state = self.live()?;
        let (path, _) = state.open.get(&file).context(UnknownFileSnafu { id: file })?;
        match state.entries.get(path) {
            Some(Entry { node: Node::File(content), .. }) => Ok(content.len() as u64),
            _ => NotFoundSnafu { path: path.as_str() }.fail(),
        }
    }

    fn close(&mut self, file: RemoteFileId) -> Result<(), SessionError> {
        let mut state = self.lock();
        state
            .open
            .remove(&file)
            .map(|_| ())
            .context(UnknownFileSnafu { id: file })
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), SessionError> {
        let mut state = self.live()?;
        let (from, to) = (normalize(from), normalize(to));
        if !state.entries.contains_key(&from) {
            return NotFoundSnafu { path: from }.fail();
        }
        if state.entries.contains_key(&to) {
            return RefusedSnafu { operation: "rename onto", path: to }.fail();
        }
        state.require_directory("move into", parent_of(&to))?;

        let prefix = format!("{}/", from);
        let moved: Vec<String> = state
            .entries
            .keys()
            .filter(|key| **key == from || key.starts_with(&prefix))
            .cloned()
            .collect();
        for key in moved {
            if let Some(entry) = state.entries.remove(&key) {
                let renamed = format!("{}{}", to, &key[from.len()..]);
                state.entries.insert(renamed, entry);
            }
        }
        Ok(())
    }

    fn create_dir(&mut self, path: &str, mode: u32) -> Result<(), SessionError> {
        let mut state = self.live()?;
        let key = normalize(path);
        if state.entries.contains_key(&key) {
            return RefusedSnafu { operation: "create directory", path }.fail();
        }
        state.require_directory("create a directory in", parent_of(&key))?;
        state.entries.insert(key, Entry::new(Node::Directory, mode));
        Ok(())
    }

    fn remove_dir(&mut self, path: &str) -> Result<(), SessionError> {
        let mut state = self.live()?;
        let key = normalize(path);
        match state.entries.get(&key).map(|entry| &entry.node) {
            Some(Node::Directory) if state.children(&key).is_empty() => {
                state.entries.remove(&key);
                Ok(())
            }
            Some(_) => RefusedSnafu { operation: "remove directory", path }.fail(),
            None => NotFoundSnafu { path }.fail(),
        }
    }

    fn remove_file(&mut self, path: &str) -> Result<(), SessionError> {
        let mut state = self.live()?;
        let key = normalize(path);
        match state.entries.get(&key).map(|entry| &entry.node) {
            Some(Node::File(_) | Node::Link(_)) => {
                state.entries.remove(&key);
                Ok(())
            }
            Some(Node::Directory) => RefusedSnafu { operation: "remove", path }.fail(),
            None => NotFoundSnafu { path }.fail(),
        }
    }

    fn symlink(&mut self, target: &str, link: &str) -> Result<(), SessionError> {
        let mut state = self.live()?;
        let key = normalize(link);
        if state.entries.contains_key(&key) {
            return RefusedSnafu { operation: "create symbolic link", path: link }.fail();
        }
        state
            .entries
            .insert(key, Entry::new(Node::Link(target.to_string()), 0o777));
        Ok(())
    }
}
