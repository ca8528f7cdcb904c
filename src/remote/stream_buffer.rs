use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use tracing::debug;

use crate::remote::{RemoteFileId, SessionError, SshFileSystem};

pub(crate) const BUFFER_SIZE: usize = 64 * 1024;

fn to_io(error: SessionError) -> io::Error {
    io::Error::other(error)
}

fn offset_by(base: u64, delta: i64) -> io::Result<u64> {
    base.checked_add_signed(delta).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "seek before the start of the file")
    })
}

/// Buffered reader over a remote file. Closes the file when dropped.
pub struct RemoteReader {
    fs: Arc<SshFileSystem>,
    file: RemoteFileId,
    /// Offset of the first byte after the buffer.
    position: u64,
    buffer: Vec<u8>,
    cursor: usize,
}

impl RemoteReader {
    pub(crate) fn new(fs: Arc<SshFileSystem>, file: RemoteFileId) -> Self {
        Self {
            fs,
            file,
            position: 0,
            buffer: Vec::with_capacity(BUFFER_SIZE),
            cursor: 0,
        }
    }

    fn logical_position(&self) -> u64 {
        self.position - (self.buffer.len() - self.cursor) as u64
    }

    fn refill(&mut self) -> io::Result<()> {
        self.buffer.resize(BUFFER_SIZE, 0);
        let (file, position) = (self.file, self.position);
        let buffer = &mut self.buffer;
        let read = self
            .fs
            .run(|session| session.read(file, position, buffer))
            .map_err(to_io);

        match read {
            Ok(n) => {
                self.buffer.truncate(n);
                self.cursor = 0;
                self.position += n as u64;
                Ok(())
            }
            Err(e) => {
                self.buffer.clear();
                self.cursor = 0;
                Err(e)
            }
        }
    }
}

impl Read for RemoteReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        if self.cursor == self.buffer.len() {
            self.refill()?;
        }

        let available = &self.buffer[self.cursor..];
        let n = available.len().min(out.len());
        out[..n].copy_from_slice(&available[..n]);
        self.cursor += n;
        Ok(n)
    }
}

impl Seek for RemoteReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset,
            SeekFrom::Current(delta) => offset_by(self.logical_position(), delta)?,
            SeekFrom::End(delta) => {
                let file = self.file;
                let size = self
                    .fs
                    .run(|session| session.file_size(file))
                    .map_err(to_io)?;
                offset_by(size, delta)?
            }
        };

        self.position = target;
        self.buffer.clear();
        self.cursor = 0;
        Ok(target)
    }
}

impl Drop for RemoteReader {
    fn drop(&mut self) {
        let file = self.file;
        if let Err(e) = self.fs.run(|session| session.close(file)) {
            debug!("{}", e);
        }
    }
}

/// Buffered writer over a remote file. Flushes and closes when dropped.
pub struct RemoteWriter {
    fs: Arc<SshFileSystem>,
    file: RemoteFileId,
    /// Offset the buffered bytes will be written at.
    position: u64,
    buffer: Vec<u8>,
}

impl RemoteWriter {
    pub(crate) fn new(fs: Arc<SshFileSystem>, file: RemoteFileId) -> Self {
        Self {
            fs,
            file,
            position: 0,
            buffer: Vec::with_capacity(BUFFER_SIZE),
        }
    }

    fn flush_buffer(&mut self) -> io::Result<()> {
        let file = self.file;
        while !self.buffer.is_empty() {
            let (position, pending) = (self.position, &self.buffer);
            let written = self
                .fs
                .run(|session| session.write(file, position, pending))
                .map_err(to_io)?;
            if written == 0 {
                return Err(io::Error::from(io::ErrorKind::WriteZero));
            }
            self.buffer.drain(..written);
            self.position += written as u64;
        }
        Ok(())
    }
}

impl Write for RemoteWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(data);
        if self.buffer.len() >= BUFFER_SIZE {
            self.flush_buffer()?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_buffer()
    }
}

impl Seek for RemoteWriter {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.flush_buffer()?;

        let target = match pos {
            SeekFrom::Start(offset) => offset,
            SeekFrom::Current(delta) => offset_by(self.position, delta)?,
            SeekFrom::End(delta) => {
                let file = self.file;
                let size = self
                    .fs
                    .run(|session| session.file_size(file))
                    .map_err(to_io)?;
                offset_by(size, delta)?
            }
        };

        self.position = target;
        Ok(target)
    }
}

impl Drop for RemoteWriter {
    fn drop(&mut self) {
        if let Err(e) = self.flush_buffer() {
            debug!("Failed to flush remote file {}: {}", self.file, e);
        }
        let file = self.file;
        if let Err(e) = self.fs.run(|session| session.close(file)) {
            debug!("{}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::FileAccess;
    use crate::remote::memory_session::MemorySession;

    fn remote_with(path: &str, content: &[u8]) -> (Arc<SshFileSystem>, MemorySession) {
        let session = MemorySession::new();
        session.put_file(path, content);
        (SshFileSystem::from_session(Box::new(session.clone())), session)
    }

    #[test]
    fn reader_crosses_buffer_boundaries() {
        let content: Vec<u8> = (0..BUFFER_SIZE * 2 + 17).map(|i| (i % 251) as u8).collect();
        let (fs, _) = remote_with("/big.bin", &content);

        let file = fs
            .run(|session| session.open("/big.bin", FileAccess::Read))
            .expect("Failed to open file");
        let mut reader = RemoteReader::new(fs, file);
        let mut read = Vec::new();
        reader.read_to_end(&mut read).expect("Failed to read file");

        assert_eq!(read, content);
    }

    #[test]
    fn reader_seeks_relative_to_buffered_position() {
        let (fs, _) = remote_with("/abc.txt", b"abcdefghij");
        let file = fs
            .run(|session| session.open("/abc.txt", FileAccess::Read))
            .expect("Failed to open file");
        let mut reader = RemoteReader::new(fs, file);

        let mut two = [0u8; 2];
        reader.read_exact(&mut two).expect("Failed to read");
        assert_eq!(&two, b"ab");

        assert_eq!(reader.seek(SeekFrom::Current(3)).expect("Failed to seek"), 5);
        reader.read_exact(&mut two).expect("Failed to read");
        assert_eq!(&two, b"fg");

        assert_eq!(reader.seek(SeekFrom::End(-1)).expect("Failed to seek"), 9);
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).expect("Failed to read");
        assert_eq!(rest, b"j");

        assert!(reader.seek(SeekFrom::Current(-100)).is_err());
    }

    #[test]
    fn writer_flushes_on_drop_and_closes() {
        let (fs, session) = remote_with("/out.txt", b"");
        let file = fs
            .run(|session| session.open("/out.txt", FileAccess::Write))
            .expect("Failed to open file");

        {
            let mut writer = RemoteWriter::new(fs, file);
            writer.write_all(b"hello ").expect("Failed to write");
            writer.write_all(b"world").expect("Failed to write");
        }

        assert_eq!(session.content("/out.txt"), Some(b"hello world".to_vec()));
        assert_eq!(session.open_files(), 0);
    }

    #[test]
    fn writer_seek_overwrites_in_place() {
        let (fs, session) = remote_with("/patch.txt", b"");
        let file = fs
            .run(|session| session.open("/patch.txt", FileAccess::Write))
            .expect("Failed to open file");

        let mut writer = RemoteWriter::new(fs, file);
        writer.write_all(b"0123456789").expect("Failed to write");
        writer.seek(SeekFrom::Start(2)).expect("Failed to seek");
        writer.write_all(b"ab").expect("Failed to write");
        writer.flush().expect("Failed to flush");

        assert_eq!(session.content("/patch.txt"), Some(b"01ab456789".to_vec()));
    }
}
