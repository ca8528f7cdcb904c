use std::io::{Read, Seek, Write};

/// A readable byte stream handed out by a backend.
pub trait InputStream: Read + Seek + Send {}

impl<T: Read + Seek + Send> InputStream for T {}

/// A writable byte stream handed out by a backend.
///
/// Buffered implementations flush when dropped; call `flush` explicitly to
/// observe write errors.
pub trait OutputStream: Write + Seek + Send {}

impl<T: Write + Seek + Send> OutputStream for T {}

/// How a stream is opened.
///
/// `binary` is carried for callers that distinguish text from binary data;
/// no backend translates line endings, so both modes see identical bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenMode {
    pub binary: bool,
    pub append: bool,
    pub truncate: bool,
}

impl OpenMode {
    /// Binary read, or write from the start of a truncated file.
    pub const fn binary() -> Self {
        Self {
            binary: true,
            append: false,
            truncate: true,
        }
    }

    pub const fn text() -> Self {
        Self {
            binary: false,
            append: false,
            truncate: true,
        }
    }

    /// Binary write at the end of the existing content.
    pub const fn append() -> Self {
        Self {
            binary: true,
            append: true,
            truncate: false,
        }
    }
}

impl Default for OpenMode {
    fn default() -> Self {
        Self::binary()
    }
}
