//! Backend over the host's own file system.

mod local_error;
mod local_file_handle;
mod local_file_iterator;
mod local_file_system;

pub use local_error::LocalError;
pub use local_file_handle::LocalFileHandle;
pub use local_file_iterator::LocalFileIterator;
pub use local_file_system::LocalFileSystem;
