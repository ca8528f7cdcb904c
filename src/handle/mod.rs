//! The public, backend-agnostic face of the crate.

mod file_handle;
mod file_iterator;
mod visitor;

pub use file_handle::FileHandle;
pub use file_iterator::FileIterator;
pub use visitor::{FileVisitor, FunctionalFileVisitor};
