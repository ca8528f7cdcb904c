//! Syntactic path handling. Nothing in here touches the disk.

mod file_path;

pub use file_path::FilePath;
