use derive_more::Display;

/// What a [`Change`] does to its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ChangeOperation {
    #[display("CP")]
    CopyFile,
    /// Copy a whole subtree.
    #[display("CPDIR")]
    CopyDir,
    #[display("RM")]
    RemoveFile,
    /// Remove a whole subtree.
    #[display("RMDIR")]
    RemoveDir,
}

/// One step of a [`Diff`](crate::tree::Diff). Displays as `CP a/b.txt`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display)]
#[display("{operation} {path}")]
pub struct Change {
    operation: ChangeOperation,
    path: String,
}

impl Change {
    pub fn new(operation: ChangeOperation, path: impl Into<String>) -> Self {
        Self {
            operation,
            path: path.into(),
        }
    }

    pub fn operation(&self) -> ChangeOperation {
        self.operation
    }

    /// Path relative to the roots the diff was computed from.
    pub fn path(&self) -> &str {
        &self.path
    }
}
