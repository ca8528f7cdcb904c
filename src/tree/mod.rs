//! Directory snapshots and the changes between them.

mod change;
mod diff;
mod tree;

pub use change::{Change, ChangeOperation};
pub use diff::Diff;
pub use tree::{Tree, TreeBuilder};
