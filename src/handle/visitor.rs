use crate::handle::FileHandle;

/// Callbacks for [`FileHandle::traverse`].
///
/// Every method returns whether the traversal should descend into the entry.
/// The default `on_file_entry` routes to `on_directory` or `on_file`.
pub trait FileVisitor {
    fn on_file_entry(&mut self, handle: &mut FileHandle) -> bool {
        if handle.is_directory() {
            self.on_directory(handle)
        } else if handle.is_file() {
            self.on_file(handle)
        } else {
            false
        }
    }

    fn on_file(&mut self, _handle: &mut FileHandle) -> bool {
        false
    }

    fn on_directory(&mut self, _handle: &mut FileHandle) -> bool {
        false
    }
}

type VisitFn<'a> = Box<dyn FnMut(&mut FileHandle) -> bool + 'a>;

/// A visitor built from closures.
pub enum FunctionalFileVisitor<'a> {
    /// One closure sees every entry.
    Entries(VisitFn<'a>),
    /// Files and directories go to separate closures.
    Split {
        on_file: VisitFn<'a>,
        on_directory: VisitFn<'a>,
    },
}

impl<'a> FunctionalFileVisitor<'a> {
    pub fn entries(on_entry: impl FnMut(&mut FileHandle) -> bool + 'a) -> Self {
        Self::Entries(Box::new(on_entry))
    }

    pub fn split(
        on_file: impl FnMut(&mut FileHandle) -> bool + 'a,
        on_directory: impl FnMut(&mut FileHandle) -> bool + 'a,
    ) -> Self {
        Self::Split {
            on_file: Box::new(on_file),
            on_directory: Box::new(on_directory),
        }
    }
}

impl FileVisitor for FunctionalFileVisitor<'_> {
    fn on_file_entry(&mut self, handle: &mut FileHandle) -> bool {
        match self {
            Self::Entries(on_entry) => on_entry(handle),
            Self::Split {
                on_file,
                on_directory,
            } => {
                if handle.is_directory() {
                    on_directory(handle)
                } else if handle.is_file() {
                    on_file(handle)
                } else {
                    false
                }
            }
        }
    }
}
