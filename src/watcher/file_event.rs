use std::fmt;

use derive_more::{BitAnd, BitOr, BitOrAssign};

/// A set of change kinds. Delivered events carry exactly one kind; masks
/// passed to `add` may combine several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, BitOr, BitOrAssign, BitAnd)]
pub struct FileEvent(u8);

impl FileEvent {
    pub const NONE: Self = Self(0);
    pub const CREATED: Self = Self(1);
    pub const REMOVED: Self = Self(2);
    pub const MODIFIED: Self = Self(4);
    pub const ATTR_CHANGED: Self = Self(8);
    pub const ALL: Self = Self(1 | 2 | 4 | 8);

    pub const fn contains(self, other: Self) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn bits(self) -> u8 {
        self.0
    }
}

impl Default for FileEvent {
    fn default() -> Self {
        Self::ALL
    }
}

impl fmt::Display for FileEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::CREATED, "created"),
            (Self::REMOVED, "removed"),
            (Self::MODIFIED, "modified"),
            (Self::ATTR_CHANGED, "attr-changed"),
        ];
        let parts: Vec<&str> = names
            .iter()
            .filter(|(kind, _)| self.contains(*kind))
            .map(|(_, name)| *name)
            .collect();

        if parts.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&parts.join("|"))
        }
    }
}

/// Whether a registration covers the whole subtree or one directory level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecursiveMode {
    NonRecursive,
    #[default]
    Recursive,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[test]
    fn masks_combine_and_test() {
        let mask = FileEvent::CREATED | FileEvent::REMOVED;
        assert!(mask.contains(FileEvent::CREATED));
        assert!(!mask.contains(FileEvent::MODIFIED));
        assert!(!mask.contains(FileEvent::NONE));
        assert!(FileEvent::ALL.contains(mask));
    }

    #[rstest]
    #[case(FileEvent::CREATED, "created")]
    #[case(FileEvent::ATTR_CHANGED, "attr-changed")]
    #[case(FileEvent::MODIFIED | FileEvent::REMOVED, "removed|modified")]
    #[case(FileEvent::NONE, "none")]
    fn displays_kind_names(#[case] event: FileEvent, #[case] expected: &str) {
        assert_eq!(event.to_string(), expected);
    }
}
