use std::fmt;
use std::sync::OnceLock;

/// A `/`-separated path string with a lazily computed decomposition.
///
/// Backslashes are converted to forward slashes on construction. The
/// decomposition (full path, file name, extension, ...) is computed at most
/// once and only thrown away by [`FilePath::set_path`].
#[derive(Clone, Default)]
pub struct FilePath {
    path: String,
    points_to_content: bool,
    details: OnceLock<PathDetails>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct PathDetails {
    full_path: String,
    file_name: String,
    base_name: String,
    extension: String,
    directory_path: String,
    drive_letter: String,
    absolute: bool,
}

impl FilePath {
    /// Creates a path from any string, unifying separators.
    pub fn new(path: impl Into<String>) -> Self {
        let mut file_path = Self::default();
        file_path.set_path(path);
        file_path
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Replaces the path string and drops the cached decomposition.
    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = path.into().replace('\\', "/");
        self.points_to_content = self.path.ends_with('/');
        self.details = OnceLock::new();
    }

    /// Returns the path with platform-native separators.
    pub fn to_native(&self) -> String {
        if cfg!(windows) {
            self.path.replace('/', "\\")
        } else {
            self.path.clone()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }

    /// Whether the path ends with a separator, i.e. names the contents of a
    /// directory rather than the directory itself.
    pub fn points_to_content(&self) -> bool {
        self.points_to_content
    }

    /// The path without a trailing separator.
    pub fn full_path(&self) -> &str {
        &self.details().full_path
    }

    pub fn file_name(&self) -> &str {
        &self.details().file_name
    }

    /// The file name up to (not including) its first non-leading dot.
    pub fn base_name(&self) -> &str {
        &self.details().base_name
    }

    /// The file name from its first non-leading dot on, dot included.
    pub fn extension(&self) -> &str {
        &self.details().extension
    }

    /// The containing directory, with a trailing separator.
    pub fn directory_path(&self) -> &str {
        &self.details().directory_path
    }

    /// The drive prefix (`C:`) if the path has one, otherwise empty.
    pub fn drive_letter(&self) -> &str {
        &self.details().drive_letter
    }

    pub fn is_absolute(&self) -> bool {
        self.details().absolute
    }

    pub fn is_relative(&self) -> bool {
        !self.details().absolute
    }

    /// Resolves `path` relative to this path.
    ///
    /// Absolute inputs are returned unchanged. The result is not normalized,
    /// see [`FilePath::resolved`] for that.
    pub fn resolve(&self, path: &FilePath) -> FilePath {
        if path.is_empty() && self.is_empty() {
            return FilePath::default();
        }
        if path.is_absolute() || self.is_empty() {
            return path.clone();
        }
        if path.is_empty() {
            return self.clone();
        }
        FilePath::new(format!("{}/{}", self.full_path(), path.path()))
    }

    /// Returns the normalized path string with `.` and `..` segments folded.
    ///
    /// Leading `..` segments of a relative path are kept, and `..` never climbs
    /// above the root of an absolute path. An empty result is returned as `.`.
    pub fn resolved(&self) -> String {
        let parts = split_parts(&self.path);

        let mut stack: Vec<&str> = Vec::with_capacity(parts.len());
        let mut removable = 0usize;
        let mut absolute = false;

        for (i, part) in parts.iter().copied().enumerate() {
            if i == 0 && is_root_part(part) {
                absolute = true;
            }

            if part == "." {
                continue;
            } else if part == ".." && removable > 0 {
                stack.pop();
                removable -= 1;
            } else {
                stack.push(part);
                if !(i == 0 && absolute) && part != ".." {
                    removable += 1;
                }
            }
        }

        let mut resolved = String::new();
        for (i, part) in stack.iter().enumerate() {
            resolved.push_str(part);
            if i + 1 < stack.len() || (i == 0 && absolute) {
                resolved.push('/');
            }
        }

        if resolved.is_empty() {
            ".".to_string()
        } else {
            resolved
        }
    }

    fn details(&self) -> &PathDetails {
        self.details.get_or_init(|| analyze(&self.path))
    }
}

/// Splits on `/` the way a line reader does: an empty string has no parts and
/// a single trailing empty part is dropped.
fn split_parts(path: &str) -> Vec<&str> {
    let mut parts: Vec<&str> = path.split('/').collect();
    if parts.last() == Some(&"") {
        parts.pop();
    }
    parts
}

fn is_root_part(part: &str) -> bool {
    part.is_empty() || (part.len() == 2 && part.as_bytes()[1] == b':')
}

fn analyze(path: &str) -> PathDetails {
    let mut parts: Vec<String> = split_parts(path).into_iter().map(String::from).collect();
    let count = parts.len();
    let mut absolute = false;

    for (i, part) in parts.iter_mut().enumerate() {
        if i == 0 && is_root_part(part) {
            part.push('/');
            absolute = true;
        } else if i + 1 < count {
            part.push('/');
        }
    }

    let file_name = parts.last().cloned().unwrap_or_default();

    let (directory_path, full_path) = if count > 1 {
        let directory_path = parts[..count - 1].concat();
        let full_path = format!("{directory_path}{file_name}");
        (directory_path, full_path)
    } else if count == 1 && absolute {
        (parts[0].clone(), parts[0].clone())
    } else {
        (String::new(), file_name.clone())
    };

    let dot = file_name
        .char_indices()
        .skip(1)
        .find(|(_, c)| *c == '.')
        .map(|(pos, _)| pos);
    let (base_name, extension) = match dot {
        Some(pos) if file_name != "." && file_name != ".." => {
            (file_name[..pos].to_string(), file_name[pos..].to_string())
        }
        _ => (file_name.clone(), String::new()),
    };

    let drive_letter = match full_path.find(':') {
        Some(1) => path.get(..2).unwrap_or_default().to_string(),
        _ => String::new(),
    };

    PathDetails {
        full_path,
        file_name,
        base_name,
        extension,
        directory_path,
        drive_letter,
        absolute,
    }
}

impl PartialEq for FilePath {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for FilePath {}

impl fmt::Debug for FilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FilePath").field(&self.path).finish()
    }
}

impl fmt::Display for FilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

impl From<&str> for FilePath {
    fn from(path: &str) -> Self {
        FilePath::new(path)
    }
}

impl From<String> for FilePath {
    fn from(path: String) -> Self {
        FilePath::new(path)
    }
}

impl From<&String> for FilePath {
    fn from(path: &String) -> Self {
        FilePath::new(path.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[rstest]
    #[case("a/b/../c", "a/c")]
    #[case("../../a", "../../a")]
    #[case("a/../../b", "../b")]
    #[case("/a/../b/", "/b")]
    #[case("./a/./b", "a/b")]
    #[case("a/..", ".")]
    #[case("", ".")]
    #[case("C:/x/../y", "C:/y")]
    fn resolved_folds_dot_segments(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(FilePath::new(input).resolved(), expected);
    }

    #[rstest]
    #[case("/usr/local/lib")]
    #[case("/")]
    #[case("/a/b.txt")]
    fn resolve_dot_is_identity_for_normalized_absolute_paths(#[case] input: &str) {
        let path = FilePath::new(input);
        let normalized = path.resolved();
        assert_eq!(path.resolve(&FilePath::new(".")).resolved(), normalized);
    }

    #[test]
    fn set_path_unifies_separators() {
        let path = FilePath::new("a\\b\\c.txt");
        assert_eq!(path.path(), "a/b/c.txt");
        assert_eq!(path.file_name(), "c.txt");
    }

    #[test]
    fn trailing_separator_points_to_content() {
        let path = FilePath::new("data/dir/");
        assert!(path.points_to_content());
        assert_eq!(path.full_path(), "data/dir");
        assert_eq!(path.file_name(), "dir");
        assert_eq!(path.directory_path(), "data/");
        assert!(!FilePath::new("data/dir").points_to_content());
    }

    #[test]
    fn decomposes_absolute_file_path() {
        let path = FilePath::new("/home/user/archive.tar.gz");
        assert!(path.is_absolute());
        assert_eq!(path.full_path(), "/home/user/archive.tar.gz");
        assert_eq!(path.directory_path(), "/home/user/");
        assert_eq!(path.file_name(), "archive.tar.gz");
        assert_eq!(path.base_name(), "archive");
        assert_eq!(path.extension(), ".tar.gz");
        assert_eq!(path.drive_letter(), "");
    }

    #[test]
    fn root_path_is_its_own_file_name() {
        let path = FilePath::new("/");
        assert!(path.is_absolute());
        assert_eq!(path.file_name(), "/");
        assert_eq!(path.full_path(), "/");
        assert_eq!(path.directory_path(), "/");
    }

    #[rstest]
    #[case(".bashrc", ".bashrc", "")]
    #[case(".", ".", "")]
    #[case("..", "..", "")]
    #[case("noext", "noext", "")]
    #[case("a.b", "a", ".b")]
    fn splits_base_name_and_extension(
        #[case] name: &str,
        #[case] base: &str,
        #[case] extension: &str,
    ) {
        let path = FilePath::new(name);
        assert_eq!(path.base_name(), base);
        assert_eq!(path.extension(), extension);
    }

    #[test]
    fn detects_drive_letter() {
        let path = FilePath::new("C:\\Users\\file.txt");
        assert_eq!(path.drive_letter(), "C:");
        assert!(path.is_absolute());
        assert_eq!(path.directory_path(), "C:/Users/");
    }

    #[test]
    fn relative_path_is_not_absolute() {
        let path = FilePath::new("a/b");
        assert!(path.is_relative());
        assert_eq!(path.directory_path(), "a/");
    }

    #[test]
    fn empty_path_has_empty_details() {
        let path = FilePath::default();
        assert!(path.is_empty());
        assert_eq!(path.full_path(), "");
        assert_eq!(path.file_name(), "");
        assert!(path.is_relative());
    }

    #[test]
    fn resolve_combines_relative_paths() {
        let base = FilePath::new("/data/dir/");
        assert_eq!(base.resolve(&FilePath::new("file.txt")).path(), "/data/dir/file.txt");
        assert_eq!(base.resolve(&FilePath::new("/abs")).path(), "/abs");
        assert_eq!(base.resolve(&FilePath::default()).path(), "/data/dir/");
        assert_eq!(FilePath::default().resolve(&FilePath::new("x")).path(), "x");
        assert!(FilePath::default().resolve(&FilePath::default()).is_empty());
    }

    #[test]
    fn set_path_discards_cached_details() {
        let mut path = FilePath::new("a/b.txt");
        assert_eq!(path.file_name(), "b.txt");
        path.set_path("c/d.rs");
        assert_eq!(path.file_name(), "d.rs");
        assert_eq!(path.extension(), ".rs");
    }
}
