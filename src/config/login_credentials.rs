use std::fs;
use std::path::{Path, PathBuf};

use hashlink::LinkedHashMap;
use saphyr::{LoadableYamlNode, Scalar, Yaml};
use snafu::prelude::*;
use tracing::debug;

const CREDENTIALS_FILE_NAME: &str = "credentials.yaml";

/// Login parameters for remote file systems, kept in insertion order.
///
/// Stored on disk as one `key: value` pair per line, which is also a flat
/// YAML mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginCredentials {
    values: LinkedHashMap<String, String>,
}

impl LoginCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// `credentials.yaml` below the user's config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(env!("CARGO_PKG_NAME")).join(CREDENTIALS_FILE_NAME))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CredentialsError> {
        let path = path.as_ref();
        debug!("Loading credentials from {}", path.display());
        let contents = fs::read_to_string(path).context(ReadSnafu { path })?;
        contents.as_str().try_into()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CredentialsError> {
        let path = path.as_ref();
        debug!("Saving {} credential(s) to {}", self.values.len(), path.display());
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).context(WriteSnafu { path })?;
        }
        fs::write(path, self.to_string()).context(WriteSnafu { path })
    }

    pub fn is_set(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// The stored value, empty if `key` is not set.
    pub fn value(&self, key: &str) -> &str {
        self.values.get(key).map_or("", String::as_str)
    }

    pub fn set_value(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        // Keep the original position of overwritten keys.
        match self.values.get_mut(&key) {
            Some(existing) => *existing = value,
            None => {
                self.values.insert(key, value);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn scalar_to_string(scalar: &Scalar) -> Option<String> {
    match scalar {
        Scalar::String(s) => Some(s.to_string()),
        Scalar::Integer(i) => Some(i.to_string()),
        Scalar::FloatingPoint(f) => Some(f.to_string()),
        Scalar::Boolean(b) => Some(b.to_string()),
        Scalar::Null => None,
    }
}

fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

impl TryFrom<&str> for LoginCredentials {
    type Error = CredentialsError;

    fn try_from(contents: &str) -> Result<Self, Self::Error> {
        let documents = Yaml::load_from_str(contents).context(ParseSnafu)?;
        let mut credentials = LoginCredentials::new();

        let Some(document) = documents.first() else {
            return Ok(credentials);
        };
        if matches!(document, Yaml::Value(Scalar::Null)) {
            return Ok(credentials);
        }

        let mapping = document.as_mapping().context(NotMappingSnafu)?;
        for (key, value) in mapping {
            let (Yaml::Value(key), Yaml::Value(value)) = (key, value) else {
                debug!("Skipping non-scalar credential entry: {:?}", key);
                continue;
            };
            let Some(key) = scalar_to_string(key) else {
                continue;
            };
            let value = scalar_to_string(value).unwrap_or_default();
            credentials.set_value(key, value);
        }
        Ok(credentials)
    }
}

impl std::fmt::Display for LoginCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (key, value) in &self.values {
            writeln!(f, "{}: {}", quote(key), quote(value))?;
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LoginCredentials {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut credentials = LoginCredentials::new();
        for (key, value) in iter {
            credentials.set_value(key, value);
        }
        credentials
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CredentialsError {
    #[snafu(display("Failed to read the credentials file: {}", path.display()))]
    Read { path: PathBuf, source: std::io::Error },
    #[snafu(display("Failed to write the credentials file: {}", path.display()))]
    Write { path: PathBuf, source: std::io::Error },
    #[snafu(display("Failed to parse the credentials file"))]
    Parse { source: saphyr::ScanError },
    #[snafu(display("Credentials file should contain a single map"))]
    NotMapping,
}
