use snafu::Snafu;
use tracing::debug;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum LocalError {
    #[snafu(display("Failed to {} {}", operation, path))]
    Io {
        operation: &'static str,
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("{} is not a {}", path, expected))]
    WrongType {
        path: String,
        expected: &'static str,
    },
    #[snafu(display("{} already exists", path))]
    AlreadyExists { path: String },
    #[snafu(display("{} is not supported on this platform", operation))]
    Unsupported { operation: &'static str },
}

/// Collapses a local operation into the boolean handle contract, logging why
/// it failed.
pub(crate) fn succeeded<T>(result: Result<T, LocalError>) -> bool {
    match result {
        Ok(_) => true,
        Err(e) => {
            debug!("{}", e);
            false
        }
    }
}
