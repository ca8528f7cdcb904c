use snafu::Snafu;

/// Unrecoverable watcher failures. Exhausting the native watch table is not
/// one of them; such registrations are dropped with a warning.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum WatcherError {
    #[snafu(display("Failed to set up the change notification primitive"))]
    Init { source: std::io::Error },
    #[snafu(display("Failed to watch directory {}", path))]
    Register {
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("Failed to watch directory {}", path))]
    NotifyRegister {
        path: String,
        source: notify::Error,
    },
    #[snafu(display("Failed to set up the portable change notifier"))]
    NotifyInit { source: notify::Error },
    #[snafu(display("Waiting for change notifications failed"))]
    Wait { source: std::io::Error },
    #[snafu(display("The file system backing this watcher no longer exists"))]
    FileSystemGone,
}
