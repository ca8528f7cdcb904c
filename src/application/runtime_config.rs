use std::path::PathBuf;

use crate::cli::{Cli, Command};

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub command: Command,
    pub credentials: Option<PathBuf>,
    /// Colored output on stdout.
    pub color: bool,
}

impl From<Cli> for RuntimeConfig {
    fn from(cli: Cli) -> Self {
        Self {
            command: cli.command,
            credentials: cli.credentials,
            color: supports_color::on(supports_color::Stream::Stdout).is_some(),
        }
    }
}
