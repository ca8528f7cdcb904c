use std::io::Write;
use std::time::{Duration, Instant};

use colored::Colorize;
use snafu::prelude::*;
use tracing::{debug, info};

use crate::application::RuntimeConfig;
use crate::cli::Command;
use polyfs::config::{CredentialsError, LoginCredentials};
use polyfs::tree::TreeBuilder;
use polyfs::watcher::WatcherError;
use polyfs::{ChangeOperation, Diff, FileEvent, FileHandle, RecursiveMode, Tree, fs};

pub struct Application;

impl Application {
    pub fn run(app_config: impl Into<RuntimeConfig>) -> Result<(), ApplicationError> {
        let app_config: RuntimeConfig = app_config.into();
        colored::control::set_override(app_config.color);

        let credentials = load_credentials(&app_config)?;
        let session = Session {
            credentials: credentials.as_ref(),
        };
        debug!("Running {:?}", app_config.command);

        match app_config.command {
            Command::Ls { locator, long } => session.list(&locator, long),
            Command::Info { locator } => session.info(&locator),
            Command::Cat { locator } => session.cat(&locator),
            Command::Cp {
                source,
                destination,
                recursive,
            } => session.copy(&source, &destination, recursive),
            Command::Mv {
                source,
                destination,
            } => session.move_to(&source, &destination),
            Command::Rm { locator, recursive } => session.remove(&locator, recursive),
            Command::Mkdir { locator } => session.make_directory(&locator),
            Command::Tree { locator, digest } => session.tree(&locator, digest),
            Command::Diff {
                current,
                target,
                digest,
            } => session.diff(&current, &target, digest),
            Command::Sync {
                source,
                destination,
                digest,
                dry_run,
            } => session.sync(&source, &destination, digest, dry_run),
            Command::Watch {
                locator,
                recursive,
                timeout,
            } => session.watch(&locator, recursive, timeout),
        }
    }
}

fn load_credentials(
    app_config: &RuntimeConfig,
) -> Result<Option<LoginCredentials>, ApplicationError> {
    if let Some(path) = &app_config.credentials {
        return LoginCredentials::load(path)
            .map(Some)
            .context(CredentialsSnafu);
    }

    match LoginCredentials::default_path().filter(|path| path.is_file()) {
        Some(path) => LoginCredentials::load(&path)
            .map(Some)
            .context(CredentialsSnafu),
        None => Ok(None),
    }
}

struct Session<'a> {
    credentials: Option<&'a LoginCredentials>,
}

impl Session<'_> {
    fn open(&self, locator: &str) -> FileHandle {
        fs::open(locator, self.credentials)
    }

    fn open_existing(&self, locator: &str) -> Result<FileHandle, ApplicationError> {
        let handle = self.open(locator);
        ensure!(handle.exists(), NotFoundSnafu { locator });
        Ok(handle)
    }

    fn open_directory(&self, locator: &str) -> Result<FileHandle, ApplicationError> {
        let handle = self.open_existing(locator)?;
        ensure!(handle.is_directory(), NotDirectorySnafu { locator });
        Ok(handle)
    }

    fn list(&self, locator: &str, long: bool) -> Result<(), ApplicationError> {
        let dir = self.open_directory(locator)?;
        let mut names = dir.list_files();
        names.sort();

        let mut out = std::io::stdout().lock();
        for name in names {
            let entry = dir.open(&name);
            let shown = if entry.is_directory() {
                name.blue().bold()
            } else {
                name.normal()
            };

            let written = if long {
                writeln!(
                    out,
                    "{}{} {:>5} {:>5} {:>10} {:>10} {}",
                    if entry.is_directory() { "d" } else { "-" },
                    entry.permissions().to_symbolic(),
                    entry.user_id(),
                    entry.group_id(),
                    entry.size(),
                    entry.modification_time(),
                    shown
                )
            } else {
                writeln!(out, "{}", shown)
            };
            written.context(OutputSnafu)?;
        }
        Ok(())
    }

    fn info(&self, locator: &str) -> Result<(), ApplicationError> {
        let handle = self.open_existing(locator)?;
        let kind = match (handle.is_symbolic_link(), handle.is_directory()) {
            (true, _) => "symbolic link",
            (false, true) => "directory",
            (false, false) => "file",
        };

        let mut out = std::io::stdout().lock();
        let mut line = |label: &str, value: String| writeln!(out, "{:<12} {}", label.bold(), value);
        line("path", handle.path()).context(OutputSnafu)?;
        line("type", kind.to_string()).context(OutputSnafu)?;
        line("size", handle.size().to_string()).context(OutputSnafu)?;
        line("permissions", handle.permissions().to_symbolic()).context(OutputSnafu)?;
        line("owner", format!("{}:{}", handle.user_id(), handle.group_id())).context(OutputSnafu)?;
        line("accessed", handle.access_time().to_string()).context(OutputSnafu)?;
        line("modified", handle.modification_time().to_string()).context(OutputSnafu)?;
        if handle.is_file() {
            line("sha1", handle.sha1()).context(OutputSnafu)?;
        }
        Ok(())
    }

    fn cat(&self, locator: &str) -> Result<(), ApplicationError> {
        let handle = self.open_existing(locator)?;
        let content = handle.read_file().context(FailedSnafu {
            operation: "read",
            locator,
        })?;
        std::io::stdout().lock().write_all(&content).context(OutputSnafu)
    }

    fn copy(
        &self,
        source: &str,
        destination: &str,
        recursive: bool,
    ) -> Result<(), ApplicationError> {
        let mut from = self.open_existing(source)?;
        let mut to = self.open(destination);

        let copied = if from.is_directory() {
            ensure!(
                recursive,
                FailedSnafu {
                    operation: "copy a directory without --recursive",
                    locator: source,
                }
            );
            from.copy_directory_rec(&mut to)
        } else {
            from.copy(&mut to)
        };
        ensure!(copied, FailedSnafu { operation: "copy", locator: source });
        info!("Copied {} to {}", source, destination);
        Ok(())
    }

    fn move_to(&self, source: &str, destination: &str) -> Result<(), ApplicationError> {
        let mut from = self.open_existing(source)?;
        let mut to = self.open(destination);
        ensure!(from.move_to(&mut to), FailedSnafu { operation: "move", locator: source });
        info!("Moved {} to {}", source, from.path());
        Ok(())
    }

    fn remove(&self, locator: &str, recursive: bool) -> Result<(), ApplicationError> {
        let mut handle = self.open_existing(locator)?;
        let removed = match (handle.is_directory() && !handle.is_symbolic_link(), recursive) {
            (true, true) => handle.remove_directory_rec(),
            (true, false) => handle.remove_directory(),
            (false, _) => handle.remove(),
        };
        ensure!(removed, FailedSnafu { operation: "remove", locator });
        Ok(())
    }

    fn make_directory(&self, locator: &str) -> Result<(), ApplicationError> {
        let mut handle = self.open(locator);
        ensure!(handle.create_directory(), FailedSnafu { operation: "create directory", locator });
        Ok(())
    }

    fn tree(&self, locator: &str, digest: bool) -> Result<(), ApplicationError> {
        let tree = self.read_tree(locator, digest)?;
        write!(std::io::stdout().lock(), "{}", tree).context(OutputSnafu)
    }

    fn read_tree(&self, locator: &str, digest: bool) -> Result<Tree, ApplicationError> {
        let handle = self.open_existing(locator)?;
        handle
            .read_tree("", digest)
            .context(NotFoundSnafu { locator })
    }

    fn diff(&self, current: &str, target: &str, digest: bool) -> Result<(), ApplicationError> {
        let target_tree = self.read_tree(target, digest)?;
        let current_tree = self.open(current).read_tree("", digest);
        let diff = Diff::create_diff(current_tree.as_ref(), Some(&target_tree));
        print_diff(&diff)
    }

    fn sync(
        &self,
        source: &str,
        destination: &str,
        digest: bool,
        dry_run: bool,
    ) -> Result<(), ApplicationError> {
        let source_root = self.open_directory(source)?;
        let source_tree = self.read_tree(source, digest)?;

        let mut destination_root = self.open(destination);
        if !destination_root.exists() && !dry_run {
            ensure!(
                destination_root.create_directory(),
                FailedSnafu { operation: "create directory", locator: destination }
            );
        }

        let current = destination_root
            .read_tree("", digest)
            .unwrap_or_else(|| TreeBuilder::new("").directory(true).build());
        let diff = current.create_diff(&source_tree);
        print_diff(&diff)?;

        if dry_run || diff.is_empty() {
            return Ok(());
        }

        let applied = diff.apply(&source_root, &destination_root);
        info!("Applied {} of {} change(s)", applied, diff.len());
        ensure!(
            applied == diff.len(),
            SyncIncompleteSnafu {
                failed: diff.len() - applied,
                total: diff.len(),
            }
        );
        Ok(())
    }

    fn watch(
        &self,
        locator: &str,
        recursive: bool,
        timeout: Option<u64>,
    ) -> Result<(), ApplicationError> {
        let dir = self.open_directory(locator)?;
        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };

        let mut watcher = dir.watch(FileEvent::ALL, mode).context(WatchSnafu)?;
        watcher.add_handler_fn(|handle, event| {
            let label = format!("{:<8}", event.to_string());
            let label = if event == FileEvent::CREATED {
                label.green()
            } else if event == FileEvent::REMOVED {
                label.red()
            } else {
                label.yellow()
            };
            println!("{} {}", label, handle.path());
        });
        info!("Watching {}", dir.path());

        let Some(timeout) = timeout else {
            loop {
                watcher.watch(-1).context(WatchSnafu)?;
            }
        };

        let deadline = Instant::now() + Duration::from_millis(timeout);
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(());
            }
            let wait = remaining.as_millis().min(i32::MAX as u128) as i32;
            watcher.watch(wait).context(WatchSnafu)?;
        }
    }
}

fn print_diff(diff: &Diff) -> Result<(), ApplicationError> {
    let mut out = std::io::stdout().lock();
    if diff.is_empty() {
        return writeln!(out, "{}", "No changes".dimmed()).context(OutputSnafu);
    }

    for change in diff {
        let line = change.to_string();
        let line = match change.operation() {
            ChangeOperation::CopyFile => line.green(),
            ChangeOperation::CopyDir => line.green().bold(),
            ChangeOperation::RemoveFile => line.red(),
            ChangeOperation::RemoveDir => line.red().bold(),
        };
        writeln!(out, "{}", line).context(OutputSnafu)?;
    }
    Ok(())
}

#[derive(Debug, Snafu)]
pub enum ApplicationError {
    #[snafu(display("Failed to load credentials"))]
    Credentials { source: CredentialsError },
    #[snafu(display("{} does not exist", locator))]
    NotFound { locator: String },
    #[snafu(display("{} is not a directory", locator))]
    NotDirectory { locator: String },
    #[snafu(display("Failed to {} {}", operation, locator))]
    Failed {
        operation: &'static str,
        locator: String,
    },
    #[snafu(display("{} of {} change(s) could not be applied", failed, total))]
    SyncIncomplete { failed: usize, total: usize },
    #[snafu(display("Watching for changes failed"))]
    Watch { source: WatcherError },
    #[snafu(display("Failed to write output"))]
    Output { source: std::io::Error },
}
