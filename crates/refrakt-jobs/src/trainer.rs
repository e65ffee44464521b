use std::ffi::OsString;
use std::fmt;
use std::path::Path;
use tokio::process::Command;

/// Builds the command that runs one training job.
///
/// The supervisor owns stdio, kill-on-drop and the working directory; an
/// implementation only decides the program and its arguments.
pub trait TrainerLauncher: Send + Sync + fmt::Debug {
    /// Name used in launch errors and logs.
    fn program(&self) -> &str;

    fn command(&self, config_path: &Path, log_dir: &Path) -> Command;
}

/// An executable that accepts `--config <path> --log-dir <dir>`.
#[derive(Debug, Clone)]
pub struct CliTrainer {
    program: String,
    leading_args: Vec<OsString>,
}

impl CliTrainer {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), leading_args: Vec::new() }
    }

    /// Arguments placed before `--config`, e.g. a script path for an interpreter.
    #[must_use]
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }
}

impl Default for CliTrainer {
    fn default() -> Self {
        Self::new("refrakt")
    }
}

impl TrainerLauncher for CliTrainer {
    fn program(&self) -> &str {
        &self.program
    }

    fn command(&self, config_path: &Path, log_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args).arg("--config").arg(config_path).arg("--log-dir").arg(log_dir);
        cmd
    }
}
