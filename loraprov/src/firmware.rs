//! Firmware build and upload through PlatformIO.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::process::Command;
use tracing::{info, instrument};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("upload exited with status {0}")]
    ExitStatus(i32),

    #[error("upload terminated by signal")]
    Terminated,
}

/// Runs `pio run --target upload` for a project directory
#[derive(Clone, Debug)]
pub struct Uploader {
    program: String,
    project: PathBuf,
    env: Option<String>,
}

impl Uploader {
    pub const DEFAULT_PROGRAM: &str = "pio";

    pub fn new<P: AsRef<Path>>(project: P) -> Self {
        Self {
            program: Self::DEFAULT_PROGRAM.to_owned(),
            project: project.as_ref().to_path_buf(),
            env: None,
        }
    }

    /// Upload a single PlatformIO environment instead of the project default
    pub fn env(mut self, env: Option<String>) -> Self {
        self.env = env;
        self
    }

    pub fn program<S: AsRef<str>>(mut self, program: S) -> Self {
        self.program = program.as_ref().to_owned();
        self
    }

    fn args(&self) -> Vec<&str> {
        let mut args = vec!["run", "--target", "upload"];
        if let Some(env) = &self.env {
            args.extend(["-e", env.as_str()]);
        }
        args
    }

    /// Build and flash, waiting for the tool to finish.
    ///
    /// Tool output goes straight to the terminal.
    #[instrument(name = "firmware", skip_all, fields(project = %self.project.display()), err)]
    pub async fn upload(&self) -> Result<(), UploadError> {
        let status = Command::new(&self.program)
            .args(self.args())
            .current_dir(&self.project)
            .status()
            .await
            .map_err(|source| UploadError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !status.success() {
            return Err(status
                .code()
                .map(UploadError::ExitStatus)
                .unwrap_or(UploadError::Terminated));
        }

        info!("firmware uploaded");
        Ok(())
    }
}
