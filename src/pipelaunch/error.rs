use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror;

use super::containermanager::Step;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("must specify container command")]
    MustSpecifyContainerCommand,

    #[error("generic io error")]
    IOError(#[from] std::io::Error),

    #[error("could not find container runtime `{program}`")]
    RuntimeNotFound {
        program: String,
        source: which::Error,
    },

    #[error("invalid mount string `{0:?}`")]
    InvalidMount(String),

    #[error("invalid step policy `{0}` (expected `gated` or `unconditional`)")]
    InvalidPolicy(String),

    #[error("{0} must be an absolute path: `{1}`")]
    PathMustBeAbsolute(&'static str, String),

    #[error("could not identify directory")]
    MissingDirectory,

    #[error("host directory `{}` does not exist", .0.display())]
    MissingHostDirectory(PathBuf),

    #[error("log initialization error: {0}")]
    SetLoggerError(#[from] log::SetLoggerError),

    #[error("retrieving argument value: {0}")]
    MatchesError(#[from] clap::parser::MatchesError),

    #[error("failed to save config to `{}`", .0.display())]
    FailedToSaveConfig(PathBuf, #[source] serde_yaml::Error),

    #[error("failed to load config from `{}`", .0.display())]
    FailedToLoadConfig(PathBuf, #[source] serde_yaml::Error),

    #[error("`{runtime} {step}` failed: {status}")]
    StepFailed {
        runtime: String,
        step: Step,
        status: ExitStatus,
    },
}

impl Error {
    /// Process exit code for this error. Runtime failures pass the runtime's own code through.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::StepFailed { status, .. } => status.code().unwrap_or(1),
            _ => 2,
        }
    }
}
