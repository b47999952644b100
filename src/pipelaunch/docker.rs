use std::path::PathBuf;
use std::process::{Command, ExitStatus, Output, Stdio};

use which::which;

use super::error::{Error, Result};

/// A container runtime driven through its command line interface.
pub trait Runtime {
    /// Program name used in log lines and error messages, e.g. `docker`.
    fn name(&self) -> &str;

    /// Run with the terminal attached and wait for it to exit.
    fn status(&self, args: &[String]) -> Result<ExitStatus>;

    /// Run with stdout and stderr captured.
    fn output(&self, args: &[String]) -> Result<Output>;
}

pub struct Cli {
    program: String,
    binary: PathBuf,
}

impl Cli {
    /// Find `program` (`docker`, `podman`, ...) on `PATH`.
    pub fn locate(program: &str) -> Result<Self> {
        let binary = which(program).map_err(|source| Error::RuntimeNotFound {
            program: program.to_string(),
            source,
        })?;
        log::trace!("using container runtime at {}", binary.display());
        Ok(Self {
            program: program.to_string(),
            binary,
        })
    }

    fn command(&self, args: &[String]) -> Command {
        log::debug!("{} {}", self.program, args.join(" "));
        let mut cmd = Command::new(&self.binary);
        cmd.args(args);
        cmd
    }
}

impl Runtime for Cli {
    fn name(&self) -> &str {
        &self.program
    }

    fn status(&self, args: &[String]) -> Result<ExitStatus> {
        Ok(self.command(args).status()?)
    }

    fn output(&self, args: &[String]) -> Result<Output> {
        Ok(self
            .command(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()?)
    }
}
