use std::fmt;
use std::fs;

use super::config::{Settings, StepPolicy};
use super::docker::Runtime;
use super::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Run,
    Exec,
    Stop,
    Status,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Step::Run => write!(f, "run"),
            Step::Exec => write!(f, "exec"),
            Step::Stop => write!(f, "stop"),
            Step::Status => write!(f, "ps"),
        }
    }
}

/// Drives one named container through run, exec and stop.
pub struct ContainerManager {
    settings: Settings,
    runtime: Box<dyn Runtime>,
}

impl ContainerManager {
    pub fn new(settings: Settings, runtime: Box<dyn Runtime>) -> Self {
        Self { settings, runtime }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn run_args(&self) -> Vec<String> {
        let mut args = vec![Step::Run.to_string()];
        for aspect in self.settings.get_aspects() {
            log::trace!("aspect: {}", aspect);
            args.extend(aspect.run_args());
        }
        args.push(self.settings.image.clone());
        args
    }

    pub fn exec_args(&self) -> Result<Vec<String>> {
        let mut args = vec![
            Step::Exec.to_string(),
            String::from("-i"),
            String::from("-t"),
            self.settings.container_name.clone(),
        ];
        args.extend(self.settings.exec_command()?.iter().cloned());
        Ok(args)
    }

    pub fn stop_args(&self) -> Vec<String> {
        vec![Step::Stop.to_string(), self.settings.container_name.clone()]
    }

    /// Make sure the host side of the bind mount is there. With `strict` unset a missing
    /// directory is only reported and left to the runtime.
    fn check_host_dir(&self, strict: bool) -> Result<()> {
        let dir = &self.settings.host_dir;
        if dir.is_dir() {
            return Ok(());
        }

        if self.settings.create_host_dir {
            log::info!("creating {}", dir.display());
            fs::create_dir_all(dir)?;
            return Ok(());
        }

        if strict {
            return Err(Error::MissingHostDirectory(dir.clone()));
        }
        log::warn!("host directory {} does not exist", dir.display());
        Ok(())
    }

    fn step(&self, step: Step, args: &[String]) -> Result<()> {
        let status = self.runtime.status(args)?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::StepFailed {
                runtime: self.runtime.name().to_string(),
                step,
                status,
            })
        }
    }

    /// Start the container detached, idling in its shell.
    pub fn start(&self) -> Result<()> {
        self.check_host_dir(self.settings.policy == StepPolicy::Gated)?;
        log::info!(
            "starting {} from {}",
            self.settings.container_name,
            self.settings.image
        );
        self.step(Step::Run, &self.run_args())
    }

    /// Attach to the running container with the configured command.
    pub fn exec(&self) -> Result<()> {
        let args = self.exec_args()?;
        log::info!(
            "attaching to {}: {}",
            self.settings.container_name,
            self.settings.command.join(" ")
        );
        self.step(Step::Exec, &args)
    }

    /// Stop the container. Auto-remove takes it away with it.
    pub fn stop(&self) -> Result<()> {
        log::info!("stopping {}", self.settings.container_name);
        self.step(Step::Stop, &self.stop_args())
    }

    /// Run, exec and stop in order, as the step policy allows.
    pub fn launch(&self) -> Result<()> {
        log::debug!("launching with {} step policy", self.settings.policy);
        match self.settings.policy {
            StepPolicy::Gated => self.launch_gated(),
            StepPolicy::Unconditional => self.launch_unconditional(),
        }
    }

    fn launch_gated(&self) -> Result<()> {
        // no point starting a container there is nothing to run in
        self.settings.exec_command()?;

        self.start()?;

        if let Err(e) = self.exec() {
            if let Err(stop_err) = self.stop() {
                log::warn!("{}", stop_err);
            }
            return Err(e);
        }

        self.stop()
    }

    fn launch_unconditional(&self) -> Result<()> {
        if let Err(e) = self.start() {
            log::warn!("{}, continuing", e);
        }
        if let Err(e) = self.exec() {
            log::warn!("{}, continuing", e);
        }
        self.stop()
    }

    /// Whether a container with exactly the configured name exists, running or not.
    pub fn exists(&self) -> Result<bool> {
        let args: Vec<String> = vec![
            Step::Status.to_string(),
            String::from("--all"),
            String::from("--filter"),
            format!("name=^/?{}$", self.settings.container_name),
            String::from("--format"),
            String::from("{{.Names}}"),
        ];
        let output = self.runtime.output(&args)?;
        if !output.status.success() {
            log::warn!("{}", String::from_utf8_lossy(&output.stderr).trim());
            return Err(Error::StepFailed {
                runtime: self.runtime.name().to_string(),
                step: Step::Status,
                status: output.status,
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .map(|l| l.trim().trim_start_matches('/'))
            .any(|name| name == self.settings.container_name))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::os::unix::process::ExitStatusExt;
    use std::process::{ExitStatus, Output};
    use std::rc::Rc;

    use super::*;

    /// Records every invocation and answers with scripted exit codes; unscripted calls succeed.
    #[derive(Clone, Default)]
    pub struct FakeRuntime {
        pub calls: Rc<RefCell<Vec<Vec<String>>>>,
        codes: Rc<RefCell<VecDeque<i32>>>,
        stdout: Rc<RefCell<String>>,
    }

    impl FakeRuntime {
        pub fn with_codes(codes: &[i32]) -> Self {
            let fake = FakeRuntime::default();
            fake.codes.borrow_mut().extend(codes);
            fake
        }

        pub fn with_stdout(stdout: &str) -> Self {
            let fake = FakeRuntime::default();
            *fake.stdout.borrow_mut() = stdout.to_string();
            fake
        }

        pub fn steps(&self) -> Vec<String> {
            self.calls.borrow().iter().map(|c| c[0].clone()).collect()
        }

        fn next(&self, args: &[String]) -> ExitStatus {
            self.calls.borrow_mut().push(args.to_vec());
            let code = self.codes.borrow_mut().pop_front().unwrap_or(0);
            ExitStatus::from_raw(code << 8)
        }
    }

    impl Runtime for FakeRuntime {
        fn name(&self) -> &str {
            "docker"
        }

        fn status(&self, args: &[String]) -> Result<ExitStatus> {
            Ok(self.next(args))
        }

        fn output(&self, args: &[String]) -> Result<Output> {
            Ok(Output {
                status: self.next(args),
                stdout: self.stdout.borrow().clone().into_bytes(),
                stderr: Vec::new(),
            })
        }
    }
}


#[cfg(test)]
mod exists_should {
    use std::path::Path;

    use super::testing::FakeRuntime;
    use super::*;
    use crate::config::Config;

    fn manager(fake: &FakeRuntime) -> ContainerManager {
        let settings = Config::empty()
            .resolve(Path::new("/work"))
            .expect("valid settings");
        ContainerManager::new(settings, Box::new(fake.clone()))
    }

    #[test]
    fn find_exact_name() -> Result<()> {
        let fake = FakeRuntime::with_stdout("pipeline\n");
        assert!(manager(&fake).exists()?);
        assert_eq!(
            fake.calls.borrow()[0],
            vec![
                "ps",
                "--all",
                "--filter",
                "name=^/?pipeline$",
                "--format",
                "{{.Names}}"
            ]
        );
        Ok(())
    }

    #[test]
    fn ignore_other_names() -> Result<()> {
        let fake = FakeRuntime::with_stdout("pipeline-old\ngui\n");
        assert!(!manager(&fake).exists()?);

        let fake = FakeRuntime::with_stdout("");
        assert!(!manager(&fake).exists()?);
        Ok(())
    }

    #[test]
    fn surface_runtime_failure() {
        let fake = FakeRuntime::with_codes(&[1]);
        assert!(matches!(
            manager(&fake).exists(),
            Err(Error::StepFailed {
                step: Step::Status,
                ..
            })
        ));
    }
}
