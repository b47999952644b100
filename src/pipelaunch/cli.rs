use std::convert::TryFrom;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};

use super::config::{self, Config};
use super::containermanager::ContainerManager;
use super::dirs;
use super::docker::{Cli, Runtime};
use super::error::Error;

pub fn cli() -> Command {
    Command::new("pipelaunch")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Run a command in a throwaway container with ./pipeline mounted at /pipeline")
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::Count)
                .help("log runtime command lines (-v) and aspects (-vv)"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("only log warnings and errors"),
        )
        .arg(
            Arg::new("profile")
                .short('p')
                .long("profile")
                .global(true)
                .action(ArgAction::Set)
                .help("config profile to stack over the global config"),
        )
        .args(config::cli_args())
        .arg(config::command_arg())
        .subcommand(
            Command::new("launch")
                .about("start the container, attach the command, then stop it (default)")
                .arg(config::command_arg()),
        )
        .subcommand(Command::new("start").about("start the container detached"))
        .subcommand(
            Command::new("exec")
                .about("run the command in the already started container")
                .arg(config::command_arg()),
        )
        .subcommand(Command::new("stop").about("stop (and thereby remove) the container"))
        .subcommand(
            Command::new("status").about("report whether the container exists; exits 1 if not"),
        )
        .subcommand(
            Command::new("config")
                .about("save the given flags into the global config, or the profile's")
                .arg(config::command_arg()),
        )
        .subcommand(Command::new("show-config").about("print the resolved settings"))
}

/// The subcommand to run and the matches holding its arguments; no subcommand means `launch`.
pub fn subcommand(matches: &ArgMatches) -> (&str, &ArgMatches) {
    matches.subcommand().unwrap_or(("launch", matches))
}

/// Where config layers are read from and relative paths are resolved against.
pub struct Environment {
    pub config_root: PathBuf,
    pub cwd: PathBuf,
}

impl Environment {
    pub fn detect() -> Result<Self> {
        Ok(Self {
            config_root: dirs::config_root().context("locating config directory")?,
            cwd: std::env::current_dir().context("reading current directory")?,
        })
    }
}

/// Locate the runtime program on PATH.
pub fn locate(program: &str) -> super::error::Result<Box<dyn Runtime>> {
    Ok(Box::new(Cli::locate(program)?))
}

/// Run the parsed command line and return the process exit code. `runtime` is only asked for
/// once the settings, and so the runtime program, are known.
pub fn execute<F>(matches: &ArgMatches, env: &Environment, runtime: F) -> Result<i32>
where
    F: FnOnce(&str) -> super::error::Result<Box<dyn Runtime>>,
{
    let (subcommand, matches) = subcommand(matches);

    let profile = matches.get_one::<String>("profile").map(String::as_str);
    let cli_config = Config::try_from(matches).context("reading command line")?;

    if subcommand == "config" {
        let path = cli_config
            .save(&env.config_root, profile)
            .context("saving config")?;
        log::info!("saved {}", path.display());
        return Ok(0);
    }

    let settings = Config::load(&env.config_root, profile)
        .context("loading config")?
        .merge(&cli_config, false)
        .resolve(&env.cwd)
        .context("resolving settings")?;

    if subcommand == "show-config" {
        print!(
            "{}",
            serde_yaml::to_string(&settings).context("rendering settings")?
        );
        return Ok(0);
    }

    let runtime = runtime(&settings.runtime).context("locating container runtime")?;
    let mgr = ContainerManager::new(settings, runtime);
    let name = mgr.settings().container_name.clone();

    match subcommand {
        "start" => mgr.start().context(format!("starting {}", name))?,
        "exec" => mgr.exec().context(format!("executing in {}", name))?,
        "stop" => mgr.stop().context(format!("stopping {}", name))?,
        "status" => {
            if mgr.exists().context(format!("listing {}", name))? {
                println!("{}: present", name);
            } else {
                println!("{}: absent", name);
                return Ok(1);
            }
        }
        _ => mgr.launch().context(format!("launching {}", name))?,
    }
    Ok(0)
}

/// Exit code for a failed run: the runtime's own code for a failed step, 2 otherwise.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<Error>().map_or(2, Error::exit_code)
}

#[cfg(test)]
mod execute_should {
    use std::fs;

    use super::*;
    use crate::config::StepPolicy;
    use crate::containermanager::testing::FakeRuntime;

    fn parse(args: &[&str]) -> ArgMatches {
        cli()
            .try_get_matches_from(args.iter().copied())
            .expect("valid command line")
    }

    /// A scratch config root and a cwd that already has the `pipeline` host directory.
    fn environment() -> (tempfile::TempDir, Environment) {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir(dir.path().join("cwd")).expect("cwd");
        fs::create_dir(dir.path().join("cwd").join("pipeline")).expect("host dir");
        let env = Environment {
            config_root: dir.path().join("config"),
            cwd: dir.path().join("cwd"),
        };
        (dir, env)
    }

    fn run(args: &[&str], env: &Environment, fake: &FakeRuntime) -> Result<i32> {
        let fake = fake.clone();
        execute(&parse(args), env, move |program| {
            assert_eq!(program, "docker");
            Ok(Box::new(fake))
        })
    }

    #[test]
    fn pass_clap_debug_asserts() {
        cli().debug_assert();
    }

    #[test]
    fn launch_without_subcommand() -> Result<()> {
        let (_dir, env) = environment();
        let fake = FakeRuntime::default();

        assert_eq!(run(&["pipelaunch", "--", "flask", "run"], &env, &fake)?, 0);
        assert_eq!(fake.steps(), vec!["run", "exec", "stop"]);
        assert_eq!(
            fake.calls.borrow()[1],
            vec!["exec", "-i", "-t", "pipeline", "flask", "run"]
        );
        Ok(())
    }

    #[test]
    fn take_command_after_subcommand() -> Result<()> {
        let (_dir, env) = environment();
        let fake = FakeRuntime::default();

        assert_eq!(
            run(
                &["pipelaunch", "exec", "--name", "pipeline-b", "--", "python3"],
                &env,
                &fake
            )?,
            0
        );
        assert_eq!(
            *fake.calls.borrow(),
            vec![vec!["exec", "-i", "-t", "pipeline-b", "python3"]]
        );
        Ok(())
    }

    #[test]
    fn exit_one_when_status_finds_nothing() -> Result<()> {
        let (_dir, env) = environment();

        let absent = FakeRuntime::with_stdout("");
        assert_eq!(run(&["pipelaunch", "status"], &env, &absent)?, 1);

        let present = FakeRuntime::with_stdout("pipeline\n");
        assert_eq!(run(&["pipelaunch", "status"], &env, &present)?, 0);
        Ok(())
    }

    #[test]
    fn carry_runtime_exit_code_through_context() {
        let (_dir, env) = environment();
        let fake = FakeRuntime::with_codes(&[125]);

        let err = run(&["pipelaunch", "--", "flask"], &env, &fake)
            .expect_err("run step fails");
        assert!(err.to_string().starts_with("launching pipeline"));
        assert_eq!(exit_code(&err), 125);
        assert_eq!(fake.steps(), vec!["run"]);
    }

    #[test]
    fn exit_two_for_local_errors() {
        let (_dir, env) = environment();
        let fake = FakeRuntime::default();

        let err = run(&["pipelaunch", "launch"], &env, &fake).expect_err("no command");
        assert_eq!(exit_code(&err), 2);
        assert!(fake.calls.borrow().is_empty());

        let err = run(&["pipelaunch", "--policy", "sometimes", "stop"], &env, &fake)
            .expect_err("bad policy");
        assert_eq!(exit_code(&err), 2);
    }

    #[test]
    fn save_flags_without_touching_runtime() -> Result<()> {
        let (_dir, env) = environment();

        let code = execute(
            &parse(&[
                "pipelaunch",
                "--profile",
                "compat",
                "config",
                "--policy",
                "unconditional",
                "--",
                "flask",
                "run",
            ]),
            &env,
            |_| panic!("config must not locate a runtime"),
        )?;
        assert_eq!(code, 0);

        let cfg = Config::load(&env.config_root, Some("compat"))?;
        assert_eq!(cfg.policy, Some(StepPolicy::Unconditional));
        assert_eq!(
            cfg.command,
            Some(vec!["flask".to_string(), "run".to_string()])
        );
        assert_eq!(Config::load(&env.config_root, None)?, Config::empty());

        // the saved profile now drives a plain launch
        let fake = FakeRuntime::with_codes(&[125, 1, 0]);
        assert_eq!(run(&["pipelaunch", "-p", "compat"], &env, &fake)?, 0);
        assert_eq!(fake.steps(), vec!["run", "exec", "stop"]);
        Ok(())
    }
}
