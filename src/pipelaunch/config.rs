use std::convert::TryFrom;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::parser::MatchesError;
use clap::{Arg, ArgAction, ArgMatches};
use serde::{Deserialize, Serialize};

use super::aspects::{self, ContainerAspect};
use super::dirs;
use super::error::{Error, Result};

pub const DEFAULT_RUNTIME: &str = "docker";
pub const DEFAULT_IMAGE: &str = "gui";
pub const DEFAULT_CONTAINER_NAME: &str = "pipeline";
pub const DEFAULT_SHELL: &str = "/bin/bash";
pub const DEFAULT_HOST_DIR: &str = "pipeline";
pub const DEFAULT_CONTAINER_DIR: &str = "/pipeline";

/// Whether a failed step keeps the following steps from running.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum StepPolicy {
    /// Stop at the first failure, except that a started container is always stopped.
    #[default]
    Gated,
    /// Run every step no matter what happened before it.
    Unconditional,
}

impl fmt::Display for StepPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StepPolicy::Gated => write!(f, "gated"),
            StepPolicy::Unconditional => write!(f, "unconditional"),
        }
    }
}

impl TryFrom<&String> for StepPolicy {
    type Error = Error;
    fn try_from(value: &String) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "gated" => Ok(StepPolicy::Gated),
            "unconditional" => Ok(StepPolicy::Unconditional),
            _ => Err(Error::InvalidPolicy(value.to_string())),
        }
    }
}

// config files go through the same parsing as `--policy`
impl TryFrom<String> for StepPolicy {
    type Error = Error;
    fn try_from(value: String) -> Result<Self> {
        StepPolicy::try_from(&value)
    }
}

/// One configuration layer. Unset fields fall through to the layer below, and finally to the
/// built-in defaults in [`Config::resolve`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub runtime: Option<String>,
    pub image: Option<String>,
    pub container_name: Option<String>,
    pub shell: Option<String>,
    pub host_dir: Option<PathBuf>,
    pub container_dir: Option<String>,
    pub command: Option<Vec<String>>,
    pub mounts: Option<Vec<aspects::Mount>>,
    pub network: Option<aspects::Network>,
    pub policy: Option<StepPolicy>,
    pub create_host_dir: Option<bool>,
}

impl Config {
    pub fn empty() -> Config {
        Config {
            runtime: None,
            image: None,
            container_name: None,
            shell: None,
            host_dir: None,
            container_dir: None,
            command: None,
            mounts: None,
            network: None,
            policy: None,
            create_host_dir: None,
        }
    }

    /// Save into the profile layer under `root` if one is named, the global layer otherwise.
    pub fn save(&self, root: &Path, profile: Option<&str>) -> Result<PathBuf> {
        self.save_to(&dirs::get_config_dir(root, profile))
    }

    /// Merge this config over whatever the layer in `config_dir` already holds and write it
    /// back.
    pub fn save_to(&self, config_dir: &Path) -> Result<PathBuf> {
        let existing_config = Config::load_layer(config_dir)?;
        let merged = existing_config.merge(self, true);

        fs::create_dir_all(config_dir)?;

        let path = dirs::config_file(config_dir);
        let mut config_file = fs::File::create(&path)?;

        let s = serde_yaml::to_string(&merged)
            .map_err(|e| Error::FailedToSaveConfig(path.clone(), e))?;
        config_file.write_all(&s.into_bytes())?;

        Ok(path)
    }

    /// Loads a single layer; a missing file is an empty layer.
    fn load_layer(config_dir: &Path) -> Result<Config> {
        let yaml_file = dirs::config_file(config_dir);

        let mut cfg = Config::empty();

        if yaml_file.exists() {
            let yaml = fs::read_to_string(&yaml_file)?;
            cfg = serde_yaml::from_str(&yaml)
                .map_err(|e| Error::FailedToLoadConfig(yaml_file, e))?;
        }

        Ok(cfg)
    }

    /// The global layer under `root`, with the profile's layer on top if one is named.
    pub fn load(root: &Path, profile: Option<&str>) -> Result<Config> {
        let mut layers = vec![dirs::get_config_dir(root, None)];
        if profile.is_some() {
            layers.push(dirs::get_config_dir(root, profile));
        }
        Config::load_layers(&layers)
    }

    /// Stack layers from lowest to highest precedence.
    pub fn load_layers(config_dirs: &[PathBuf]) -> Result<Config> {
        let mut cfg = Config::empty();
        for dir in config_dirs {
            cfg = cfg.merge(&Config::load_layer(dir)?, false);
        }
        Ok(cfg)
    }

    /// Merge values from the given Config into a copy of the current, return a new Config.
    pub fn merge(&self, other: &Config, overwrite: bool) -> Config {
        let mut cfg = (*self).clone();

        cfg.mounts = merge(&self.mounts, &other.mounts, overwrite);

        if let Some(v) = &other.runtime {
            cfg.runtime = Some(v.clone());
        }

        if let Some(v) = &other.image {
            cfg.image = Some(v.clone());
        }

        if let Some(v) = &other.container_name {
            cfg.container_name = Some(v.clone());
        }

        if let Some(v) = &other.shell {
            cfg.shell = Some(v.clone());
        }

        if let Some(v) = &other.host_dir {
            cfg.host_dir = Some(v.clone());
        }

        if let Some(v) = &other.container_dir {
            cfg.container_dir = Some(v.clone());
        }

        // the exec command is a single value even though it is a list
        if let Some(v) = &other.command {
            cfg.command = Some(v.clone());
        }

        if let Some(v) = &other.network {
            cfg.network = Some(v.clone());
        }

        if let Some(v) = &other.policy {
            cfg.policy = Some(*v);
        }

        if let Some(v) = &other.create_host_dir {
            cfg.create_host_dir = Some(*v);
        }

        cfg
    }

    /// Fill in defaults and validate. Relative host paths are taken relative to `cwd`.
    pub fn resolve(&self, cwd: &Path) -> Result<Settings> {
        let container_dir = self
            .container_dir
            .clone()
            .unwrap_or_else(|| DEFAULT_CONTAINER_DIR.to_string());
        if !container_dir.starts_with('/') {
            return Err(Error::PathMustBeAbsolute("container directory", container_dir));
        }

        let host_dir = self
            .host_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_HOST_DIR));

        let mounts = self.mounts.clone().unwrap_or_default();
        for mount in &mounts {
            mount.validate()?;
        }

        Ok(Settings {
            runtime: self
                .runtime
                .clone()
                .unwrap_or_else(|| DEFAULT_RUNTIME.to_string()),
            image: self.image.clone().unwrap_or_else(|| DEFAULT_IMAGE.to_string()),
            container_name: self
                .container_name
                .clone()
                .unwrap_or_else(|| DEFAULT_CONTAINER_NAME.to_string()),
            shell: self.shell.clone().unwrap_or_else(|| DEFAULT_SHELL.to_string()),
            host_dir: cwd.join(host_dir),
            container_dir,
            command: self.command.clone().unwrap_or_default(),
            mounts,
            network: self.network.clone(),
            policy: self.policy.unwrap_or_default(),
            create_host_dir: self.create_host_dir.unwrap_or(false),
        })
    }
}

impl TryFrom<&ArgMatches> for Config {
    type Error = Error;
    fn try_from(matches: &ArgMatches) -> Result<Self> {
        let mut cfg = Config::empty();

        cfg.runtime = one(matches, "runtime")?;
        cfg.image = one(matches, "image")?;
        cfg.container_name = one(matches, "container_name")?;
        cfg.shell = one(matches, "shell")?;
        cfg.host_dir = one(matches, "host-dir")?.map(PathBuf::from);
        cfg.container_dir = one(matches, "container-dir")?;
        cfg.command = many(matches, "command")?;

        cfg.mounts = many(matches, "mount")?
            .map(|values| {
                values
                    .iter()
                    .map(aspects::Mount::try_from)
                    .collect::<Result<Vec<aspects::Mount>>>()
            })
            .transpose()?;

        cfg.network = one(matches, "network")?
            .as_ref()
            .map(aspects::Network::try_from)
            .transpose()?;

        cfg.policy = one(matches, "policy")?
            .as_ref()
            .map(StepPolicy::try_from)
            .transpose()?;

        cfg.create_host_dir = match matches.try_get_one::<bool>("create-host-dir") {
            Ok(Some(&true)) => Some(true),
            Ok(_) | Err(MatchesError::UnknownArgument { .. }) => None,
            Err(e) => return Err(e.into()),
        };

        Ok(cfg)
    }
}

// Arguments a subcommand doesn't define read as unset.
fn one(matches: &ArgMatches, id: &str) -> Result<Option<String>> {
    match matches.try_get_one::<String>(id) {
        Ok(v) => Ok(v.cloned()),
        Err(MatchesError::UnknownArgument { .. }) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn many(matches: &ArgMatches, id: &str) -> Result<Option<Vec<String>>> {
    match matches.try_get_many::<String>(id) {
        Ok(v) => Ok(v.map(|values| values.cloned().collect())),
        Err(MatchesError::UnknownArgument { .. }) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn merge<T: Clone>(
    left: &Option<Vec<T>>,
    right: &Option<Vec<T>>,
    overwrite: bool,
) -> Option<Vec<T>> {
    let mut new = Vec::new();

    if let Some(v) = &left {
        new = v.clone();
    }

    if let Some(v) = &right {
        if overwrite {
            new = v.clone();
        } else {
            new.append(&mut v.clone());
        }
    }

    match new.len() {
        x if x > 0 => Some(new),
        _ => None,
    }
}

/// Fully resolved launch settings.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Settings {
    pub runtime: String,
    pub image: String,
    pub container_name: String,
    pub shell: String,
    pub host_dir: PathBuf,
    pub container_dir: String,
    pub command: Vec<String>,
    pub mounts: Vec<aspects::Mount>,
    pub network: Option<aspects::Network>,
    pub policy: StepPolicy,
    pub create_host_dir: bool,
}

impl Settings {
    /// The exec command, which has no default.
    pub fn exec_command(&self) -> Result<&[String]> {
        match self.command.first() {
            Some(program) if !program.trim().is_empty() => Ok(&self.command),
            _ => Err(Error::MustSpecifyContainerCommand),
        }
    }

    /// Everything that shapes the `run` invocation, in argument order.
    pub fn get_aspects(&self) -> Vec<Box<dyn ContainerAspect>> {
        let mut aspects: Vec<Box<dyn ContainerAspect>> = vec![
            Box::new(aspects::Detach {}),
            Box::new(aspects::Interactive {}),
            Box::new(aspects::Tty {}),
            Box::new(aspects::AutoRemove {}),
            Box::new(aspects::Name(self.container_name.clone())),
            Box::new(aspects::Entrypoint(self.shell.clone())),
            Box::new(aspects::Mount {
                host_path: self.host_dir.to_string_lossy().to_string(),
                container_path: self.container_dir.clone(),
            }),
        ];

        for mount in &self.mounts {
            aspects.push(Box::new(mount.clone()));
        }

        if let Some(network) = &self.network {
            aspects.push(Box::new(network.clone()));
        }

        aspects
    }
}

pub fn cli_args() -> Vec<Arg> {
    vec![
        Arg::new("runtime")
            .long("runtime")
            .global(true)
            .action(ArgAction::Set)
            .help("container runtime program to drive (default: docker)"),
        Arg::new("image")
            .long("image")
            .global(true)
            .action(ArgAction::Set)
            .help("image to start the container from (default: gui)"),
        Arg::new("container_name")
            .short('n')
            .long("name")
            .global(true)
            .action(ArgAction::Set)
            .help("name of the container; only one container with this name can run (default: pipeline)"),
        Arg::new("shell")
            .long("shell")
            .global(true)
            .action(ArgAction::Set)
            .help("entrypoint the container idles in (default: /bin/bash)"),
        Arg::new("host-dir")
            .long("host-dir")
            .global(true)
            .action(ArgAction::Set)
            .help("host directory to mount, relative to the current directory (default: pipeline)"),
        Arg::new("container-dir")
            .long("container-dir")
            .global(true)
            .action(ArgAction::Set)
            .help("where the host directory appears in the container (default: /pipeline)"),
        Arg::new("mount")
            .short('m')
            .long("mount")
            .global(true)
            .action(ArgAction::Append)
            .help("additional <host>:<container> path to map into the container"),
        Arg::new("network")
            .long("network")
            .global(true)
            .action(ArgAction::Set)
            .help("specify the runtime network mode for the container (default: bridge)"),
        Arg::new("policy")
            .long("policy")
            .global(true)
            .action(ArgAction::Set)
            .help("`gated` stops at the first failed step, `unconditional` always runs all three (default: gated)"),
        Arg::new("create-host-dir")
            .long("create-host-dir")
            .global(true)
            .action(ArgAction::SetTrue)
            .help("create the host directory if it is missing"),
    ]
}

/// Trailing command run by `exec`, given after `--`.
pub fn command_arg() -> Arg {
    Arg::new("command")
        .num_args(1..)
        .last(true)
        .action(ArgAction::Set)
        .value_name("COMMAND")
        .help("command to run in the container, e.g. `-- flask run`")
}
