use std::convert::TryFrom;
use std::fmt;

use dyn_clone;
use serde::{Deserialize, Serialize};

use super::error::{Error, Result};

/// A piece of container configuration that contributes arguments to the runtime's `run`
/// invocation.
pub trait ContainerAspect: dyn_clone::DynClone {
    fn name(&self) -> String;
    fn run_args(&self) -> Vec<String>;
}

dyn_clone::clone_trait_object!(ContainerAspect);

impl fmt::Display for dyn ContainerAspect {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} - {:?}", self.name(), self.run_args())
    }
}

fn args(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| String::from(*s)).collect()
}

#[derive(Clone)]
pub struct Detach {}
impl ContainerAspect for Detach {
    fn name(&self) -> String {
        String::from("Detach")
    }
    fn run_args(&self) -> Vec<String> {
        args(&["-d"])
    }
}

#[derive(Clone)]
pub struct Interactive {}
impl ContainerAspect for Interactive {
    fn name(&self) -> String {
        String::from("Interactive")
    }
    fn run_args(&self) -> Vec<String> {
        args(&["-i"])
    }
}

#[derive(Clone)]
pub struct Tty {}
impl ContainerAspect for Tty {
    fn name(&self) -> String {
        String::from("Tty")
    }
    fn run_args(&self) -> Vec<String> {
        args(&["-t"])
    }
}

/// Removes the container's writable layer once it stops.
#[derive(Clone)]
pub struct AutoRemove {}
impl ContainerAspect for AutoRemove {
    fn name(&self) -> String {
        String::from("AutoRemove")
    }
    fn run_args(&self) -> Vec<String> {
        args(&["--rm"])
    }
}

/// The container name. The runtime refuses a second container with the same name, which is
/// the only thing keeping two launches from running side by side.
#[derive(Clone)]
pub struct Name(pub String);
impl ContainerAspect for Name {
    fn name(&self) -> String {
        String::from("Name")
    }
    fn run_args(&self) -> Vec<String> {
        args(&["--name", &self.0])
    }
}

#[derive(Clone)]
pub struct Entrypoint(pub String);
impl ContainerAspect for Entrypoint {
    fn name(&self) -> String {
        String::from("Entrypoint")
    }
    fn run_args(&self) -> Vec<String> {
        args(&["--entrypoint", &self.0])
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Mount {
    pub host_path: String,
    pub container_path: String,
}

impl ContainerAspect for Mount {
    fn name(&self) -> String {
        String::from("Mount")
    }
    fn run_args(&self) -> Vec<String> {
        vec![
            String::from("-v"),
            format!("{}:{}", self.host_path, self.container_path),
        ]
    }
}

impl Mount {
    /// Both sides must be non-empty and free of `:`, and the container side absolute. Mounts read
    /// from config files skip [`Mount::try_from`], so this is checked again when settings resolve.
    pub fn validate(&self) -> Result<()> {
        let sides = [&self.host_path, &self.container_path];
        if sides.iter().any(|s| s.is_empty() || s.contains(':'))
            || !self.container_path.starts_with('/')
        {
            return Err(Error::InvalidMount(format!(
                "{}:{}",
                self.host_path, self.container_path
            )));
        }
        Ok(())
    }
}

impl TryFrom<&String> for Mount {
    type Error = Error;
    fn try_from(value: &String) -> Result<Self> {
        let (host_path, container_path) = value
            .split_once(':')
            .ok_or_else(|| Error::InvalidMount(value.to_string()))?;
        let mount = Mount {
            host_path: host_path.to_string(),
            container_path: container_path.to_string(),
        };
        mount.validate()?;
        Ok(mount)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Network {
    pub mode: String,
}

impl ContainerAspect for Network {
    fn name(&self) -> String {
        String::from("Network")
    }
    fn run_args(&self) -> Vec<String> {
        args(&["--net", &self.mode])
    }
}

impl TryFrom<&String> for Network {
    type Error = Error;
    fn try_from(value: &String) -> Result<Self> {
        Ok(Network {
            mode: value.to_string(),
        })
    }
}


#[cfg(test)]
mod aspect_should {
    use super::*;

    #[test]
    fn render_flags() {
        let aspects: Vec<Box<dyn ContainerAspect>> = vec![
            Box::new(Detach {}),
            Box::new(Interactive {}),
            Box::new(Tty {}),
            Box::new(AutoRemove {}),
            Box::new(Name("pipeline".to_string())),
            Box::new(Entrypoint("/bin/bash".to_string())),
            Box::new(Network {
                mode: "host".to_string(),
            }),
        ];
        let flat: Vec<String> = aspects.iter().flat_map(|a| a.run_args()).collect();
        assert_eq!(
            flat,
            vec![
                "-d",
                "-i",
                "-t",
                "--rm",
                "--name",
                "pipeline",
                "--entrypoint",
                "/bin/bash",
                "--net",
                "host"
            ]
        );
    }

    #[test]
    fn display_name_and_args() {
        let a: Box<dyn ContainerAspect> = Box::new(Name("pipeline".to_string()));
        let cloned = a.clone();
        assert_eq!(format!("{}", cloned), r#"Name - ["--name", "pipeline"]"#);
    }
}
