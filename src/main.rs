use std::process;

use anyhow::{Context, Result};

use pipelaunch::cli::{self, Environment};
use pipelaunch::logging;

fn run() -> Result<i32> {
    let matches = cli::cli().get_matches();
    let (_, sub_matches) = cli::subcommand(&matches);

    logging::setup(sub_matches.get_count("verbose"), sub_matches.get_flag("quiet"))
        .context("initializing logging")?;

    let env = Environment::detect()?;
    cli::execute(&matches, &env, cli::locate)
}

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            cli::exit_code(&e)
        }
    };
    process::exit(code);
}
