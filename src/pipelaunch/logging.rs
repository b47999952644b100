use log::LevelFilter;

use super::error::Result;

/// Map `-q`/`-v` counts onto a level filter for this crate's own log lines.
pub fn level(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Warn;
    }
    match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

pub fn setup(verbosity: u8, quiet: bool) -> Result<()> {
    let level = level(verbosity, quiet);

    let mut builder = pretty_env_logger::formatted_builder();
    builder
        .filter_level(LevelFilter::Warn)
        .filter_module("pipelaunch", level);

    // plain messages at the default level, they read as the launcher's own output
    if level <= LevelFilter::Info {
        builder
            .default_format()
            .format_module_path(false)
            .format_level(false)
            .format_timestamp(None);
    }

    builder.try_init()?;
    Ok(())
}

#[cfg(test)]
mod level_should {
    use super::*;

    #[test]
    fn follow_verbosity_count() {
        assert_eq!(level(0, false), LevelFilter::Info);
        assert_eq!(level(1, false), LevelFilter::Debug);
        assert_eq!(level(2, false), LevelFilter::Trace);
        assert_eq!(level(7, false), LevelFilter::Trace);
    }

    #[test]
    fn prefer_quiet() {
        assert_eq!(level(2, true), LevelFilter::Warn);
    }
}
