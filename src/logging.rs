//! Logger setup.
//!
//! Every record goes to stdout and to the process log
//! `<storage>/logs/log.<dd-mm-YYYY>`. Records whose target names a bot are
//! also written to that bot's own directory, `<storage>/logs/<target>/`.

use std::fs;
use std::path::Path;

use chrono::Utc;
use chrono_tz::Tz;
use log::LevelFilter;
use thiserror::Error;

use crate::config::LogConfig;

const FILE_SUFFIX: &str = "%d-%m-%Y";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("cannot prepare log directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("logger already installed: {0}")]
    AlreadySet(#[from] log::SetLoggerError),
}

/// Build the dispatch without installing it, creating log directories.
pub fn dispatch(
    config: &LogConfig,
    log_dir: &Path,
    bot_targets: &[&'static str],
) -> Result<fern::Dispatch, LoggingError> {
    fs::create_dir_all(log_dir)?;

    let timezone = config.timezone;
    let mut root = fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} {} {}",
                timestamp(timezone),
                record.level(),
                message
            ))
        })
        .level(config.level)
        .level_for("hyper", LevelFilter::Info)
        .level_for("hyper_util", LevelFilter::Info)
        .level_for("reqwest", LevelFilter::Info)
        .level_for("html5ever", LevelFilter::Warn)
        .level_for("selectors", LevelFilter::Warn)
        .chain(std::io::stdout())
        .chain(fern::DateBased::new(log_dir.join("log."), FILE_SUFFIX));

    for &target in bot_targets {
        let dir = log_dir.join(target);
        fs::create_dir_all(&dir)?;
        root = root.chain(
            fern::Dispatch::new()
                .filter(move |metadata| metadata.target() == target)
                .chain(fern::DateBased::new(dir.join("log."), FILE_SUFFIX)),
        );
    }

    Ok(root)
}

/// Install the global logger.
pub fn init(
    config: &LogConfig,
    log_dir: &Path,
    bot_targets: &[&'static str],
) -> Result<(), LoggingError> {
    dispatch(config, log_dir, bot_targets)?.apply()?;
    Ok(())
}

fn timestamp(timezone: Tz) -> String {
    Utc::now()
        .with_timezone(&timezone)
        .format("%Y-%m-%d %H:%M:%S,%3f")
        .to_string()
}
