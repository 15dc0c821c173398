//! Logging setup

use log::LevelFilter;

/// Map a verbosity count to a level filter
///
/// `quiet` wins over any verbosity.
pub fn level_filter(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Initialize the global logger
///
/// Returns `false` when a logger was already installed; the existing one is
/// kept.
pub fn init(verbosity: u8, quiet: bool) -> bool {
    env_logger::Builder::new()
        .filter_level(level_filter(verbosity, quiet))
        .format_timestamp(None)
        .try_init()
        .is_ok()
}
