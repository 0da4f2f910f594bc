//! Logger initialization, shared between the `zbflash` binary and tests that
//! want to see engine trace output.

use env_logger::Env;
use log::LevelFilter;

pub fn initialize_logger(filter: LevelFilter) {
    env_logger::Builder::from_env(Env::default().default_filter_or(filter.as_str()))
        .format_target(false)
        .init();
}
