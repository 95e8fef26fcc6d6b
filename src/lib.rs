pub mod app_logic;
pub mod core;

use simplelog::{ColorChoice, ConfigBuilder, LevelFilter, TermLogger, TerminalMode};

/*
 * Installs the terminal logger for the command-line front end. Timestamps are left out
 * and level selection is done by the caller from the verbosity flags.
 */
pub fn initialize_cli_logging(level: LevelFilter) {
    let config = ConfigBuilder::new()
        .set_time_level(LevelFilter::Off)
        .set_target_level(LevelFilter::Off)
        .build();
    if let Err(e) = TermLogger::init(level, config, TerminalMode::Stderr, ColorChoice::Auto) {
        eprintln!("Failed to initialize logging: {e}");
    }
}

/* Routes log output through the test harness. Safe to call from every test. */
#[cfg(test)]
pub(crate) fn initialize_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = simplelog::TestLogger::init(LevelFilter::Debug, simplelog::Config::default());
    });
}
