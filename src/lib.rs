/*!
Academic records backend.

Students enroll in subjects, managers approve payment, teachers record
exam attempts, and students are promoted a level once every subject at
their current level has been passed.
*/
pub mod auth;
pub mod config;
pub mod hierarchy;
pub mod inter;
pub mod ledger;
pub mod perm;
pub mod store;
pub mod subject;
pub mod user;
pub mod workflow;

/// Highest level a student or subject may have.
pub const MAX_LEVEL: i16 = 5;
/// Most subjects a single student may be enrolled in at once.
pub const MAX_ENROLLMENTS: usize = 7;

pub fn log_level_from_env() -> simplelog::LevelFilter {
    use simplelog::LevelFilter;

    let mut level_string = match std::env::var("LOG_LEVEL") {
        Err(_) => { return LevelFilter::Warn; },
        Ok(s) => s,
    };

    level_string.make_ascii_lowercase();
    match level_string.as_str() {
        "max" => LevelFilter::max(),
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Warn,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub fn ensure_logging() {
        use simplelog::{TermLogger, TerminalMode, ColorChoice};
        let log_cfg = simplelog::ConfigBuilder::new()
            .add_filter_allow_str("registrar")
            .build();
        let res = TermLogger::init(
            log_level_from_env(),
            log_cfg,
            TerminalMode::Stdout,
            ColorChoice::Auto
        );

        match res {
            Ok(_) => { log::info!("Test logging started."); },
            Err(_) => { log::info!("Test logging already started."); },
        }
    }
}
