use std::io::Write;

use chrono::Local;
use env_logger::{Builder, Target};
use log::{LevelFilter, SetLoggerError};

const LOG_ENV: &str = "RUST_LOG";

/// Installs the process logger on stderr.
///
/// stdout is left to the bus. When `RUST_LOG` is set its directives win over
/// `level` and over later calls to [`set_level`].
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    let mut builder = Builder::new();
    builder
        .filter_level(LevelFilter::Trace)
        .parse_env(LOG_ENV)
        .target(Target::Stderr)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}: {}",
                Local::now().to_rfc3339(),
                record.level(),
                record.target(),
                record.args()
            )
        });
    builder.try_init()?;

    set_level(level);
    Ok(())
}

/// Changes the maximum log level, unless `RUST_LOG` pins it
pub fn set_level(level: LevelFilter) {
    if std::env::var_os(LOG_ENV).is_none() {
        log::set_max_level(level);
    }
}

/// Maps a `-v` count onto a level; zero means "use the configured level"
pub fn verbosity_level(verbose: u8) -> Option<LevelFilter> {
    match verbose {
        0 => None,
        1 => Some(LevelFilter::Info),
        2 => Some(LevelFilter::Debug),
        _ => Some(LevelFilter::Trace),
    }
}
