use std::path::Path;

use log::LevelFilter;

/// `DERBY_LOG_LEVEL` values; anything unrecognised means INFO.
pub fn level_from_str(verbosity: &str) -> LevelFilter {
    match verbosity.trim().to_ascii_uppercase().as_str() {
        "OFF" => LevelFilter::Off,
        "ERROR" => LevelFilter::Error,
        "WARN" => LevelFilter::Warn,
        "DEBUG" => LevelFilter::Debug,
        "TRACE" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

/// Log to a file only; the terminal belongs to the results table.
pub fn setup_logging(log_file: &Path, verbose: bool) -> Result<(), fern::InitError> {
    dotenvy::dotenv().ok();
    let level = if verbose {
        LevelFilter::Debug
    } else {
        std::env::var("DERBY_LOG_LEVEL")
            .map(|v| level_from_str(&v))
            .unwrap_or(LevelFilter::Info)
    };

    if let Some(parent) = log_file.parent() {
        std::fs::create_dir_all(parent)?;
    }

    fern::Dispatch::new()
        .level(level)
        // reqwest/hyper internals are noise at debug
        .level_for("hyper_util", LevelFilter::Warn)
        .level_for("reqwest", LevelFilter::Warn)
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .chain(fern::log_file(log_file)?)
        .apply()?;

    Ok(())
}
