//! Command-line plumbing shared by the simulator binaries: argument styling,
//! verbosity flags and the tracing subscriber.

use std::{fs::File, sync::Arc};

pub use clap;
pub use clap_verbosity_flag as verbose;

use clap::builder::styling::{AnsiColor, Effects, Styles};

/// Color scheme of the `--help` output.
pub fn get_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Cyan.on_default())
        .error(AnsiColor::Red.on_default() | Effects::BOLD)
        .valid(AnsiColor::Green.on_default())
        .invalid(AnsiColor::Red.on_default())
}

/// Map the `-v`/`-q` count to a tracing level. Simulation logs are noisy, so
/// every step is one level quieter than the flag suggests.
pub fn verbose_level_to_trace(level: Option<verbose::Level>) -> &'static tracing::Level {
    match level {
        Some(verbose::Level::Error) => &tracing::Level::WARN,
        Some(verbose::Level::Warn) => &tracing::Level::INFO,
        Some(verbose::Level::Info) => &tracing::Level::DEBUG,
        Some(verbose::Level::Debug) => &tracing::Level::TRACE,
        Some(verbose::Level::Trace) => &tracing::Level::TRACE,
        None => &tracing::Level::ERROR,
    }
}

/// Install the global subscriber. Logs go to stderr as plain text, or to
/// `log_file` as JSON lines when given. Calling this twice is harmless.
pub fn logging_setup(level: &tracing::Level, log_file: Option<&File>) {
    let builder = tracing_subscriber::fmt()
        .with_max_level(*level)
        .with_target(false);

    match log_file.map(File::try_clone) {
        Some(Ok(file)) => {
            let _ = builder.json().with_writer(Arc::new(file)).try_init();
        }
        Some(Err(err)) => {
            let _ = builder.with_writer(std::io::stderr).try_init();
            tracing::warn!("could not open log file, logging to stderr: {err}");
        }
        None => {
            let _ = builder.with_writer(std::io::stderr).try_init();
        }
    }
}
