//! Logging setup shared by the ffgen tools.
//!
//! Everything the tools print goes through `tracing`, so `-v`, `--silent` and `RUST_LOG` apply
//! uniformly to diagnostics and to program listings.

use ansi_term::{Colour, Style};
use std::io;
use tracing::{Level, Metadata};
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt::MakeWriter,
};

/// Level used when `RUST_LOG` is unset or cannot be parsed.
const DEFAULT_DIRECTIVE: &str = "info";

pub fn print_success(txt: &str) {
    tracing::info!("{}", Colour::Green.paint(txt));
}

pub fn print_warning(txt: &str) {
    tracing::warn!("{}", Colour::Yellow.paint(txt));
}

pub fn print_failure(txt: &str) {
    tracing::error!("{}", Style::new().bold().fg(Colour::Red).paint(txt));
}

/// Where log lines are written.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Stream {
    /// Warnings and errors to stderr, everything else to stdout. A listing printed at info
    /// level can then be redirected without the diagnostics.
    #[default]
    Split,
    Stdout,
    Stderr,
}

impl Stream {
    fn for_level(self, level: &Level) -> Box<dyn io::Write> {
        match self {
            Stream::Stderr => Box::new(io::stderr()),
            Stream::Split if *level <= Level::WARN => Box::new(io::stderr()),
            Stream::Split | Stream::Stdout => Box::new(io::stdout()),
        }
    }
}

impl<'a> MakeWriter<'a> for Stream {
    type Writer = Box<dyn io::Write>;

    fn make_writer(&'a self) -> Self::Writer {
        self.for_level(&Level::INFO)
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        self.for_level(meta.level())
    }
}

#[derive(Clone, Debug, Default)]
pub struct LoggingOptions {
    /// Number of `-v` flags.
    pub verbosity: u8,
    pub silent: bool,
    /// Overrides both verbosity and silence.
    pub level: Option<LevelFilter>,
    pub stream: Stream,
}

impl LoggingOptions {
    /// The level the command line forces, if any. `RUST_LOG` applies otherwise.
    fn max_level(&self) -> Option<LevelFilter> {
        if self.level.is_some() {
            return self.level;
        }
        match self.verbosity {
            0 if self.silent => Some(LevelFilter::OFF),
            0 => None,
            1 => Some(LevelFilter::DEBUG),
            _ => Some(LevelFilter::TRACE),
        }
    }
}

/// Installs a `tracing_subscriber::fmt` subscriber printing bare messages, without level,
/// target or timestamp.
///
/// A subscriber installed earlier stays in place.
pub fn init_logging(options: LoggingOptions) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(true)
        .with_level(false)
        .with_target(false)
        .without_time()
        .with_writer(options.stream);

    let installed = match options.max_level() {
        Some(level) => builder.with_max_level(level).try_init(),
        None => builder.try_init(),
    };
    if installed.is_err() {
        tracing::debug!("a tracing subscriber is already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_levels() {
        let level = |verbosity| {
            LoggingOptions {
                verbosity,
                ..Default::default()
            }
            .max_level()
        };
        assert_eq!(level(0), None);
        assert_eq!(level(1), Some(LevelFilter::DEBUG));
        assert_eq!(level(2), Some(LevelFilter::TRACE));
        assert_eq!(level(5), Some(LevelFilter::TRACE));
    }

    #[test]
    fn explicit_level_wins_over_silence() {
        let options = LoggingOptions {
            silent: true,
            level: Some(LevelFilter::WARN),
            ..Default::default()
        };
        assert_eq!(options.max_level(), Some(LevelFilter::WARN));

        let options = LoggingOptions {
            silent: true,
            ..Default::default()
        };
        assert_eq!(options.max_level(), Some(LevelFilter::OFF));
    }

    #[test]
    fn verbosity_wins_over_silence() {
        let options = LoggingOptions {
            verbosity: 1,
            silent: true,
            ..Default::default()
        };
        assert_eq!(options.max_level(), Some(LevelFilter::DEBUG));
    }
}
