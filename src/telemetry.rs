//! Log subscriber installation for embedders.
//!
//! The library only emits `tracing` events and spans; which subscriber sees
//! them is the embedder's choice. [`init`] installs a reasonable default:
//!
//! - filter from `RUST_LOG` (default `info`)
//! - `WSUP_LOG_FORMAT=json` → JSON lines on stderr, span close events included
//! - anything else → compact human-readable lines on stderr

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

/// Environment variable selecting the output format.
pub const FORMAT_ENV: &str = "WSUP_LOG_FORMAT";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    /// Read [`FORMAT_ENV`]. Unset or unrecognized means compact.
    #[must_use]
    pub fn from_env() -> Self {
        Self::parse(std::env::var(FORMAT_ENV).ok().as_deref())
    }

    fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Compact,
        }
    }
}

/// Install the global subscriber. Returns `false` if one was already set,
/// which leaves the existing one in place.
pub fn init() -> bool {
    init_with(LogFormat::from_env())
}

pub fn init_with(format: LogFormat) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parsing() {
        assert_eq!(LogFormat::parse(None), LogFormat::Compact);
        assert_eq!(LogFormat::parse(Some("json")), LogFormat::Json);
        assert_eq!(LogFormat::parse(Some(" JSON ")), LogFormat::Json);
        assert_eq!(LogFormat::parse(Some("pretty")), LogFormat::Compact);
    }

    #[test]
    fn second_init_is_refused() {
        // The first call may lose to another test's subscriber; the second
        // never wins.
        let _ = init_with(LogFormat::Compact);
        assert!(!init_with(LogFormat::Json));
    }
}
