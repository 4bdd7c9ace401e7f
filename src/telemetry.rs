//! Tracing subscriber setup for binaries and services embedding the crate.

use std::str::FromStr;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "meeshy_hybrid=info,meeshy_keystore=info";

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable, for development.
    #[default]
    Pretty,
    /// One JSON object per line, for log shippers.
    Json,
}

impl FromStr for LogFormat {
    type Err = std::convert::Infallible;

    /// `"json"` (any case) selects JSON; anything else is pretty.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("json") {
            Ok(Self::Json)
        } else {
            Ok(Self::Pretty)
        }
    }
}

/// Install the global subscriber. Returns `false` if one was already set,
/// so calling this twice is harmless.
pub fn init_tracing(format: LogFormat) -> bool {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_FILTER.into());
    let installed = match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(env_filter).try_init(),
    };
    installed.is_ok()
}
