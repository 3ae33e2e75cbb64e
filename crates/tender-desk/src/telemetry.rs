use crate::config::TelemetryConfig;
use std::fmt;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

/// Targets that follow `APP_LOG_LEVEL`; everything else stays at `warn`.
const DESK_TARGETS: [&str; 2] = ["tender_desk", "tender_desk_api"];

#[derive(Debug)]
pub enum TelemetryError {
    InvalidFilter { value: String, source: ParseError },
    Subscriber(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryError::InvalidFilter { value, .. } => {
                write!(f, "APP_LOG_LEVEL '{value}' is not a valid level or filter")
            }
            TelemetryError::Subscriber(err) => write!(f, "unable to install subscriber: {err}"),
        }
    }
}

impl std::error::Error for TelemetryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TelemetryError::InvalidFilter { source, .. } => Some(source),
            TelemetryError::Subscriber(err) => Some(&**err),
        }
    }
}

/// Install the global fmt subscriber. `RUST_LOG` wins over the configured level.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => filter_for_level(&config.log_level)?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .compact()
        .with_ansi(false)
        .try_init()
        .map_err(TelemetryError::Subscriber)
}

/// A bare level (`debug`) is scoped to the desk crates; anything with
/// directive syntax is used verbatim.
fn directives_for(log_level: &str) -> String {
    let level = log_level.trim();
    if level.contains(['=', ',']) {
        return level.to_string();
    }
    let mut directives = vec!["warn".to_string()];
    directives.extend(DESK_TARGETS.iter().map(|target| format!("{target}={level}")));
    directives.join(",")
}

fn filter_for_level(log_level: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(directives_for(log_level)).map_err(|source| {
        TelemetryError::InvalidFilter {
            value: log_level.to_string(),
            source,
        }
    })
}
