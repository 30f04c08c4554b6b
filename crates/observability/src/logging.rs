//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable (hat Vorrang vor der Konfiguration):
//! - `MR_LOG_LEVEL`: Filter-Direktive (z.B. `info` oder `mixrelay_voice=debug`)
//! - `MR_LOG_FORMAT`: `text` oder `json`

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub const ENV_LOG_LEVEL: &str = "MR_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "MR_LOG_FORMAT";

#[derive(Debug, Error)]
pub enum LogFehler {
    #[error("Ungueltiges Log-Format: '{0}' (erlaubt: text, json)")]
    UngueltigesFormat(String),

    #[error("Logging bereits initialisiert: {0}")]
    BereitsInitialisiert(String),
}

/// Ausgabeformat der Log-Zeilen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = LogFehler;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            anders => Err(LogFehler::UngueltigesFormat(anders.to_string())),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Initialisiert den globalen Subscriber
///
/// `MR_LOG_LEVEL` / `MR_LOG_FORMAT` ueberschreiben `level` / `format`.
/// Ein ungueltiger Filter faellt auf `info` zurueck, ein ungueltiges
/// Format aus der Umgebung auf `format`.
pub fn logging_initialisieren(level: &str, format: LogFormat) -> Result<(), LogFehler> {
    let filter = EnvFilter::try_from_env(ENV_LOG_LEVEL)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let format = std::env::var(ENV_LOG_FORMAT)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(format);

    let ergebnis = match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_current_span(true)
            .try_init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init(),
    };

    ergebnis.map_err(|e| LogFehler::BereitsInitialisiert(e.to_string()))
}

/// Prueft eine einfache Level-Angabe (ohne Direktiven)
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}
