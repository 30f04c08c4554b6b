//! # mixrelay-observability
//!
//! Structured Logging via tracing-subscriber (Text oder JSON), gesteuert
//! ueber Konfiguration und die Umgebungsvariablen `MR_LOG_LEVEL` und
//! `MR_LOG_FORMAT`.

pub mod logging;

pub use logging::{logging_initialisieren, LogFehler, LogFormat};
