//! mixrelay-voice – Mix-Relay-Engine
//!
//! Nimmt kodierte Frames vieler Quellen an, mischt alle aktiven Quellen im
//! festen Takt zu einem Frame und verteilt ihn an alle Ziele.
//!
//! ## Module
//! - [`registry`] – Source Stream Registry (ein Lock, Decode ausserhalb)
//! - [`jitter_buffer`] – Jitter Queue fester Tiefe pro Quelle
//! - [`speaker`] – Designierter Sprecher mit Aenderungs-Benachrichtigung
//! - [`session`] – Relay, Ingestion- und Emissions-Schleife
//! - [`fanout`] – Begrenzte Sende-Queues pro Ziel
//! - [`clock`] – Injizierbare Uhr
//! - [`telemetry`] – Relay-Zaehler
//! - [`config`] – Relay-Konfiguration

pub mod clock;
pub mod config;
pub mod error;
pub mod fanout;
pub mod jitter_buffer;
pub mod registry;
pub mod session;
pub mod speaker;
pub mod telemetry;

pub use clock::{ManuelleUhr, TokioUhr, Uhr};
pub use config::RelayConfig;
pub use error::{VoiceError, VoiceResult};
pub use fanout::{VerteilErgebnis, Ziele};
pub use registry::{PaketErgebnis, Registry, StreamInfo};
pub use session::{MixRelay, SessionHandle};
pub use telemetry::{RelayStatistik, StatistikSnapshot};
