//! Fehlertypen fuer den Audio-Kern

use thiserror::Error;

/// Alle moeglichen Fehler von Codec, Gate und Mixer
#[derive(Debug, Error)]
pub enum AudioError {
    /// Eingangs-Frame ist fehlerhaft oder nicht dekodierbar
    #[error("Dekodierfehler: {0}")]
    Dekodierung(String),

    /// Interner Encoder-Fehler
    #[error("Kodierfehler: {0}")]
    Kodierung(String),

    /// Codec konnte nicht erstellt werden
    #[error("Codec-Initialisierung fehlgeschlagen: {0}")]
    CodecInit(String),

    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),
}

pub type AudioResult<T> = Result<T, AudioError>;
