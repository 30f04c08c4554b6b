//! Fehlertypen fuer Registry und Relay-Session
//!
//! Kein Fehler ist fuer den Prozess fatal: Dekodierfehler betreffen ein Paket,
//! Kodierfehler einen Tick, unbekannte Quellen sind ein No-Op.

use mixrelay_audio::AudioError;
use mixrelay_core::SourceId;
use thiserror::Error;

pub type VoiceResult<T> = Result<T, VoiceError>;

#[derive(Debug, Error)]
pub enum VoiceError {
    /// Frame einer Quelle war nicht dekodierbar; der vorige Frame bleibt erhalten
    #[error("Dekodierfehler fuer {quelle}: {grund}")]
    Dekodierung { quelle: SourceId, grund: AudioError },

    /// Encoder-Fehler; der Tick sendet nichts
    #[error("Kodierfehler im Tick: {0}")]
    Kodierung(AudioError),

    /// Operation auf einer Quelle, die nicht (mehr) registriert ist
    #[error("Unbekannte Quelle: {0}")]
    UnbekannteQuelle(SourceId),

    /// Codec konnte nicht erstellt werden
    #[error("Codec-Fehler: {0}")]
    Codec(#[from] AudioError),

    /// Session wurde bereits geschlossen
    #[error("Relay-Session ist geschlossen")]
    Geschlossen,
}

impl VoiceError {
    /// Gibt true zurueck wenn nur ein einzelnes Paket betroffen ist
    pub fn ist_paketbezogen(&self) -> bool {
        matches!(self, Self::Dekodierung { .. })
    }
}
