//! Gemeinsame Identifikations- und Datentypen fuer MixRelay
//!
//! IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! Quell- und Ziel-Kennungen zur Compilezeit auszuschliessen.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Synchronisation Source – stabile Kennung eines Audio-Absenders
///
/// Wird vom Transport geliefert (SSRC) und ist innerhalb einer
/// Relay-Session eindeutig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId(pub u32);

impl SourceId {
    /// Gibt die rohe SSRC zurueck
    pub fn ssrc(&self) -> u32 {
        self.0
    }
}

impl From<u32> for SourceId {
    fn from(ssrc: u32) -> Self {
        Self(ssrc)
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ssrc:{}", self.0)
    }
}

/// Eindeutige Kennung eines Ausgabe-Ziels (Destination)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ZielId(pub Uuid);

impl ZielId {
    /// Erstellt eine neue zufaellige ZielId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for ZielId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ZielId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ziel:{}", self.0)
    }
}

/// Eingehender Datensatz vom Transport
///
/// Ein kodierter Audio-Frame einer Quelle, so wie er empfangen wurde.
/// Zwischen verschiedenen Quellen gibt es keine Reihenfolge-Garantie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EingangsPaket {
    /// Absender
    pub quelle: SourceId,
    /// Sequenznummer des Absenders (16 Bit, mit Wrap-Around)
    pub sequenz: u16,
    /// Zeitstempel in 48 kHz-Ticks
    pub zeitstempel: u32,
    /// Kodierte Nutzdaten (Codec-Frame)
    pub nutzdaten: Bytes,
}

impl EingangsPaket {
    /// Erstellt einen neuen Eingangs-Datensatz
    pub fn neu(quelle: SourceId, sequenz: u16, zeitstempel: u32, nutzdaten: impl Into<Bytes>) -> Self {
        Self {
            quelle,
            sequenz,
            zeitstempel,
            nutzdaten: nutzdaten.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ziel_id_eindeutig() {
        let a = ZielId::new();
        let b = ZielId::new();
        assert_ne!(a, b, "Zwei neue ZielIds muessen verschieden sein");
    }

    #[test]
    fn source_id_display() {
        assert_eq!(SourceId(42).to_string(), "ssrc:42");
        assert_eq!(SourceId::from(7).ssrc(), 7);
    }

    #[test]
    fn ids_sind_serde_kompatibel() {
        let sid = SourceId(0xCAFE);
        let json = serde_json::to_string(&sid).unwrap();
        let sid2: SourceId = serde_json::from_str(&json).unwrap();
        assert_eq!(sid, sid2);

        let zid = ZielId::new();
        let json = serde_json::to_string(&zid).unwrap();
        let zid2: ZielId = serde_json::from_str(&json).unwrap();
        assert_eq!(zid, zid2);
    }

    #[test]
    fn eingangs_paket_uebernimmt_nutzdaten() {
        let paket = EingangsPaket::neu(SourceId(1), 65535, 960, vec![1u8, 2, 3]);
        assert_eq!(paket.nutzdaten.as_ref(), &[1, 2, 3]);
        assert_eq!(paket.sequenz, u16::MAX);
    }
}
