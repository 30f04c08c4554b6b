//! mixrelay-core – Gemeinsame Typen
//!
//! Dieses Crate stellt die Identifikationstypen und den Eingangs-Datensatz
//! bereit, die von Audio-, Voice- und Server-Crate gemeinsam genutzt werden.

pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use types::{EingangsPaket, SourceId, ZielId};
