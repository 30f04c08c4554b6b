//! Konfiguration des Mix-Relays
//!
//! Alle Zeiten in Millisekunden, damit die Werte direkt aus TOML kommen
//! koennen. Jedes Feld hat einen Standardwert.

use mixrelay_audio::Normalisierung;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Einstellungen fuer Registry, Gate, Mixer und Scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Energie-Schwelle des Aktivitaets-Gates (i16-Skala, typisch 800–1000)
    pub aktivitaets_schwelle: u32,
    /// Haltezeit nach dem letzten lauten Frame
    pub haltezeit_ms: u64,
    /// Tiefe der Jitter Queue pro Quelle (Frames)
    pub jitter_tiefe: usize,
    /// Quellen ohne Paket laenger als diese Zeit werden entfernt
    pub veraltet_nach_ms: u64,
    /// Periode des Mix-Ticks
    pub tick_ms: u64,
    /// Normalisierung bei mehreren Sprechern
    pub normalisierung: Normalisierung,
    /// Groesse der Sende-Queue pro Ziel (Frames)
    pub ziel_queue_groesse: usize,
    /// Alle N Ticks eine Statistik-Zusammenfassung loggen (0 = nie)
    pub statistik_alle_ticks: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            aktivitaets_schwelle: 800,
            haltezeit_ms: 200,
            jitter_tiefe: 3,
            veraltet_nach_ms: 5_000,
            tick_ms: 20,
            normalisierung: Normalisierung::Mittelwert,
            ziel_queue_groesse: 32,
            statistik_alle_ticks: 500,
        }
    }
}

impl RelayConfig {
    pub fn haltezeit(&self) -> Duration {
        Duration::from_millis(self.haltezeit_ms)
    }

    pub fn veraltet_nach(&self) -> Duration {
        Duration::from_millis(self.veraltet_nach_ms)
    }

    /// Tick-Periode (mindestens 1 ms)
    pub fn tick_periode(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standardwerte() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.haltezeit(), Duration::from_millis(200));
        assert_eq!(cfg.veraltet_nach(), Duration::from_secs(5));
        assert_eq!(cfg.tick_periode(), Duration::from_millis(20));
        assert_eq!(cfg.jitter_tiefe, 3);
    }

    #[test]
    fn tick_null_wird_eine_millisekunde() {
        let cfg = RelayConfig {
            tick_ms: 0,
            ..RelayConfig::default()
        };
        assert_eq!(cfg.tick_periode(), Duration::from_millis(1));
    }
}
