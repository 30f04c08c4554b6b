//! Relay-Telemetrie – Zaehler fuer Ingestion, Mix und Fan-Out
//!
//! Alle Zaehler sind atomar und koennen von beiden Schleifen ohne Lock
//! erhoeht werden. `snapshot()` liest die Zaehler einzeln (keine gemeinsame
//! Sperre ueber alle Zaehler).

use std::sync::atomic::{AtomicU64, Ordering};

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Kopie aller Zaehler zu einem Zeitpunkt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatistikSnapshot {
    pub pakete_empfangen: u64,
    pub dekodierfehler: u64,
    pub ticks: u64,
    pub frames_gemischt: u64,
    pub kodierfehler: u64,
    pub zustellungen: u64,
    pub verworfen: u64,
    pub quellen_entfernt: u64,
}

impl StatistikSnapshot {
    /// Anteil der Ticks, die einen Frame erzeugt haben (0.0–1.0)
    pub fn mix_rate(&self) -> f64 {
        if self.ticks == 0 {
            return 0.0;
        }
        self.frames_gemischt as f64 / self.ticks as f64
    }

    /// Gibt eine lesbare Zusammenfassung zurueck
    pub fn zusammenfassung(&self) -> String {
        format!(
            "Pakete={} (Fehler={}) Ticks={} Gemischt={} ({:.0}%) Kodierfehler={} Zugestellt={} Verworfen={} Entfernt={}",
            self.pakete_empfangen,
            self.dekodierfehler,
            self.ticks,
            self.frames_gemischt,
            self.mix_rate() * 100.0,
            self.kodierfehler,
            self.zustellungen,
            self.verworfen,
            self.quellen_entfernt,
        )
    }
}

// ---------------------------------------------------------------------------
// RelayStatistik
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct RelayStatistik {
    pakete_empfangen: AtomicU64,
    dekodierfehler: AtomicU64,
    ticks: AtomicU64,
    frames_gemischt: AtomicU64,
    kodierfehler: AtomicU64,
    zustellungen: AtomicU64,
    verworfen: AtomicU64,
    quellen_entfernt: AtomicU64,
}

impl RelayStatistik {
    pub fn neu() -> Self {
        Self::default()
    }

    pub fn paket_empfangen(&self) {
        self.pakete_empfangen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dekodierfehler(&self) {
        self.dekodierfehler.fetch_add(1, Ordering::Relaxed);
    }

    /// Zaehlt einen Tick und gibt die neue Tick-Nummer zurueck
    pub fn tick(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn frame_gemischt(&self) {
        self.frames_gemischt.fetch_add(1, Ordering::Relaxed);
    }

    pub fn kodierfehler(&self) {
        self.kodierfehler.fetch_add(1, Ordering::Relaxed);
    }

    /// Ergebnis einer Verteilung: volle und geschlossene Ziele zaehlen als verworfen
    pub fn verteilt(&self, zugestellt: usize, verworfen: usize) {
        self.zustellungen.fetch_add(zugestellt as u64, Ordering::Relaxed);
        self.verworfen.fetch_add(verworfen as u64, Ordering::Relaxed);
    }

    pub fn quellen_entfernt(&self, anzahl: usize) {
        self.quellen_entfernt.fetch_add(anzahl as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatistikSnapshot {
        StatistikSnapshot {
            pakete_empfangen: self.pakete_empfangen.load(Ordering::Relaxed),
            dekodierfehler: self.dekodierfehler.load(Ordering::Relaxed),
            ticks: self.ticks.load(Ordering::Relaxed),
            frames_gemischt: self.frames_gemischt.load(Ordering::Relaxed),
            kodierfehler: self.kodierfehler.load(Ordering::Relaxed),
            zustellungen: self.zustellungen.load(Ordering::Relaxed),
            verworfen: self.verworfen.load(Ordering::Relaxed),
            quellen_entfernt: self.quellen_entfernt.load(Ordering::Relaxed),
        }
    }
}
