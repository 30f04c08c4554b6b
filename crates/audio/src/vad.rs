//! Sprachaktivitaets-Gate (Voice Activity)
//!
//! Energie-basiertes Gate mit Haltezeit: Eine Quelle gilt als aktiv, wenn
//! die RMS-Energie ihres letzten Frames ueber der Schwelle liegt, und bleibt
//! danach fuer die Haltezeit aktiv, damit Wortenden nicht abgeschnitten werden.
//!
//! Die Schwelle liegt auf der i16-Skala (typisch 800–1000).

use std::time::{Duration, Instant};

/// Standard-Haltezeit nach dem letzten lauten Frame
pub const STANDARD_HALTEZEIT: Duration = Duration::from_millis(200);

/// Standard-Schwelle auf der i16-Skala
pub const STANDARD_SCHWELLE: u32 = 800;

/// Berechnet die RMS-Energie eines Frames (0.0 fuer leere Frames)
pub fn rms_energie(samples: &[i16]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let summe: i64 = samples.iter().map(|&s| (s as i64) * (s as i64)).sum();
    (summe as f64 / samples.len() as f64).sqrt()
}

/// Aktivitaets-Zustand einer einzelnen Quelle
#[derive(Debug, Clone)]
pub struct AktivitaetsZustand {
    haltezeit: Duration,
    /// Zeitpunkt des letzten Frames ueber der Schwelle
    letzte_laut: Option<Instant>,
}

impl AktivitaetsZustand {
    pub fn neu(haltezeit: Duration) -> Self {
        Self {
            haltezeit,
            letzte_laut: None,
        }
    }

    /// Liegt der letzte laute Frame weniger als die Haltezeit zurueck?
    ///
    /// Wird auch ohne neuen Frame abgefragt (Mix-Tick), damit eine
    /// verstummte Quelle nach der Haltezeit herausfaellt.
    pub fn innerhalb_haltezeit(&self, jetzt: Instant) -> bool {
        match self.letzte_laut {
            Some(laut) => jetzt.saturating_duration_since(laut) < self.haltezeit,
            None => false,
        }
    }

    pub fn letzte_laut(&self) -> Option<Instant> {
        self.letzte_laut
    }
}

impl Default for AktivitaetsZustand {
    fn default() -> Self {
        Self::neu(STANDARD_HALTEZEIT)
    }
}

/// Gate mit konfigurierbarer Energie-Schwelle
#[derive(Debug, Clone, Copy)]
pub struct AktivitaetsGate {
    schwelle: u32,
}

impl AktivitaetsGate {
    pub fn neu(schwelle: u32) -> Self {
        Self { schwelle }
    }

    /// Bewertet einen Frame und aktualisiert den Zustand der Quelle
    ///
    /// - leerer Frame: inaktiv (auch innerhalb der Haltezeit)
    /// - RMS > Schwelle: aktiv, `letzte_laut` wird auf `jetzt` gesetzt
    /// - sonst aktiv solange `jetzt - letzte_laut < haltezeit`
    pub fn ist_aktiv(
        &self,
        zustand: &mut AktivitaetsZustand,
        samples: &[i16],
        jetzt: Instant,
    ) -> bool {
        if samples.is_empty() {
            return false;
        }

        if rms_energie(samples) > self.schwelle as f64 {
            zustand.letzte_laut = Some(jetzt);
            return true;
        }

        zustand.innerhalb_haltezeit(jetzt)
    }
}

impl Default for AktivitaetsGate {
    fn default() -> Self {
        Self::neu(STANDARD_SCHWELLE)
    }
}
