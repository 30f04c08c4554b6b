//! Sprecher-Zuweisung (rein informativ)
//!
//! Haelt die Quelle, die als "designierter Sprecher" gilt, z.B. um in einer
//! Oberflaeche anzuzeigen wer spricht. Die Zuweisung beeinflusst das Mischen
//! nicht: alle aktiven Quellen werden gemischt.
//!
//! Jede Aenderung wird ueber einen `watch`-Kanal veroeffentlicht.

use mixrelay_core::SourceId;
use tokio::sync::watch;

/// Designierter Sprecher mit Aenderungs-Benachrichtigung
#[derive(Debug)]
pub struct SprecherWahl {
    aktuell: Option<SourceId>,
    tx: watch::Sender<Option<SourceId>>,
}

impl SprecherWahl {
    pub fn neu() -> Self {
        let (tx, _) = watch::channel(None);
        Self { aktuell: None, tx }
    }

    pub fn aktuell(&self) -> Option<SourceId> {
        self.aktuell
    }

    /// Abonniert Sprecher-Aenderungen
    pub fn abonnieren(&self) -> watch::Receiver<Option<SourceId>> {
        self.tx.subscribe()
    }

    /// Standard-Regel: Ist kein Sprecher gesetzt, wird `quelle` Sprecher
    ///
    /// Gibt true zurueck, wenn sich die Zuweisung geaendert hat.
    pub fn standard_zuweisen(&mut self, quelle: SourceId) -> bool {
        if self.aktuell.is_some() {
            return false;
        }
        self.setzen(Some(quelle));
        tracing::info!(ssrc = quelle.ssrc(), "Sprecher gesetzt (erste Quelle)");
        true
    }

    /// Manuelle Zuweisung (die Registry prueft vorher, ob die Quelle existiert)
    pub fn manuell_setzen(&mut self, quelle: SourceId) {
        self.setzen(Some(quelle));
        tracing::info!(ssrc = quelle.ssrc(), "Sprecher manuell gesetzt");
    }

    /// Muss beim Entfernen einer Quelle aufgerufen werden
    ///
    /// Gibt true zurueck, wenn die entfernte Quelle Sprecher war.
    pub fn quelle_entfernt(&mut self, quelle: SourceId) -> bool {
        if self.aktuell != Some(quelle) {
            return false;
        }
        self.setzen(None);
        tracing::info!(ssrc = quelle.ssrc(), "Sprecher-Zuweisung aufgehoben");
        true
    }

    pub fn zuruecksetzen(&mut self) {
        self.setzen(None);
    }

    fn setzen(&mut self, neu: Option<SourceId>) {
        if self.aktuell == neu {
            return;
        }
        self.aktuell = neu;
        // Kein Fehler ohne Abonnenten – der Wert bleibt trotzdem gespeichert
        self.tx.send_replace(neu);
    }
}

impl Default for SprecherWahl {
    fn default() -> Self {
        Self::neu()
    }
}
