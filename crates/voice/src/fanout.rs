//! Fan-Out – Verteilung gemischter Frames an alle Ziele
//!
//! Jedes Ziel hat eine begrenzte Sende-Queue (`mpsc`). Die Emissions-Schleife
//! legt den Frame per `try_send` in jede Queue und blockiert nie: ist eine
//! Queue voll, wird der Frame fuer dieses Ziel verworfen; ist sie geschlossen,
//! wird das Ziel entfernt.

use bytes::Bytes;
use dashmap::DashMap;
use mixrelay_core::ZielId;
use tokio::sync::mpsc;

/// Ergebnis einer Verteilung
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerteilErgebnis {
    /// Frame in die Queue gelegt
    pub zugestellt: usize,
    /// Queue voll, Frame fuer dieses Ziel verworfen
    pub voll: usize,
    /// Queue geschlossen, Ziel entfernt
    pub geschlossen: usize,
}

/// Menge der verbundenen Ziele
#[derive(Debug, Default)]
pub struct Ziele {
    sender: DashMap<ZielId, mpsc::Sender<Bytes>>,
}

impl Ziele {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Legt ein neues Ziel mit eigener Queue an
    ///
    /// Der Aufrufer liest die gemischten Frames aus dem Receiver.
    pub fn ziel_hinzufuegen(&self, queue_groesse: usize) -> (ZielId, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(queue_groesse.max(1));
        let id = ZielId::new();
        self.ziel_registrieren(id, tx);
        (id, rx)
    }

    /// Registriert einen bestehenden Sender (ersetzt ein Ziel gleicher ID)
    pub fn ziel_registrieren(&self, id: ZielId, tx: mpsc::Sender<Bytes>) {
        if self.sender.insert(id, tx).is_some() {
            tracing::debug!(ziel = %id, "Ziel ersetzt");
        } else {
            tracing::info!(ziel = %id, "Ziel verbunden");
        }
    }

    /// Entfernt ein Ziel; gibt false zurueck wenn es nicht existierte
    pub fn ziel_entfernen(&self, id: ZielId) -> bool {
        let entfernt = self.sender.remove(&id).is_some();
        if entfernt {
            tracing::info!(ziel = %id, "Ziel getrennt");
        }
        entfernt
    }

    pub fn anzahl(&self) -> usize {
        self.sender.len()
    }

    pub fn ist_leer(&self) -> bool {
        self.sender.is_empty()
    }

    /// Verteilt einen Frame an alle Ziele ohne zu blockieren
    pub fn verteilen(&self, frame: &Bytes) -> VerteilErgebnis {
        let mut ergebnis = VerteilErgebnis::default();
        let mut tote = Vec::new();

        for eintrag in self.sender.iter() {
            match eintrag.value().try_send(frame.clone()) {
                Ok(()) => ergebnis.zugestellt += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    ergebnis.voll += 1;
                    tracing::warn!(ziel = %eintrag.key(), "Sende-Queue voll – Frame verworfen");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    ergebnis.geschlossen += 1;
                    tote.push(*eintrag.key());
                }
            }
        }

        // Entfernen erst nach der Iteration (DashMap-Shard-Locks)
        for id in tote {
            self.sender.remove(&id);
            tracing::debug!(ziel = %id, "Sende-Queue geschlossen – Ziel entfernt");
        }

        ergebnis
    }

    /// Trennt alle Ziele; offene Receiver sehen danach das Kanalende
    pub fn leeren(&self) {
        self.sender.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
