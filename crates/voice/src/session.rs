//! Relay-Session – Ingestion, Mix-Tick und Fan-Out
//!
//! [`MixRelay`] buendelt Registry, Mix-Engine, Ziele und Statistik einer
//! Session. Zwei langlebige Tasks teilen sich das Relay:
//!
//! - Ingestion: liest [`EingangsPaket`]e aus einem `mpsc`-Kanal und ruft
//!   `paket_hinzufuegen` auf
//! - Emission: feste Periode (Standard 20 ms); pro Tick Eviction, Snapshot
//!   der aktiven Quellen, Mischen, Kodieren, Verteilen
//!
//! Verspaetete Ticks werden nicht nachgeholt (`MissedTickBehavior::Delay`).
//! Ein gemeinsames `watch`-Signal beendet beide Schleifen.

use crate::clock::Uhr;
use crate::config::RelayConfig;
use crate::error::{VoiceError, VoiceResult};
use crate::fanout::{VerteilErgebnis, Ziele};
use crate::registry::{PaketErgebnis, Registry, StreamInfo};
use crate::telemetry::{RelayStatistik, StatistikSnapshot};
use bytes::Bytes;
use mixrelay_audio::{CodecBackend, MixBeitrag, MixEngine, Mixer};
use mixrelay_core::{EingangsPaket, SourceId, ZielId};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

// ---------------------------------------------------------------------------
// MixRelay
// ---------------------------------------------------------------------------

struct MixRelayInner {
    config: RelayConfig,
    registry: Registry,
    /// `None` nach `schliessen()` (Encoder freigegeben)
    engine: Mutex<Option<MixEngine>>,
    ziele: Ziele,
    statistik: RelayStatistik,
    uhr: Arc<dyn Uhr>,
    geschlossen: AtomicBool,
}

/// Mix-Relay einer Session (Clone teilt den Zustand)
#[derive(Clone)]
pub struct MixRelay {
    inner: Arc<MixRelayInner>,
}

impl MixRelay {
    /// Erstellt ein Relay; Encoder und Mix-Puffer entstehen hier
    pub fn neu(
        config: RelayConfig,
        backend: Arc<dyn CodecBackend>,
        uhr: Arc<dyn Uhr>,
    ) -> VoiceResult<Self> {
        let frame_samples = backend.config().frame_samples();
        let engine = MixEngine::neu(
            Mixer::neu(frame_samples, config.normalisierung),
            backend.encoder()?,
        );
        let registry = Registry::neu(&config, backend);

        tracing::debug!(
            frame_samples,
            tick_ms = config.tick_ms,
            jitter_tiefe = config.jitter_tiefe,
            schwelle = config.aktivitaets_schwelle,
            "Mix-Relay erstellt"
        );

        Ok(Self {
            inner: Arc::new(MixRelayInner {
                config,
                registry,
                engine: Mutex::new(Some(engine)),
                ziele: Ziele::neu(),
                statistik: RelayStatistik::neu(),
                uhr,
                geschlossen: AtomicBool::new(false),
            }),
        })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.inner.config
    }

    pub fn ist_geschlossen(&self) -> bool {
        self.inner.geschlossen.load(Ordering::Acquire)
    }

    // -----------------------------------------------------------------------
    // Steuerflaeche
    // -----------------------------------------------------------------------

    /// Nimmt ein eingehendes Paket an
    pub fn paket_hinzufuegen(&self, paket: &EingangsPaket) -> VoiceResult<PaketErgebnis> {
        if self.ist_geschlossen() {
            return Err(VoiceError::Geschlossen);
        }
        self.inner.statistik.paket_empfangen();

        let ergebnis = self
            .inner
            .registry
            .paket_hinzufuegen(paket, self.inner.uhr.jetzt());
        if let Err(VoiceError::Dekodierung { .. }) = &ergebnis {
            self.inner.statistik.dekodierfehler();
        }
        ergebnis
    }

    /// Ein Mix-Tick: Eviction, aktive Quellen mischen, kodieren
    ///
    /// `Ok(None)` wenn keine Quelle aktiv ist oder das Relay geschlossen wurde.
    pub fn tick(&self) -> VoiceResult<Option<Bytes>> {
        if self.ist_geschlossen() {
            return Ok(None);
        }
        let inner = &self.inner;
        inner.statistik.tick();

        let snapshot = inner
            .registry
            .tick_schnappschuss(inner.uhr.jetzt(), inner.config.veraltet_nach());
        if !snapshot.entfernt.is_empty() {
            inner.statistik.quellen_entfernt(snapshot.entfernt.len());
        }
        if snapshot.aktive.is_empty() {
            tracing::trace!("Tick ohne aktive Quellen");
            return Ok(None);
        }

        let mut guard = inner.engine.lock();
        let Some(engine) = guard.as_mut() else {
            return Ok(None);
        };

        let beitraege = snapshot.aktive.iter().map(|f| MixBeitrag {
            samples: &f.samples[..],
            lautstaerke: f.lautstaerke,
        });
        match engine.mischen(beitraege) {
            Ok(Some(frame)) => {
                inner.statistik.frame_gemischt();
                tracing::trace!(
                    quellen = snapshot.aktive.len(),
                    bytes = frame.len(),
                    "Frame gemischt"
                );
                Ok(Some(Bytes::from(frame)))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                inner.statistik.kodierfehler();
                Err(VoiceError::Kodierung(e))
            }
        }
    }

    /// Tick und Verteilung an alle Ziele
    ///
    /// `Ok(None)` wenn in diesem Tick kein Frame entstanden ist.
    pub fn tick_und_verteilen(&self) -> VoiceResult<Option<VerteilErgebnis>> {
        let Some(frame) = self.tick()? else {
            return Ok(None);
        };
        let ergebnis = self.inner.ziele.verteilen(&frame);
        self.inner
            .statistik
            .verteilt(ergebnis.zugestellt, ergebnis.voll + ergebnis.geschlossen);
        Ok(Some(ergebnis))
    }

    /// Lautstaerke einer Quelle setzen (begrenzt auf 0.0–2.0)
    pub fn lautstaerke_setzen(&self, quelle: SourceId, lautstaerke: f32) -> VoiceResult<f32> {
        self.inner.registry.lautstaerke_setzen(quelle, lautstaerke)
    }

    pub fn sprecher_setzen(&self, quelle: SourceId) -> VoiceResult<()> {
        self.inner.registry.sprecher_setzen(quelle)
    }

    pub fn sprecher(&self) -> Option<SourceId> {
        self.inner.registry.sprecher()
    }

    /// Benachrichtigung bei jeder Sprecher-Aenderung
    pub fn sprecher_abonnieren(&self) -> watch::Receiver<Option<SourceId>> {
        self.inner.registry.sprecher_abonnieren()
    }

    pub fn stream_info(&self, quelle: SourceId) -> Option<StreamInfo> {
        self.inner.registry.stream_info(quelle)
    }

    pub fn quellen(&self) -> Vec<SourceId> {
        self.inner.registry.quellen()
    }

    /// Neues Ziel mit Queue der konfigurierten Groesse
    pub fn ziel_hinzufuegen(&self) -> (ZielId, mpsc::Receiver<Bytes>) {
        self.inner
            .ziele
            .ziel_hinzufuegen(self.inner.config.ziel_queue_groesse)
    }

    pub fn ziel_registrieren(&self, id: ZielId, tx: mpsc::Sender<Bytes>) {
        self.inner.ziele.ziel_registrieren(id, tx);
    }

    pub fn ziel_entfernen(&self, id: ZielId) -> bool {
        self.inner.ziele.ziel_entfernen(id)
    }

    pub fn statistik(&self) -> StatistikSnapshot {
        self.inner.statistik.snapshot()
    }

    /// Schliesst das Relay (idempotent)
    ///
    /// Gibt den Encoder frei, leert Registry und Ziele. Danach liefert
    /// `paket_hinzufuegen` [`VoiceError::Geschlossen`] und `tick` nichts mehr.
    pub fn schliessen(&self) {
        if self.inner.geschlossen.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.engine.lock().take();
        self.inner.registry.leeren();
        self.inner.ziele.leeren();
        tracing::info!(
            statistik = %self.inner.statistik.snapshot().zusammenfassung(),
            "Mix-Relay geschlossen"
        );
    }

    // -----------------------------------------------------------------------
    // Schleifen
    // -----------------------------------------------------------------------

    /// Ingestion-Schleife: laeuft bis der Eingangskanal schliesst oder
    /// das Shutdown-Signal kommt
    pub async fn ingestion_loop(
        self,
        mut eingang: mpsc::Receiver<EingangsPaket>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        tracing::info!("Ingestion-Schleife gestartet");

        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                paket = eingang.recv() => {
                    let Some(paket) = paket else {
                        tracing::info!("Eingangskanal geschlossen");
                        break;
                    };
                    if !self.paket_verarbeiten(&paket) {
                        break;
                    }
                }

                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::debug!("Ingestion: Shutdown-Signal empfangen");
                        break;
                    }
                }
            }
        }

        tracing::info!("Ingestion-Schleife beendet");
    }

    /// Gibt false zurueck, wenn die Schleife enden soll
    fn paket_verarbeiten(&self, paket: &EingangsPaket) -> bool {
        match self.paket_hinzufuegen(paket) {
            Ok(_) => true,
            Err(VoiceError::Geschlossen) => false,
            Err(VoiceError::UnbekannteQuelle(quelle)) => {
                // Quelle wurde waehrend des Dekodierens entfernt
                tracing::debug!(ssrc = quelle.ssrc(), "Frame fuer entfernte Quelle verworfen");
                true
            }
            Err(e) => {
                tracing::warn!(
                    ssrc = paket.quelle.ssrc(),
                    seq = paket.sequenz,
                    fehler = %e,
                    "Paket verworfen"
                );
                true
            }
        }
    }

    /// Emissions-Schleife mit fester Tick-Periode
    pub async fn emissions_loop(self, mut shutdown_rx: watch::Receiver<bool>) {
        let periode = self.inner.config.tick_periode();
        let log_alle = self.inner.config.statistik_alle_ticks;
        let mut intervall = tokio::time::interval(periode);
        intervall.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tick_nr: u64 = 0;

        tracing::info!(periode_ms = periode.as_millis() as u64, "Emissions-Schleife gestartet");

        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                _ = intervall.tick() => {
                    if self.ist_geschlossen() {
                        break;
                    }
                    match self.tick_und_verteilen() {
                        Ok(Some(erg)) if erg.voll + erg.geschlossen > 0 => {
                            tracing::debug!(
                                zugestellt = erg.zugestellt,
                                voll = erg.voll,
                                geschlossen = erg.geschlossen,
                                "Frame nicht an alle Ziele zugestellt"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!(fehler = %e, "Tick uebersprungen");
                        }
                    }

                    tick_nr += 1;
                    if log_alle > 0 && tick_nr % log_alle == 0 {
                        tracing::info!(
                            statistik = %self.statistik().zusammenfassung(),
                            quellen = self.inner.registry.anzahl(),
                            "Relay-Statistik"
                        );
                    }
                }

                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::debug!("Emission: Shutdown-Signal empfangen");
                        break;
                    }
                }
            }
        }

        tracing::info!("Emissions-Schleife beendet");
    }

    /// Startet Ingestion- und Emissions-Task
    pub fn starten(&self, eingang: mpsc::Receiver<EingangsPaket>) -> SessionHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let ingestion = tokio::spawn(self.clone().ingestion_loop(eingang, shutdown_rx.clone()));
        let emission = tokio::spawn(self.clone().emissions_loop(shutdown_rx));

        tracing::info!("Relay-Session gestartet");
        SessionHandle {
            relay: self.clone(),
            shutdown_tx,
            ingestion,
            emission,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionHandle
// ---------------------------------------------------------------------------

/// Handle einer laufenden Session
pub struct SessionHandle {
    relay: MixRelay,
    shutdown_tx: watch::Sender<bool>,
    ingestion: JoinHandle<()>,
    emission: JoinHandle<()>,
}

impl SessionHandle {
    pub fn relay(&self) -> &MixRelay {
        &self.relay
    }

    /// Signalisiert Shutdown, wartet auf beide Tasks und schliesst das Relay
    pub async fn beenden(self) {
        // Kein Fehler wenn beide Tasks schon beendet sind
        let _ = self.shutdown_tx.send(true);

        if let Err(e) = self.ingestion.await {
            tracing::warn!(fehler = %e, "Ingestion-Task abgebrochen");
        }
        if let Err(e) = self.emission.await {
            tracing::warn!(fehler = %e, "Emissions-Task abgebrochen");
        }
        self.relay.schliessen();
        tracing::info!("Relay-Session beendet");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
