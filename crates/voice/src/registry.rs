//! Source Stream Registry – Zustand aller eingehenden Audio-Quellen
//!
//! Verwaltet pro Quelle (SSRC):
//! - Jitter Queue mit kodierten Frames
//! - eigenen Decoder-Kontext
//! - zuletzt dekodierten Frame und Aktivitaets-Status
//! - Lautstaerke (0.0–2.0) und Sequenz-/Verlust-Zaehler
//!
//! Alle Mutationen laufen unter einem exklusiven Lock. Dekodiert wird
//! ausserhalb des Locks. Der Decoder-Mutex der Quelle wird noch unter dem
//! Registry-Lock genommen, so dekodieren parallele Aufrufe fuer dieselbe
//! Quelle in Entnahme-Reihenfolge. Eine Decode-Nummer verhindert, dass ein
//! aelterer Frame einen neueren ueberschreibt.
//!
//! Die Aktivitaet wird beim Dekodieren und in jedem Tick bewertet: eine
//! Quelle, die nicht mehr sendet, faellt nach der Haltezeit aus dem Mix.

use crate::config::RelayConfig;
use crate::error::{VoiceError, VoiceResult};
use crate::jitter_buffer::JitterQueue;
use crate::speaker::SprecherWahl;
use mixrelay_audio::{AktivitaetsGate, AktivitaetsZustand, CodecBackend, FrameDecoder};
use mixrelay_core::{EingangsPaket, SourceId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Erlaubter Lautstaerkebereich
pub const LAUTSTAERKE_MIN: f32 = 0.0;
pub const LAUTSTAERKE_MAX: f32 = 2.0;

type GeteilterDecoder = Arc<Mutex<Box<dyn FrameDecoder>>>;

// ---------------------------------------------------------------------------
// SourceStream
// ---------------------------------------------------------------------------

/// Zustand einer einzelnen Quelle
struct SourceStream {
    letztes_paket: Instant,
    letzte_sequenz: Option<u16>,
    verlorene_pakete: u64,
    jitter: JitterQueue,
    decoder: GeteilterDecoder,
    /// Zuletzt vergebene und zuletzt abgelegte Decode-Nummer
    decode_vergeben: u64,
    decode_abgelegt: u64,
    /// Zuletzt erfolgreich dekodierter Frame (leer bis zum ersten Decode)
    samples: Arc<[i16]>,
    aktiv: bool,
    lautstaerke: f32,
    aktivitaet: AktivitaetsZustand,
}

impl SourceStream {
    fn neu(
        decoder: Box<dyn FrameDecoder>,
        jitter_tiefe: usize,
        haltezeit: Duration,
        jetzt: Instant,
    ) -> Self {
        Self {
            letztes_paket: jetzt,
            letzte_sequenz: None,
            verlorene_pakete: 0,
            jitter: JitterQueue::neu(jitter_tiefe),
            decoder: Arc::new(Mutex::new(decoder)),
            decode_vergeben: 0,
            decode_abgelegt: 0,
            samples: Arc::from(Vec::<i16>::new()),
            aktiv: false,
            lautstaerke: 1.0,
            aktivitaet: AktivitaetsZustand::neu(haltezeit),
        }
    }

    /// Zaehlt Luecken in der Sequenz (u16-Ueberlauf beruecksichtigt)
    ///
    /// Verspaetete oder doppelte Pakete zaehlen nicht als Verlust.
    fn sequenz_erfassen(&mut self, sequenz: u16) {
        if let Some(letzte) = self.letzte_sequenz {
            let abstand = sequenz.wrapping_sub(letzte);
            if abstand == 0 || abstand >= 0x8000 {
                return;
            }
            self.verlorene_pakete += u64::from(abstand - 1);
        }
        self.letzte_sequenz = Some(sequenz);
    }

    fn ist_veraltet(&self, jetzt: Instant, veraltet_nach: Duration) -> bool {
        jetzt.saturating_duration_since(self.letztes_paket) > veraltet_nach
    }

    fn info(&self, quelle: SourceId, ist_sprecher: bool) -> StreamInfo {
        StreamInfo {
            quelle,
            lautstaerke: self.lautstaerke,
            aktiv: self.aktiv,
            letzte_sequenz: self.letzte_sequenz,
            verlorene_pakete: self.verlorene_pakete,
            jitter_fuellstand: self.jitter.fuellstand(),
            frame_samples: self.samples.len(),
            ist_sprecher,
        }
    }
}

// ---------------------------------------------------------------------------
// Oeffentliche Snapshots
// ---------------------------------------------------------------------------

/// Diagnose-Snapshot einer Quelle
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub quelle: SourceId,
    pub lautstaerke: f32,
    pub aktiv: bool,
    pub letzte_sequenz: Option<u16>,
    pub verlorene_pakete: u64,
    pub jitter_fuellstand: usize,
    /// Laenge des aktuellen Frames (0 = noch nichts dekodiert)
    pub frame_samples: usize,
    pub ist_sprecher: bool,
}

/// Beitrag einer aktiven Quelle zu einem Tick
#[derive(Debug, Clone)]
pub struct AktiverFrame {
    pub quelle: SourceId,
    pub samples: Arc<[i16]>,
    pub lautstaerke: f32,
}

/// Ergebnis der Lesephase eines Ticks
#[derive(Debug, Default)]
pub struct TickSchnappschuss {
    /// In diesem Tick entfernte Quellen
    pub entfernt: Vec<SourceId>,
    /// Aktive Quellen mit nicht-leerem Frame, nach SSRC sortiert
    pub aktive: Vec<AktiverFrame>,
}

/// Was `paket_hinzufuegen` mit dem Paket gemacht hat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaketErgebnis {
    /// Paket liegt in der Jitter Queue, nichts dekodiert
    Gepuffert,
    /// Aeltester Frame wurde dekodiert und ist jetzt aktueller Frame
    Dekodiert { aktiv: bool },
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

struct RegistryInner {
    streams: HashMap<SourceId, SourceStream>,
    sprecher: SprecherWahl,
}

impl RegistryInner {
    fn entfernen_wenn_veraltet(
        &mut self,
        jetzt: Instant,
        veraltet_nach: Duration,
    ) -> Vec<SourceId> {
        let mut entfernt: Vec<SourceId> = self
            .streams
            .iter()
            .filter(|(_, s)| s.ist_veraltet(jetzt, veraltet_nach))
            .map(|(id, _)| *id)
            .collect();
        entfernt.sort();

        for id in &entfernt {
            self.streams.remove(id);
            self.sprecher.quelle_entfernt(*id);
            tracing::info!(ssrc = id.ssrc(), "Inaktiven Audio-Stream entfernt");
        }
        entfernt
    }
}

/// Registry aller Quellen einer Relay-Session
pub struct Registry {
    inner: Mutex<RegistryInner>,
    backend: Arc<dyn CodecBackend>,
    gate: AktivitaetsGate,
    jitter_tiefe: usize,
    haltezeit: Duration,
}

impl Registry {
    pub fn neu(config: &RelayConfig, backend: Arc<dyn CodecBackend>) -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                streams: HashMap::new(),
                sprecher: SprecherWahl::neu(),
            }),
            backend,
            gate: AktivitaetsGate::neu(config.aktivitaets_schwelle),
            jitter_tiefe: config.jitter_tiefe,
            haltezeit: config.haltezeit(),
        }
    }

    /// Nimmt ein Paket einer Quelle an
    ///
    /// Legt den Stream beim ersten Paket an, reiht den Frame ein und
    /// dekodiert bei Ueberlauf den aeltesten Frame. Der Zeitpunkt des
    /// letzten Pakets wird immer aktualisiert, auch wenn das Dekodieren
    /// scheitert. Bei einem Dekodierfehler bleibt der vorige Frame erhalten.
    pub fn paket_hinzufuegen(
        &self,
        paket: &EingangsPaket,
        jetzt: Instant,
    ) -> VoiceResult<PaketErgebnis> {
        let quelle = paket.quelle;

        // Phase 1: Stream holen/anlegen, Frame einreihen, Decoder reservieren
        let (frame, mut decoder, decode_nr) = {
            let mut inner = self.inner.lock();

            if !inner.streams.contains_key(&quelle) {
                let decoder = self.backend.decoder()?;
                inner.streams.insert(
                    quelle,
                    SourceStream::neu(decoder, self.jitter_tiefe, self.haltezeit, jetzt),
                );
                tracing::info!(ssrc = quelle.ssrc(), "Neuer Audio-Stream erkannt");
            }

            // Standard-Regel: ohne Sprecher wird die sendende Quelle Sprecher
            inner.sprecher.standard_zuweisen(quelle);

            let Some(stream) = inner.streams.get_mut(&quelle) else {
                return Err(VoiceError::UnbekannteQuelle(quelle));
            };
            stream.letztes_paket = jetzt;
            stream.sequenz_erfassen(paket.sequenz);

            match stream.jitter.push(paket.nutzdaten.clone()) {
                Some(frame) => {
                    stream.decode_vergeben += 1;
                    (frame, stream.decoder.lock_arc(), stream.decode_vergeben)
                }
                None => {
                    tracing::trace!(
                        ssrc = quelle.ssrc(),
                        seq = paket.sequenz,
                        fuellstand = stream.jitter.fuellstand(),
                        "Frame gepuffert"
                    );
                    return Ok(PaketErgebnis::Gepuffert);
                }
            }
        };

        // Phase 2: Dekodieren ohne Registry-Lock; der Decoder wird vor
        // Phase 3 freigegeben
        let ergebnis = decoder.decode(&frame);
        drop(decoder);
        let samples = ergebnis.map_err(|grund| VoiceError::Dekodierung { quelle, grund })?;

        // Phase 3: Frame ablegen, Aktivitaet neu bewerten
        let mut inner = self.inner.lock();
        let Some(stream) = inner.streams.get_mut(&quelle) else {
            // Zwischenzeitlich entfernt (Eviction oder leeren)
            return Err(VoiceError::UnbekannteQuelle(quelle));
        };
        if decode_nr < stream.decode_abgelegt {
            tracing::trace!(ssrc = quelle.ssrc(), decode_nr, "Aelterer Frame verworfen");
            return Ok(PaketErgebnis::Dekodiert { aktiv: stream.aktiv });
        }
        stream.decode_abgelegt = decode_nr;
        if !samples.is_empty() {
            stream.samples = Arc::from(samples);
        }
        stream.aktiv = self.gate.ist_aktiv(&mut stream.aktivitaet, &stream.samples, jetzt);

        tracing::trace!(
            ssrc = quelle.ssrc(),
            aktiv = stream.aktiv,
            samples = stream.samples.len(),
            "Frame dekodiert"
        );
        Ok(PaketErgebnis::Dekodiert { aktiv: stream.aktiv })
    }

    /// Entfernt alle Quellen mit `jetzt - letztes_paket > veraltet_nach`
    ///
    /// War eine entfernte Quelle Sprecher, wird die Zuweisung aufgehoben.
    pub fn veraltete_entfernen(&self, jetzt: Instant, veraltet_nach: Duration) -> Vec<SourceId> {
        self.inner.lock().entfernen_wenn_veraltet(jetzt, veraltet_nach)
    }

    /// Lesephase eines Ticks: Eviction, Ablauf der Haltezeit und Snapshot
    /// der aktiven Quellen unter demselben Lock
    pub fn tick_schnappschuss(&self, jetzt: Instant, veraltet_nach: Duration) -> TickSchnappschuss {
        let mut inner = self.inner.lock();
        let entfernt = inner.entfernen_wenn_veraltet(jetzt, veraltet_nach);

        for (id, stream) in inner.streams.iter_mut() {
            if stream.aktiv && !stream.aktivitaet.innerhalb_haltezeit(jetzt) {
                stream.aktiv = false;
                tracing::trace!(ssrc = id.ssrc(), "Haltezeit abgelaufen");
            }
        }

        let mut aktive: Vec<AktiverFrame> = inner
            .streams
            .iter()
            .filter(|(_, s)| s.aktiv && !s.samples.is_empty())
            .map(|(id, s)| AktiverFrame {
                quelle: *id,
                samples: Arc::clone(&s.samples),
                lautstaerke: s.lautstaerke,
            })
            .collect();
        aktive.sort_by_key(|f| f.quelle);

        TickSchnappschuss { entfernt, aktive }
    }

    /// Setzt die Lautstaerke einer Quelle, begrenzt auf [0.0, 2.0]
    ///
    /// Gibt den tatsaechlich gesetzten Wert zurueck. NaN wird ignoriert.
    pub fn lautstaerke_setzen(&self, quelle: SourceId, lautstaerke: f32) -> VoiceResult<f32> {
        let mut inner = self.inner.lock();
        let stream = inner
            .streams
            .get_mut(&quelle)
            .ok_or(VoiceError::UnbekannteQuelle(quelle))?;

        if lautstaerke.is_nan() {
            tracing::warn!(ssrc = quelle.ssrc(), "Ungueltige Lautstaerke (NaN) ignoriert");
            return Ok(stream.lautstaerke);
        }

        stream.lautstaerke = lautstaerke.clamp(LAUTSTAERKE_MIN, LAUTSTAERKE_MAX);
        tracing::debug!(ssrc = quelle.ssrc(), lautstaerke = stream.lautstaerke, "Lautstaerke gesetzt");
        Ok(stream.lautstaerke)
    }

    /// Setzt den designierten Sprecher manuell
    pub fn sprecher_setzen(&self, quelle: SourceId) -> VoiceResult<()> {
        let mut inner = self.inner.lock();
        if !inner.streams.contains_key(&quelle) {
            return Err(VoiceError::UnbekannteQuelle(quelle));
        }
        inner.sprecher.manuell_setzen(quelle);
        Ok(())
    }

    pub fn sprecher(&self) -> Option<SourceId> {
        self.inner.lock().sprecher.aktuell()
    }

    pub fn sprecher_abonnieren(&self) -> watch::Receiver<Option<SourceId>> {
        self.inner.lock().sprecher.abonnieren()
    }

    pub fn stream_info(&self, quelle: SourceId) -> Option<StreamInfo> {
        let inner = self.inner.lock();
        let ist_sprecher = inner.sprecher.aktuell() == Some(quelle);
        inner.streams.get(&quelle).map(|s| s.info(quelle, ist_sprecher))
    }

    /// Alle registrierten Quellen, sortiert
    pub fn quellen(&self) -> Vec<SourceId> {
        let mut ids: Vec<SourceId> = self.inner.lock().streams.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn anzahl(&self) -> usize {
        self.inner.lock().streams.len()
    }

    /// Entfernt alle Quellen und hebt die Sprecher-Zuweisung auf
    pub fn leeren(&self) {
        let mut inner = self.inner.lock();
        let anzahl = inner.streams.len();
        inner.streams.clear();
        inner.sprecher.zuruecksetzen();
        tracing::debug!(anzahl, "Registry geleert");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
