//! Integrationstests: Kodierfehler und verspaetete Ticks der Emission

use bytes::Bytes;
use mixrelay_audio::{
    AudioError, AudioResult, ChannelCount, CodecBackend, CodecConfig, FrameDecoder, FrameEncoder,
    PcmBackend, SampleRate,
};
use mixrelay_core::{EingangsPaket, SourceId};
use mixrelay_voice::{ManuelleUhr, MixRelay, RelayConfig, TokioUhr, Uhr, VoiceError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const FRAME: usize = 80;

// ---------------------------------------------------------------------------
// PCM-Backend mit abschaltbarem Encoder
// ---------------------------------------------------------------------------

struct StoerbaresBackend {
    pcm: PcmBackend,
    stoerung: Arc<AtomicBool>,
}

struct StoerbarerEncoder {
    inner: Box<dyn FrameEncoder>,
    stoerung: Arc<AtomicBool>,
}

impl FrameEncoder for StoerbarerEncoder {
    fn encode(&mut self, pcm: &[i16]) -> AudioResult<Vec<u8>> {
        if self.stoerung.load(Ordering::SeqCst) {
            return Err(AudioError::Kodierung("Encoder gestoert".into()));
        }
        self.inner.encode(pcm)
    }
}

impl CodecBackend for StoerbaresBackend {
    fn config(&self) -> &CodecConfig {
        self.pcm.config()
    }

    fn decoder(&self) -> AudioResult<Box<dyn FrameDecoder>> {
        self.pcm.decoder()
    }

    fn encoder(&self) -> AudioResult<Box<dyn FrameEncoder>> {
        Ok(Box::new(StoerbarerEncoder {
            inner: self.pcm.encoder()?,
            stoerung: Arc::clone(&self.stoerung),
        }))
    }
}

fn relay_erstellen(uhr: Arc<dyn Uhr>) -> (MixRelay, Arc<AtomicBool>) {
    let codec = CodecConfig {
        sample_rate: SampleRate::Hz8000,
        channels: ChannelCount::Mono,
        frame_dauer_ms: 10,
        ..CodecConfig::default()
    };
    let stoerung = Arc::new(AtomicBool::new(false));
    let backend = StoerbaresBackend {
        pcm: PcmBackend::neu(codec).expect("PCM-Backend"),
        stoerung: Arc::clone(&stoerung),
    };
    let relay = MixRelay::neu(RelayConfig::default(), Arc::new(backend), uhr)
        .expect("Relay erstellen");
    (relay, stoerung)
}

fn paket(seq: u16, wert: i16) -> EingangsPaket {
    EingangsPaket::neu(SourceId(1), seq, 0, PcmBackend::frame_aus_pcm(&vec![wert; FRAME]))
}

fn erster_wert(frame: &Bytes) -> i16 {
    i16::from_le_bytes([frame[0], frame[1]])
}

// ---------------------------------------------------------------------------
// Kodierfehler
// ---------------------------------------------------------------------------

#[tokio::test]
async fn kodierfehler_verwirft_nur_diesen_tick() {
    let uhr = ManuelleUhr::neu();
    let (relay, stoerung) = relay_erstellen(Arc::new(uhr.clone()));
    let (_, mut ziel_rx) = relay.ziel_hinzufuegen();
    for seq in 0..4 {
        relay.paket_hinzufuegen(&paket(seq, 2500)).unwrap();
    }

    stoerung.store(true, Ordering::SeqCst);
    assert!(matches!(relay.tick(), Err(VoiceError::Kodierung(_))));
    assert!(matches!(
        relay.tick_und_verteilen(),
        Err(VoiceError::Kodierung(_))
    ));
    assert!(ziel_rx.try_recv().is_err());

    let stat = relay.statistik();
    assert_eq!(stat.kodierfehler, 2);
    assert_eq!(stat.frames_gemischt, 0);
    assert_eq!(stat.zustellungen, 0);

    // Der naechste Tick kodiert wieder normal
    stoerung.store(false, Ordering::SeqCst);
    uhr.vorstellen(Duration::from_millis(20));
    relay.tick_und_verteilen().unwrap().expect("Frame nach Kodierfehler");
    let frame = ziel_rx.recv().await.unwrap();
    assert_eq!(erster_wert(&frame), 2500);
    assert_eq!(relay.statistik().frames_gemischt, 1);
}

#[tokio::test(start_paused = true)]
async fn emission_laeuft_nach_kodierfehlern_weiter() {
    let (relay, stoerung) = relay_erstellen(Arc::new(TokioUhr));
    let (_, mut ziel_rx) = relay.ziel_hinzufuegen();
    let (eingang_tx, eingang_rx) = mpsc::channel(16);

    stoerung.store(true, Ordering::SeqCst);
    let handle = relay.starten(eingang_rx);
    for seq in 0..4 {
        eingang_tx.send(paket(seq, 2500)).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(60)).await;

    let stat = relay.statistik();
    assert!(stat.kodierfehler >= 2, "Kodierfehler: {}", stat.kodierfehler);
    assert_eq!(stat.frames_gemischt, 0);
    assert!(ziel_rx.try_recv().is_err());
    let ticks_mit_fehler = stat.ticks;

    stoerung.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(40)).await;

    let frame = ziel_rx.recv().await.expect("Frame nach Kodierfehlern");
    assert_eq!(erster_wert(&frame), 2500);
    assert!(relay.statistik().ticks > ticks_mit_fehler);

    handle.beenden().await;
}

// ---------------------------------------------------------------------------
// Verspaetete Ticks
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn verspaeteter_tick_wird_nicht_nachgeholt() {
    let (relay, _) = relay_erstellen(Arc::new(TokioUhr));
    let (_, mut ziel_rx) = relay.ziel_hinzufuegen();
    let (eingang_tx, eingang_rx) = mpsc::channel(16);
    let handle = relay.starten(eingang_rx);

    for seq in 0..4 {
        eingang_tx.send(paket(seq, 2500)).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(30)).await;
    while ziel_rx.try_recv().is_ok() {}
    let vorher = relay.statistik().ticks;

    // Laufzeit haengt 100 ms: fuenf Perioden verpasst
    tokio::time::advance(Duration::from_millis(100)).await;
    tokio::time::sleep(Duration::from_millis(5)).await;

    // Genau ein verspaeteter Tick, kein Nachholen der verpassten
    assert_eq!(relay.statistik().ticks, vorher + 1);
    let mut frames = 0;
    while ziel_rx.try_recv().is_ok() {
        frames += 1;
    }
    assert_eq!(frames, 1);

    handle.beenden().await;
}
