//! Integrationstests: laufende Session mit pausierter tokio-Zeit

use bytes::Bytes;
use mixrelay_audio::{ChannelCount, CodecConfig, PcmBackend, SampleRate};
use mixrelay_core::{EingangsPaket, SourceId, ZielId};
use mixrelay_voice::{MixRelay, RelayConfig, TokioUhr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const FRAME: usize = 80;

fn relay_erstellen() -> MixRelay {
    let codec = CodecConfig {
        sample_rate: SampleRate::Hz8000,
        channels: ChannelCount::Mono,
        frame_dauer_ms: 10,
        ..CodecConfig::default()
    };
    let backend = PcmBackend::neu(codec).expect("PCM-Backend");
    let config = RelayConfig {
        ziel_queue_groesse: 64,
        ..RelayConfig::default()
    };
    MixRelay::neu(config, Arc::new(backend), Arc::new(TokioUhr)).expect("Relay erstellen")
}

fn paket(ssrc: u32, seq: u16, wert: i16) -> EingangsPaket {
    EingangsPaket::neu(
        SourceId(ssrc),
        seq,
        0,
        PcmBackend::frame_aus_pcm(&vec![wert; FRAME]),
    )
}

fn erster_wert(frame: &Bytes) -> i16 {
    i16::from_le_bytes([frame[0], frame[1]])
}

#[tokio::test(start_paused = true)]
async fn frames_erreichen_alle_offenen_ziele() {
    let relay = relay_erstellen();
    let (_, mut rx_a) = relay.ziel_hinzufuegen();
    let (_, rx_tot) = relay.ziel_hinzufuegen();
    let (tx_b, mut rx_b) = mpsc::channel(64);
    relay.ziel_registrieren(ZielId::new(), tx_b);
    drop(rx_tot);

    let (eingang_tx, eingang_rx) = mpsc::channel(32);
    let handle = relay.starten(eingang_rx);

    for seq in 0..6 {
        eingang_tx.send(paket(1, seq, 4000)).await.unwrap();
        eingang_tx.send(paket(2, seq, 2000)).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    let a = rx_a.recv().await.expect("Ziel A erhaelt Frames");
    let b = rx_b.recv().await.expect("Ziel B erhaelt Frames");
    assert_eq!(erster_wert(&a), 3000);
    assert_eq!(a, b);

    let stat = handle.relay().statistik();
    assert_eq!(stat.pakete_empfangen, 12);
    assert!(stat.frames_gemischt >= 1);
    assert!(stat.zustellungen >= 2);
    // Das geschlossene Ziel zaehlt genau einmal als verworfen
    assert_eq!(stat.verworfen, 1);

    handle.beenden().await;
    assert!(relay.ist_geschlossen());
    assert!(relay.quellen().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stille_session_sendet_nichts() {
    let relay = relay_erstellen();
    let (_, mut rx) = relay.ziel_hinzufuegen();
    let (eingang_tx, eingang_rx) = mpsc::channel(32);
    let handle = relay.starten(eingang_rx);

    for seq in 0..10 {
        eingang_tx.send(paket(7, seq, 10)).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(rx.try_recv().is_err());
    let stat = handle.relay().statistik();
    assert!(stat.ticks >= 10);
    assert_eq!(stat.frames_gemischt, 0);
    assert_eq!(handle.relay().sprecher(), Some(SourceId(7)));

    handle.beenden().await;
}

#[tokio::test(start_paused = true)]
async fn ingestion_endet_mit_eingangskanal() {
    let relay = relay_erstellen();
    let (eingang_tx, eingang_rx) = mpsc::channel(4);
    let handle = relay.starten(eingang_rx);

    eingang_tx.send(paket(3, 0, 0)).await.unwrap();
    drop(eingang_tx);
    tokio::time::sleep(Duration::from_millis(40)).await;

    // Emission laeuft weiter, bis die Session beendet wird
    assert_eq!(relay.quellen(), vec![SourceId(3)]);
    assert!(!relay.ist_geschlossen());

    handle.beenden().await;
    assert!(relay.ist_geschlossen());
}

#[tokio::test(start_paused = true)]
async fn quelle_wird_nach_timeout_entfernt() {
    let relay = relay_erstellen();
    let mut sprecher_rx = relay.sprecher_abonnieren();
    let (eingang_tx, eingang_rx) = mpsc::channel(4);
    let handle = relay.starten(eingang_rx);

    eingang_tx.send(paket(11, 0, 0)).await.unwrap();
    sprecher_rx.changed().await.unwrap();
    assert_eq!(*sprecher_rx.borrow_and_update(), Some(SourceId(11)));

    tokio::time::sleep(Duration::from_millis(5_100)).await;
    assert!(relay.quellen().is_empty());
    assert_eq!(*sprecher_rx.borrow_and_update(), None);

    handle.beenden().await;
}
