//! UDP-Adapter – Demonstrations-Transport fuer den Mix-Relay
//!
//! Eingehend: ein Datagramm pro Frame mit festem Header (Big Endian)
//!
//! ```text
//! 0      4      6          10
//! | ssrc | seq  | zeitstempel | nutzdaten ...
//! ```
//!
//! Ausgehend: der gemischte Frame roh an jede konfigurierte Zieladresse,
//! ein Sende-Task pro Ziel mit begrenzter Queue.
//! Keine Sessions, keine Verschluesselung.

use bytes::Bytes;
use mixrelay_core::{EingangsPaket, SourceId, ZielId};
use mixrelay_voice::MixRelay;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};

/// Laenge des Headers in Bytes
pub const HEADER_LAENGE: usize = 10;

/// Maximale UDP-Nutzlast
const UDP_BUFFER_SIZE: usize = 1500;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderFehler {
    #[error("Datagramm zu kurz: {0} Bytes (Header 10 Bytes plus Nutzdaten)")]
    ZuKurz(usize),
}

/// Parst ein eingehendes Datagramm
pub fn paket_parsen(daten: &[u8]) -> Result<EingangsPaket, HeaderFehler> {
    if daten.len() <= HEADER_LAENGE {
        return Err(HeaderFehler::ZuKurz(daten.len()));
    }
    let ssrc = u32::from_be_bytes([daten[0], daten[1], daten[2], daten[3]]);
    let sequenz = u16::from_be_bytes([daten[4], daten[5]]);
    let zeitstempel = u32::from_be_bytes([daten[6], daten[7], daten[8], daten[9]]);

    Ok(EingangsPaket::neu(
        SourceId(ssrc),
        sequenz,
        zeitstempel,
        Bytes::copy_from_slice(&daten[HEADER_LAENGE..]),
    ))
}

/// Baut ein Datagramm im Eingangsformat (fuer Sender und Tests)
pub fn paket_bauen(paket: &EingangsPaket) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LAENGE + paket.nutzdaten.len());
    buf.extend_from_slice(&paket.quelle.ssrc().to_be_bytes());
    buf.extend_from_slice(&paket.sequenz.to_be_bytes());
    buf.extend_from_slice(&paket.zeitstempel.to_be_bytes());
    buf.extend_from_slice(&paket.nutzdaten);
    buf
}

// ---------------------------------------------------------------------------
// Empfang
// ---------------------------------------------------------------------------

/// Empfangs-Loop: Datagramme parsen und an die Ingestion weitergeben
///
/// Ist die Ingestion-Queue voll, wird das Paket verworfen statt zu warten.
pub async fn empfangs_loop(
    socket: Arc<UdpSocket>,
    eingang: mpsc::Sender<EingangsPaket>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut buf = [0u8; UDP_BUFFER_SIZE];

    tracing::info!("UDP-Empfangs-Loop gestartet");

    loop {
        tokio::select! {
            result = socket.recv_from(&mut buf) => {
                match result {
                    Ok((len, absender)) => {
                        if !weitergeben(&buf[..len], absender, &eingang) {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!(fehler = %e, "UDP-Empfangsfehler");
                        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
                    }
                }
            }

            Ok(()) = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("UDP-Empfang: Shutdown-Signal empfangen");
                    break;
                }
            }
        }
    }

    tracing::info!("UDP-Empfangs-Loop beendet");
}

/// Gibt false zurueck, wenn die Ingestion nicht mehr laeuft
fn weitergeben(daten: &[u8], absender: SocketAddr, eingang: &mpsc::Sender<EingangsPaket>) -> bool {
    let paket = match paket_parsen(daten) {
        Ok(p) => p,
        Err(e) => {
            tracing::debug!(fehler = %e, absender = %absender, "Ungueltiges Datagramm");
            return true;
        }
    };

    match eingang.try_send(paket) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(p)) => {
            tracing::warn!(ssrc = p.quelle.ssrc(), "Ingestion-Queue voll – Paket verworfen");
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            tracing::debug!("Ingestion beendet");
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Senden
// ---------------------------------------------------------------------------

/// Sende-Task fuer ein Ziel
///
/// Registriert sich beim Relay als Ziel und sendet jeden gemischten Frame
/// an `ziel_addr`. Der Task endet, wenn das Relay das Ziel trennt.
pub struct ZielSender {
    pub id: ZielId,
    pub ziel_addr: SocketAddr,
    task: tokio::task::JoinHandle<()>,
}

impl ZielSender {
    pub fn starten(socket: Arc<UdpSocket>, ziel_addr: SocketAddr, relay: &MixRelay) -> Self {
        let (id, mut rx) = relay.ziel_hinzufuegen();

        let task = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                match socket.send_to(&frame, ziel_addr).await {
                    Ok(_) => {
                        tracing::trace!(bytes = frame.len(), ziel = %ziel_addr, "Frame gesendet");
                    }
                    Err(e) => {
                        tracing::warn!(fehler = %e, ziel = %ziel_addr, "UDP-Sendefehler");
                    }
                }
            }
            tracing::debug!(ziel = %ziel_addr, "Sende-Task beendet");
        });

        tracing::info!(ziel = %ziel_addr, id = %id, "UDP-Ziel verbunden");
        Self { id, ziel_addr, task }
    }

    /// Wartet, bis der Sende-Task nach dem Trennen ausgelaufen ist
    pub async fn beendet(self) {
        if let Err(e) = self.task.await {
            tracing::warn!(fehler = %e, ziel = %self.ziel_addr, "Sende-Task abgebrochen");
        }
    }
}
