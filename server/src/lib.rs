//! mixrelay-server – Bibliotheks-Root
//!
//! Verdrahtet Konfiguration, Codec-Backend, Mix-Relay und UDP-Adapter und
//! stellt den Einstiegspunkt fuer Integrationstests bereit.

pub mod config;
pub mod udp;

use anyhow::{Context, Result};
use config::ServerConfig;
use mixrelay_voice::{MixRelay, TokioUhr};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use udp::ZielSender;

/// Haelt den Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Subsysteme und laeuft bis Ctrl-C
    pub async fn starten(self) -> Result<()> {
        self.starten_mit_signal(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(fehler = %e, "Ctrl-C-Handler fehlgeschlagen");
            }
        })
        .await
    }

    /// Startet alle Subsysteme und laeuft bis `signal` fertig ist
    ///
    /// Reihenfolge:
    /// 1. Codec-Backend und Relay erstellen
    /// 2. UDP-Socket binden, Sende-Tasks pro Ziel starten
    /// 3. Relay-Session (Ingestion + Emission) und Empfangs-Loop starten
    /// 4. Auf das Signal warten, dann alles geordnet beenden
    pub async fn starten_mit_signal<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let config = self.config;
        config.validieren()?;

        let backend = config.codec.backend_erstellen()?;
        let relay = MixRelay::neu(config.mixer.clone(), backend, Arc::new(TokioUhr))
            .context("Mix-Relay konnte nicht erstellt werden")?;

        let bind = config.bind_adresse()?;
        let socket = Arc::new(
            UdpSocket::bind(bind)
                .await
                .with_context(|| format!("UDP-Socket {bind} konnte nicht gebunden werden"))?,
        );

        tracing::info!(
            udp = %bind,
            codec = ?config.codec.backend,
            ziele = config.netzwerk.ziele.len(),
            tick_ms = config.mixer.tick_ms,
            "MixRelay startet"
        );

        let sender: Vec<ZielSender> = config
            .ziel_adressen()?
            .into_iter()
            .map(|addr| ZielSender::starten(Arc::clone(&socket), addr, &relay))
            .collect();

        let (eingang_tx, eingang_rx) = mpsc::channel(config.netzwerk.eingang_queue_groesse.max(1));
        let session = relay.starten(eingang_rx);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let empfang = tokio::spawn(udp::empfangs_loop(socket, eingang_tx, shutdown_rx));

        tracing::info!("MixRelay laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");
        signal.await;
        tracing::info!("Shutdown-Signal empfangen, MixRelay wird beendet");

        let _ = shutdown_tx.send(true);
        if let Err(e) = empfang.await {
            tracing::warn!(fehler = %e, "Empfangs-Task abgebrochen");
        }
        session.beenden().await;
        for s in sender {
            s.beendet().await;
        }

        tracing::info!("MixRelay beendet");
        Ok(())
    }
}
