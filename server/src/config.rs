//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Relay ohne Konfigurationsdatei
//! lauffaehig ist.

use mixrelay_audio::{CodecBackend, CodecConfig, OpusBackend, PcmBackend};
use mixrelay_observability::LogFormat;
use mixrelay_voice::RelayConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Mix-Relay (Gate, Jitter, Eviction, Tick, Normalisierung)
    pub mixer: RelayConfig,
    /// Codec-Backend und -Parameter
    pub codec: CodecEinstellungen,
    /// UDP-Adapter
    pub netzwerk: NetzwerkEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// Welcher Codec fuer Ein- und Ausgabe verwendet wird
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecArt {
    #[default]
    Opus,
    /// Roh-PCM (little-endian i16), zum Testen mit einfachen Sendern
    Pcm,
}

/// Codec-Einstellungen
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecEinstellungen {
    pub backend: CodecArt,
    #[serde(flatten)]
    pub parameter: CodecConfig,
}

impl CodecEinstellungen {
    /// Erstellt das Backend; ungueltige Parameter werden hier abgewiesen
    pub fn backend_erstellen(&self) -> anyhow::Result<Arc<dyn CodecBackend>> {
        let backend: Arc<dyn CodecBackend> = match self.backend {
            CodecArt::Opus => Arc::new(OpusBackend::neu(self.parameter.clone())?),
            CodecArt::Pcm => Arc::new(PcmBackend::neu(self.parameter.clone())?),
        };
        Ok(backend)
    }
}

/// Netzwerk-Einstellungen des UDP-Adapters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer eingehende Frames
    pub bind_adresse: String,
    /// Ziele, an die gemischte Frames gesendet werden
    pub ziele: Vec<String>,
    /// Groesse der Queue zwischen Empfang und Ingestion
    pub eingang_queue_groesse: usize,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0:9987".into(),
            ziele: vec![],
            eingang_queue_groesse: 256,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Filter-Direktive, z.B. "info" oder "mixrelay_voice=debug"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: LogFormat,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Text,
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => Self::aus_toml(&inhalt)
                .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}")),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Parst und validiert eine Konfiguration
    pub fn aus_toml(inhalt: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(inhalt)?;
        config.validieren()?;
        Ok(config)
    }

    /// Prueft Codec-Werte und Zieladressen
    pub fn validieren(&self) -> anyhow::Result<()> {
        self.codec
            .parameter
            .validieren()
            .map_err(|e| anyhow::anyhow!("[codec]: {e}"))?;
        self.ziel_adressen()?;
        self.bind_adresse()?;
        Ok(())
    }

    pub fn bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        self.netzwerk.bind_adresse.parse().map_err(|e| {
            anyhow::anyhow!("Ungueltige Bind-Adresse '{}': {e}", self.netzwerk.bind_adresse)
        })
    }

    pub fn ziel_adressen(&self) -> anyhow::Result<Vec<SocketAddr>> {
        self.netzwerk
            .ziele
            .iter()
            .map(|s| {
                s.parse::<SocketAddr>()
                    .map_err(|e| anyhow::anyhow!("Ungueltige Zieladresse '{s}': {e}"))
            })
            .collect()
    }
}
