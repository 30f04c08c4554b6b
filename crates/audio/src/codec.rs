//! Codec-Adapter: Opus Encoder/Decoder hinter einer Trait-Schnittstelle
//!
//! Kapselt audiopus und stellt eine i16-PCM basierte API bereit
//! (interleaved, Kanaele abwechselnd). Die Konfiguration wird bei der
//! Konstruktion fixiert; zwischen Aufrufen haelt ein Codec nur seinen
//! internen Encoder-/Decoder-Kontext.
//!
//! Neben Opus gibt es ein verlustfreies Roh-PCM-Backend (little-endian i16),
//! das fuer Loopback-Tests und Fehlersuche gedacht ist.

use audiopus::{
    coder::{Decoder, Encoder},
    Application, Channels, SampleRate as OpusSampleRate,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AudioError, AudioResult};

/// Opus-CTL: erwarteter Paketverlust in Prozent (OPUS_SET_PACKET_LOSS_PERC_REQUEST)
const OPUS_SET_PACKET_LOSS_PERC: i32 = 4014;

/// Laengster Frame, den ein Decoder liefern kann (120 ms)
const MAX_FRAME_DAUER_MS: u32 = 120;

/// Ausgabepuffer fuer den Encoder – reicht fuer alle Opus-Frames
const MAX_PAKET_BYTES: usize = 4000;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Abtastrate
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleRate {
    /// 8 kHz – Schmalband
    Hz8000 = 8000,
    /// 16 kHz – Breitband
    Hz16000 = 16000,
    /// 24 kHz – Superbreitband
    Hz24000 = 24000,
    /// 48 kHz – Vollband (Standard)
    #[default]
    Hz48000 = 48000,
}

/// Anzahl der Audio-Kanaele
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelCount {
    Mono = 1,
    #[default]
    Stereo = 2,
}

/// Vollstaendige Codec-Konfiguration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Abtastrate
    pub sample_rate: SampleRate,
    /// Anzahl der Kanaele
    pub channels: ChannelCount,
    /// Frame-Dauer in Millisekunden (10, 20, 40 oder 60)
    pub frame_dauer_ms: u32,
    /// Ziel-Bitrate in kbps (6–510)
    pub bitrate_kbps: u16,
    /// In-Band Forward Error Correction aktivieren
    pub fec_enabled: bool,
    /// Erwarteter Paketverlust in Prozent (Hinweis an den Encoder)
    pub erwarteter_verlust_prozent: u8,
    /// Komplexitaet (0–10)
    pub complexity: u8,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            sample_rate: SampleRate::Hz48000,
            channels: ChannelCount::Stereo,
            frame_dauer_ms: 20,
            bitrate_kbps: 64,
            fec_enabled: true,
            erwarteter_verlust_prozent: 10,
            complexity: 10,
        }
    }
}

impl CodecConfig {
    /// Validiert die Konfiguration
    pub fn validieren(&self) -> Result<(), String> {
        if self.bitrate_kbps < 6 || self.bitrate_kbps > 510 {
            return Err(format!(
                "Bitrate muss zwischen 6 und 510 kbps liegen (war: {})",
                self.bitrate_kbps
            ));
        }
        if !matches!(self.frame_dauer_ms, 10 | 20 | 40 | 60) {
            return Err(format!(
                "Frame-Dauer muss 10, 20, 40 oder 60 ms sein (war: {})",
                self.frame_dauer_ms
            ));
        }
        if self.erwarteter_verlust_prozent > 100 {
            return Err(format!(
                "Paketverlust muss zwischen 0 und 100 % liegen (war: {})",
                self.erwarteter_verlust_prozent
            ));
        }
        if self.complexity > 10 {
            return Err(format!(
                "Komplexitaet muss zwischen 0 und 10 liegen (war: {})",
                self.complexity
            ));
        }
        Ok(())
    }

    /// Samples pro Kanal in einem Frame (960 bei 48 kHz / 20 ms)
    pub fn samples_pro_kanal(&self) -> usize {
        (self.sample_rate as u32 * self.frame_dauer_ms / 1000) as usize
    }

    /// Samples eines kompletten interleaved Frames (Samples pro Kanal × Kanaele)
    pub fn frame_samples(&self) -> usize {
        self.samples_pro_kanal() * self.channels as usize
    }

    fn max_decode_samples(&self) -> usize {
        (self.sample_rate as u32 * MAX_FRAME_DAUER_MS / 1000) as usize * self.channels as usize
    }
}

// ---------------------------------------------------------------------------
// Schnittstellen
// ---------------------------------------------------------------------------

/// Dekodiert kodierte Frames einer einzelnen Quelle zu interleaved i16-PCM
pub trait FrameDecoder: Send {
    /// Liefert genau so viele Samples wie der Decoder gemeldet hat
    /// (Samples pro Kanal × Kanaele).
    fn decode(&mut self, frame: &[u8]) -> AudioResult<Vec<i16>>;
}

/// Kodiert einen kompletten PCM-Frame
pub trait FrameEncoder: Send {
    /// Die Eingabe muss exakt `CodecConfig::frame_samples()` lang sein.
    fn encode(&mut self, pcm: &[i16]) -> AudioResult<Vec<u8>>;
}

/// Erzeugt Encoder und Decoder mit gemeinsamer Konfiguration
pub trait CodecBackend: Send + Sync {
    /// Konfiguration, mit der alle Codecs dieses Backends arbeiten
    fn config(&self) -> &CodecConfig;

    /// Neuer Decoder (ein Kontext pro Quelle)
    fn decoder(&self) -> AudioResult<Box<dyn FrameDecoder>>;

    /// Neuer Encoder (ein Kontext pro Ausgabe-Stream)
    fn encoder(&self) -> AudioResult<Box<dyn FrameEncoder>>;
}

// ---------------------------------------------------------------------------
// Opus
// ---------------------------------------------------------------------------

/// Opus-Backend (audiopus)
#[derive(Debug, Clone)]
pub struct OpusBackend {
    config: CodecConfig,
}

impl OpusBackend {
    /// Erstellt ein Backend; die Konfiguration wird sofort validiert
    pub fn neu(config: CodecConfig) -> AudioResult<Self> {
        config.validieren().map_err(AudioError::Konfiguration)?;
        Ok(Self { config })
    }
}

impl CodecBackend for OpusBackend {
    fn config(&self) -> &CodecConfig {
        &self.config
    }

    fn decoder(&self) -> AudioResult<Box<dyn FrameDecoder>> {
        Ok(Box::new(OpusDecoder::new(&self.config)?))
    }

    fn encoder(&self) -> AudioResult<Box<dyn FrameEncoder>> {
        Ok(Box::new(OpusEncoder::new(self.config.clone())?))
    }
}

/// Opus-Encoder: kodiert i16-PCM zu Opus-Bytes
pub struct OpusEncoder {
    encoder: Encoder,
    frame_samples: usize,
}

impl OpusEncoder {
    /// Erstellt einen neuen Encoder mit der gegebenen Konfiguration
    pub fn new(config: CodecConfig) -> AudioResult<Self> {
        config.validieren().map_err(AudioError::Konfiguration)?;

        let mut encoder = Encoder::new(
            opus_rate(config.sample_rate),
            opus_channels(config.channels),
            Application::Voip,
        )
        .map_err(|e| AudioError::CodecInit(e.to_string()))?;

        encoder
            .set_bitrate(audiopus::Bitrate::BitsPerSecond(
                (config.bitrate_kbps as i32) * 1000,
            ))
            .map_err(|e| AudioError::CodecInit(e.to_string()))?;

        encoder
            .set_complexity(config.complexity)
            .map_err(|e| AudioError::CodecInit(e.to_string()))?;

        // FEC und Verlust-Hinweis sind Optimierungen: Fehler nur loggen
        if let Err(e) = encoder.set_inband_fec(config.fec_enabled) {
            warn!(fehler = %e, "FEC konnte nicht gesetzt werden");
        }
        if let Err(e) = encoder.set_encoder_ctl_request(
            OPUS_SET_PACKET_LOSS_PERC,
            config.erwarteter_verlust_prozent as i32,
        ) {
            warn!(fehler = %e, "Paketverlust-Hinweis konnte nicht gesetzt werden");
        }

        let frame_samples = config.frame_samples();

        debug!(
            bitrate_kbps = config.bitrate_kbps,
            fec = config.fec_enabled,
            verlust = config.erwarteter_verlust_prozent,
            frame_samples,
            "OpusEncoder erstellt"
        );

        Ok(Self {
            encoder,
            frame_samples,
        })
    }
}

impl FrameEncoder for OpusEncoder {
    fn encode(&mut self, pcm: &[i16]) -> AudioResult<Vec<u8>> {
        if pcm.len() != self.frame_samples {
            return Err(AudioError::Kodierung(format!(
                "PCM-Frame muss {} Samples lang sein, war {}",
                self.frame_samples,
                pcm.len()
            )));
        }

        let mut output = vec![0u8; MAX_PAKET_BYTES];
        let written = self
            .encoder
            .encode(pcm, &mut output)
            .map_err(|e| AudioError::Kodierung(e.to_string()))?;

        output.truncate(written);
        Ok(output)
    }
}

/// Opus-Decoder: dekodiert Opus-Bytes zu i16-PCM
pub struct OpusDecoder {
    decoder: Decoder,
    channels: usize,
    max_samples: usize,
}

impl OpusDecoder {
    /// Erstellt einen neuen Decoder fuer Abtastrate und Kanaele der Konfiguration
    pub fn new(config: &CodecConfig) -> AudioResult<Self> {
        let decoder = Decoder::new(opus_rate(config.sample_rate), opus_channels(config.channels))
            .map_err(|e| AudioError::CodecInit(e.to_string()))?;

        Ok(Self {
            decoder,
            channels: config.channels as usize,
            max_samples: config.max_decode_samples(),
        })
    }
}

impl FrameDecoder for OpusDecoder {
    fn decode(&mut self, frame: &[u8]) -> AudioResult<Vec<i16>> {
        let mut output = vec![0i16; self.max_samples];
        let pro_kanal = self
            .decoder
            .decode(Some(frame), &mut output, false)
            .map_err(|e| AudioError::Dekodierung(e.to_string()))?;

        output.truncate(pro_kanal * self.channels);
        Ok(output)
    }
}

fn opus_rate(rate: SampleRate) -> OpusSampleRate {
    match rate {
        SampleRate::Hz8000 => OpusSampleRate::Hz8000,
        SampleRate::Hz16000 => OpusSampleRate::Hz16000,
        SampleRate::Hz24000 => OpusSampleRate::Hz24000,
        SampleRate::Hz48000 => OpusSampleRate::Hz48000,
    }
}

fn opus_channels(ch: ChannelCount) -> Channels {
    match ch {
        ChannelCount::Mono => Channels::Mono,
        ChannelCount::Stereo => Channels::Stereo,
    }
}

// ---------------------------------------------------------------------------
// Roh-PCM (verlustfrei)
// ---------------------------------------------------------------------------

/// Verlustfreies Backend: ein Frame ist das little-endian i16-PCM selbst
#[derive(Debug, Clone, Default)]
pub struct PcmBackend {
    config: CodecConfig,
}

impl PcmBackend {
    pub fn neu(config: CodecConfig) -> AudioResult<Self> {
        config.validieren().map_err(AudioError::Konfiguration)?;
        Ok(Self { config })
    }

    /// Kodiert PCM ohne Laengenpruefung (Hilfsfunktion fuer Absender)
    pub fn frame_aus_pcm(pcm: &[i16]) -> Vec<u8> {
        pcm.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

impl CodecBackend for PcmBackend {
    fn config(&self) -> &CodecConfig {
        &self.config
    }

    fn decoder(&self) -> AudioResult<Box<dyn FrameDecoder>> {
        Ok(Box::new(PcmDecoder {
            kanaele: self.config.channels as usize,
            max_samples: self.config.max_decode_samples(),
        }))
    }

    fn encoder(&self) -> AudioResult<Box<dyn FrameEncoder>> {
        Ok(Box::new(PcmEncoder {
            frame_samples: self.config.frame_samples(),
        }))
    }
}

struct PcmDecoder {
    kanaele: usize,
    max_samples: usize,
}

impl FrameDecoder for PcmDecoder {
    fn decode(&mut self, frame: &[u8]) -> AudioResult<Vec<i16>> {
        let block = 2 * self.kanaele;
        if frame.is_empty() || frame.len() % block != 0 {
            return Err(AudioError::Dekodierung(format!(
                "PCM-Frame muss ein Vielfaches von {block} Bytes sein (war {})",
                frame.len()
            )));
        }
        if frame.len() / 2 > self.max_samples {
            return Err(AudioError::Dekodierung(format!(
                "PCM-Frame zu lang: {} Samples (max. {})",
                frame.len() / 2,
                self.max_samples
            )));
        }

        Ok(frame
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect())
    }
}

struct PcmEncoder {
    frame_samples: usize,
}

impl FrameEncoder for PcmEncoder {
    fn encode(&mut self, pcm: &[i16]) -> AudioResult<Vec<u8>> {
        if pcm.len() != self.frame_samples {
            return Err(AudioError::Kodierung(format!(
                "PCM-Frame muss {} Samples lang sein, war {}",
                self.frame_samples,
                pcm.len()
            )));
        }
        Ok(PcmBackend::frame_aus_pcm(pcm))
    }
}
