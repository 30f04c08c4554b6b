//! mixrelay-audio – Audio-Kern des Mix-Relays
//!
//! - Codec-Adapter (Opus via audiopus, verlustfreies Roh-PCM fuer Tests)
//! - Sprachaktivitaets-Gate (RMS-Energie mit Haltezeit)
//! - Mixer mit 32-Bit-Akkumulator und Lautheits-Normalisierung

pub mod codec;
pub mod error;
pub mod mixer;
pub mod vad;

// Bequeme Re-Exporte der wichtigsten Typen
pub use codec::{
    ChannelCount, CodecBackend, CodecConfig, FrameDecoder, FrameEncoder, OpusBackend, PcmBackend,
    SampleRate,
};
pub use error::{AudioError, AudioResult};
pub use mixer::{MixBeitrag, MixEngine, Mixer, Normalisierung};
pub use vad::{rms_energie, AktivitaetsGate, AktivitaetsZustand};
