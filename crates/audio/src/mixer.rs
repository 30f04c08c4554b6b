//! Mixer fuer mehrere gleichzeitige Sprecher
//!
//! Summiert die dekodierten Frames aller aktiven Quellen in einen
//! 32-Bit-Akkumulator. Pro Quelle wird nur das skalierte Sample auf den
//! i16-Bereich begrenzt; die Summe selbst wird erst nach der Normalisierung
//! auf i16 geclamped. Damit kann die Ausgabe nie ausserhalb von i16 liegen,
//! egal wie viele laute Quellen zusammenkommen.

use serde::{Deserialize, Serialize};

use crate::codec::FrameEncoder;
use crate::error::AudioResult;

/// Strategie fuer die Lautheits-Normalisierung bei mehreren Sprechern
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalisierung {
    /// Summe durch Anzahl der Beitraege teilen
    #[default]
    Mittelwert,
    /// Summe nur herunterskalieren, wenn ihre Spitze den i16-Bereich verlassen wuerde
    Spitzenbegrenzer,
}

/// Beitrag einer Quelle zu einem Mix-Durchlauf
#[derive(Debug, Clone, Copy)]
pub struct MixBeitrag<'a> {
    /// Dekodierter Frame (interleaved)
    pub samples: &'a [i16],
    /// Lautstaerke-Multiplikator (0.0..2.0)
    pub lautstaerke: f32,
}

/// Skaliert ein Sample mit der Lautstaerke und begrenzt es auf i16
pub fn skalieren(sample: i16, lautstaerke: f32) -> i32 {
    (sample as f32 * lautstaerke)
        .round()
        .clamp(i16::MIN as f32, i16::MAX as f32) as i32
}

/// PCM-Mixer mit wiederverwendetem Akkumulator und Ausgabepuffer
pub struct Mixer {
    /// 32-Bit-Summen des laufenden Durchlaufs
    akkumulator: Vec<i32>,
    /// Fertiger Frame nach Normalisierung
    ausgabe: Vec<i16>,
    normalisierung: Normalisierung,
}

impl Mixer {
    /// Erstellt einen Mixer fuer Frames mit `frame_samples` Samples (interleaved)
    pub fn neu(frame_samples: usize, normalisierung: Normalisierung) -> Self {
        Self {
            akkumulator: vec![0; frame_samples],
            ausgabe: vec![0; frame_samples],
            normalisierung,
        }
    }

    pub fn frame_samples(&self) -> usize {
        self.akkumulator.len()
    }

    /// Setzt den Akkumulator auf Stille und summiert alle Beitraege
    ///
    /// Kuerzere Frames tragen nur zu ihren vorhandenen Samples bei, laengere
    /// werden abgeschnitten. Gibt die Anzahl der Beitraege zurueck.
    pub fn akkumulieren<'a, I>(&mut self, beitraege: I) -> usize
    where
        I: IntoIterator<Item = MixBeitrag<'a>>,
    {
        self.akkumulator.fill(0);

        let mut anzahl = 0usize;
        for beitrag in beitraege {
            anzahl += 1;
            for (summe, &sample) in self.akkumulator.iter_mut().zip(beitrag.samples) {
                *summe = summe.saturating_add(skalieren(sample, beitrag.lautstaerke));
            }
        }
        anzahl
    }

    /// Summen des letzten Durchlaufs (vor der Normalisierung)
    pub fn akkumulator(&self) -> &[i32] {
        &self.akkumulator
    }

    /// Mischt alle Beitraege zu einem i16-Frame
    ///
    /// Gibt `None` zurueck, wenn es keine Beitraege gibt (Stille wird nicht erzeugt).
    pub fn mischen<'a, I>(&mut self, beitraege: I) -> Option<&[i16]>
    where
        I: IntoIterator<Item = MixBeitrag<'a>>,
    {
        let anzahl = self.akkumulieren(beitraege);
        if anzahl == 0 {
            return None;
        }

        if anzahl > 1 {
            self.normalisieren(anzahl);
        }

        for (out, &summe) in self.ausgabe.iter_mut().zip(&self.akkumulator) {
            *out = summe.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        }

        Some(&self.ausgabe)
    }

    fn normalisieren(&mut self, anzahl: usize) {
        match self.normalisierung {
            Normalisierung::Mittelwert => {
                let n = anzahl as f64;
                for summe in self.akkumulator.iter_mut() {
                    *summe = (*summe as f64 / n).round() as i32;
                }
            }
            Normalisierung::Spitzenbegrenzer => {
                let max = self.akkumulator.iter().copied().max().unwrap_or(0);
                let min = self.akkumulator.iter().copied().min().unwrap_or(0);

                let mut faktor = 1.0f64;
                if max > i16::MAX as i32 {
                    faktor = faktor.min(i16::MAX as f64 / max as f64);
                }
                if min < i16::MIN as i32 {
                    faktor = faktor.min(i16::MIN as f64 / min as f64);
                }

                if faktor < 1.0 {
                    for summe in self.akkumulator.iter_mut() {
                        *summe = (*summe as f64 * faktor).round() as i32;
                    }
                }
            }
        }
    }
}

/// Mixer plus Encoder: ein Aufruf pro Tick ergibt einen kodierten Frame
pub struct MixEngine {
    mixer: Mixer,
    encoder: Box<dyn FrameEncoder>,
}

impl MixEngine {
    pub fn neu(mixer: Mixer, encoder: Box<dyn FrameEncoder>) -> Self {
        Self { mixer, encoder }
    }

    /// Mischt und kodiert
    ///
    /// `Ok(None)` wenn keine Quelle beitraegt; ein Encoder-Fehler betrifft
    /// nur diesen Tick.
    pub fn mischen<'a, I>(&mut self, beitraege: I) -> AudioResult<Option<Vec<u8>>>
    where
        I: IntoIterator<Item = MixBeitrag<'a>>,
    {
        match self.mixer.mischen(beitraege) {
            Some(pcm) => self.encoder.encode(pcm).map(Some),
            None => Ok(None),
        }
    }

    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{CodecBackend, CodecConfig, PcmBackend};
    use crate::error::AudioError;

    fn beitrag(samples: &[i16], lautstaerke: f32) -> MixBeitrag<'_> {
        MixBeitrag {
            samples,
            lautstaerke,
        }
    }

    #[test]
    fn keine_beitraege_ergibt_none() {
        let mut mixer = Mixer::neu(4, Normalisierung::Mittelwert);
        assert!(mixer.mischen(Vec::new()).is_none());
    }

    #[test]
    fn einzelne_quelle_bleibt_unveraendert() {
        let frame: Vec<i16> = vec![i16::MIN, -1234, 0, 1, 32767, 500];
        for norm in [Normalisierung::Mittelwert, Normalisierung::Spitzenbegrenzer] {
            let mut mixer = Mixer::neu(frame.len(), norm);
            let out = mixer.mischen([beitrag(&frame, 1.0)]).unwrap();
            assert_eq!(out, frame.as_slice(), "{norm:?} darf bei einer Quelle nichts aendern");
        }
    }

    #[test]
    fn mittelwert_teilt_durch_anzahl() {
        let a = vec![1000i16, -2000, 3];
        let b = vec![3000i16, 2000, 4];
        let mut mixer = Mixer::neu(3, Normalisierung::Mittelwert);
        let out = mixer.mischen([beitrag(&a, 1.0), beitrag(&b, 1.0)]).unwrap();
        assert_eq!(out, &[2000, 0, 4]);
    }

    #[test]
    fn lautstaerke_wird_gerundet_und_begrenzt() {
        assert_eq!(skalieren(3, 0.5), 2); // 1.5 -> 2
        assert_eq!(skalieren(-3, 0.5), -2);
        assert_eq!(skalieren(30000, 2.0), i16::MAX as i32);
        assert_eq!(skalieren(-30000, 2.0), i16::MIN as i32);
        assert_eq!(skalieren(12345, 0.0), 0);
    }

    #[test]
    fn summe_laeuft_nicht_ueber() {
        // Viele laute Quellen mit maximaler Verstaerkung: Summe weit jenseits von i16
        let laut = vec![30000i16; 8];
        let leise = vec![-30000i16; 8];
        let mut quellen: Vec<MixBeitrag<'_>> = Vec::new();
        for _ in 0..50 {
            quellen.push(beitrag(&laut, 2.0));
        }

        let mut mixer = Mixer::neu(8, Normalisierung::Mittelwert);
        let n = mixer.akkumulieren(quellen.clone());
        assert_eq!(n, 50);
        // Akkumulator haelt die volle Summe (kein Wraparound)
        assert!(mixer.akkumulator().iter().all(|&s| s == 50 * 32767));

        for norm in [Normalisierung::Mittelwert, Normalisierung::Spitzenbegrenzer] {
            let mut mixer = Mixer::neu(8, norm);
            let out = mixer.mischen(quellen.clone()).unwrap();
            assert!(out.iter().all(|&s| s == i16::MAX), "{norm:?}: {out:?}");

            let negativ: Vec<_> = (0..50).map(|_| beitrag(&leise, 2.0)).collect();
            let out = mixer.mischen(negativ).unwrap();
            assert!(out.iter().all(|&s| s == i16::MIN), "{norm:?}: {out:?}");
        }
    }

    #[test]
    fn ausgabe_bleibt_in_i16_fuer_alle_verstaerkungen() {
        let muster: Vec<i16> = vec![i16::MAX, i16::MIN, 20000, -20000, 1, -1, 0, 12345];
        let verstaerkungen = [0.0f32, 0.3, 1.0, 1.5, 2.0];

        for anzahl in 1..=6usize {
            for &g in &verstaerkungen {
                let quellen: Vec<_> = (0..anzahl).map(|_| beitrag(&muster, g)).collect();
                let mut mixer = Mixer::neu(muster.len(), Normalisierung::Spitzenbegrenzer);
                let out = mixer.mischen(quellen).unwrap().to_vec();
                // Ein Wraparound wuerde das Vorzeichen kippen
                for (o, &m) in out.iter().zip(&muster) {
                    if g == 0.0 {
                        assert_eq!(*o, 0);
                    } else if m >= 100 {
                        assert!(*o > 0, "Vorzeichen gekippt: {m} -> {o}");
                    } else if m <= -100 {
                        assert!(*o < 0, "Vorzeichen gekippt: {m} -> {o}");
                    }
                }
            }
        }
    }

    #[test]
    fn akkumulation_ist_kommutativ_und_assoziativ() {
        let a: Vec<i16> = vec![100, -32768, 32767, 7];
        let b: Vec<i16> = vec![-50, -32768, 32767, 9];
        let c: Vec<i16> = vec![25, 1000, -1000, -3];

        let mut mixer = Mixer::neu(4, Normalisierung::Mittelwert);
        mixer.akkumulieren([beitrag(&a, 1.2), beitrag(&b, 0.7)]);
        let ab = mixer.akkumulator().to_vec();
        mixer.akkumulieren([beitrag(&c, 1.9)]);
        let nur_c = mixer.akkumulator().to_vec();
        mixer.akkumulieren([beitrag(&c, 1.9), beitrag(&b, 0.7), beitrag(&a, 1.2)]);
        let cba = mixer.akkumulator().to_vec();

        let summe: Vec<i32> = ab.iter().zip(&nur_c).map(|(x, y)| x + y).collect();
        assert_eq!(cba, summe);
    }

    #[test]
    fn kuerzere_frames_werden_aufgefuellt() {
        let kurz = vec![1000i16, 1000];
        let lang = vec![1000i16; 6];
        let mut mixer = Mixer::neu(4, Normalisierung::Mittelwert);
        let out = mixer.mischen([beitrag(&kurz, 1.0), beitrag(&lang, 1.0)]).unwrap();
        assert_eq!(out, &[1000, 1000, 500, 500]);
    }

    #[test]
    fn spitzenbegrenzer_skaliert_nur_bei_bedarf() {
        let a = vec![1000i16, -1000];
        let b = vec![2000i16, -500];
        let mut mixer = Mixer::neu(2, Normalisierung::Spitzenbegrenzer);
        // Summe passt in i16: keine Absenkung der Lautheit
        assert_eq!(mixer.mischen([beitrag(&a, 1.0), beitrag(&b, 1.0)]).unwrap(), &[3000, -1500]);

        let c = vec![30000i16, 15000];
        let out = mixer.mischen([beitrag(&c, 1.0), beitrag(&c, 1.0)]).unwrap();
        assert_eq!(out[0], i16::MAX);
        assert!((out[1] as i32 - 16384).abs() <= 1);
    }

    #[test]
    fn mix_engine_kodiert_oder_ueberspringt() {
        let mut config = CodecConfig::default();
        config.channels = crate::codec::ChannelCount::Mono;
        config.sample_rate = crate::codec::SampleRate::Hz8000;
        config.frame_dauer_ms = 10; // 80 Samples
        let backend = PcmBackend::neu(config).unwrap();
        let mut engine = MixEngine::neu(
            Mixer::neu(80, Normalisierung::Mittelwert),
            backend.encoder().unwrap(),
        );

        assert!(engine.mischen(Vec::new()).unwrap().is_none());

        let frame = vec![42i16; 80];
        let kodiert = engine.mischen([beitrag(&frame, 1.0)]).unwrap().unwrap();
        assert_eq!(kodiert, PcmBackend::frame_aus_pcm(&frame));
        assert_eq!(engine.mixer().frame_samples(), 80);
    }

    #[test]
    fn mix_engine_meldet_encoderfehler() {
        let backend = PcmBackend::neu(CodecConfig::default()).unwrap();
        // Mixer-Laenge passt nicht zum Encoder -> Kodierfehler fuer diesen Tick
        let mut engine = MixEngine::neu(
            Mixer::neu(10, Normalisierung::Mittelwert),
            backend.encoder().unwrap(),
        );
        let frame = vec![1i16; 10];
        let result = engine.mischen([beitrag(&frame, 1.0)]);
        assert!(matches!(result, Err(AudioError::Kodierung(_))));
    }
}
