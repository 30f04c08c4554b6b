//! Jitter Queue fuer kodierte Frames einer Quelle
//!
//! Kleine FIFO mit fester Tiefe, die Schwankungen der Ankunftszeit abfaengt,
//! bevor dekodiert wird. Frames bleiben in Ankunftsreihenfolge; sobald die
//! Kapazitaet ueberschritten wird, verlaesst der aelteste Frame die Queue und
//! geht zum Decoder.
//!
//! ## Eigenschaften
//! - Fuellstand <= Kapazitaet nach jedem `push`
//! - Ausgegeben wird immer der aelteste Frame
//! - Nicht thread-safe (Synchronisation erfolgt in der Registry)

use bytes::Bytes;
use std::collections::VecDeque;

/// FIFO mit fester Kapazitaet
#[derive(Debug)]
pub struct JitterQueue {
    kapazitaet: usize,
    frames: VecDeque<Bytes>,
}

impl JitterQueue {
    /// Erstellt eine Queue; eine Kapazitaet von 0 wird auf 1 angehoben
    pub fn neu(kapazitaet: usize) -> Self {
        let kapazitaet = kapazitaet.max(1);
        Self {
            kapazitaet,
            frames: VecDeque::with_capacity(kapazitaet + 1),
        }
    }

    /// Reiht einen Frame ein
    ///
    /// Gibt den aeltesten Frame zurueck, falls die Kapazitaet dadurch
    /// ueberschritten wurde. Dieser ist dann zu dekodieren.
    pub fn push(&mut self, frame: Bytes) -> Option<Bytes> {
        self.frames.push_back(frame);
        if self.frames.len() > self.kapazitaet {
            self.frames.pop_front()
        } else {
            None
        }
    }

    pub fn fuellstand(&self) -> usize {
        self.frames.len()
    }

    pub fn kapazitaet(&self) -> usize {
        self.kapazitaet
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(n: u8) -> Bytes {
        Bytes::from(vec![n; 4])
    }

    #[test]
    fn queue_gibt_erst_nach_ueberlauf_aus() {
        let mut q = JitterQueue::neu(3);
        assert!(q.push(frame(0)).is_none());
        assert!(q.push(frame(1)).is_none());
        assert!(q.push(frame(2)).is_none());
        assert_eq!(q.fuellstand(), 3);

        // Vierter Frame verdraengt den aeltesten
        let aeltester = q.push(frame(3)).expect("Ueberlauf muss aeltesten liefern");
        assert_eq!(aeltester, frame(0));
        assert_eq!(q.fuellstand(), 3);
    }

    #[test]
    fn queue_bewahrt_ankunftsreihenfolge() {
        let mut q = JitterQueue::neu(2);
        let mut ausgegeben = Vec::new();
        for i in 0..10u8 {
            if let Some(f) = q.push(frame(i)) {
                ausgegeben.push(f[0]);
            }
            assert!(q.fuellstand() <= q.kapazitaet(), "Kapazitaet ueberschritten");
        }
        assert_eq!(ausgegeben, (0..8u8).collect::<Vec<_>>());
        assert_eq!(q.fuellstand(), 2);
    }

    #[test]
    fn kapazitaet_null_wird_eins() {
        let mut q = JitterQueue::neu(0);
        assert_eq!(q.kapazitaet(), 1);
        assert!(q.push(frame(0)).is_none());
        assert_eq!(q.push(frame(1)), Some(frame(0)));
    }
}
