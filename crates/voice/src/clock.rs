//! Injizierbare Uhr
//!
//! Registry und Session lesen die Zeit ausschliesslich ueber [`Uhr`].
//! Im Betrieb ist das die tokio-Uhr (respektiert `tokio::time::pause`),
//! in Tests kann eine [`ManuelleUhr`] deterministisch vorgestellt werden.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Zeitquelle fuer Registry und Scheduler
pub trait Uhr: Send + Sync + 'static {
    fn jetzt(&self) -> Instant;
}

/// Uhr auf Basis von `tokio::time::Instant`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioUhr;

impl Uhr for TokioUhr {
    fn jetzt(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}

/// Manuell vorgestellte Uhr fuer Tests und Simulationen
///
/// `Clone` teilt den Zeitstand (innerer Arc).
#[derive(Debug, Clone)]
pub struct ManuelleUhr {
    jetzt: Arc<Mutex<Instant>>,
}

impl ManuelleUhr {
    pub fn neu() -> Self {
        Self {
            jetzt: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Stellt die Uhr um `dauer` vor
    pub fn vorstellen(&self, dauer: Duration) {
        *self.jetzt.lock() += dauer;
    }
}

impl Default for ManuelleUhr {
    fn default() -> Self {
        Self::neu()
    }
}

impl Uhr for ManuelleUhr {
    fn jetzt(&self) -> Instant {
        *self.jetzt.lock()
    }
}
