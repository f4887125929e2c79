//! Voice Activity Gate
//!
//! Entscheidet pro Frame anhand eines Pegels (RMS oder Wahrscheinlichkeit
//! eines externen Detektors), ob gerade gesprochen wird, und damit ob
//! Frames ans Netzwerk gehen.
//!
//! Ablauf pro `update_level`:
//! 1. Rauschboden nachfuehren: schnell nach unten, langsam nach oben
//!    (nur in Sprechpausen und erst ab genug Messwerten, ueber den Median
//!    des gleitenden Fensters)
//! 2. Rauschboden -> geschaetzter SNR -> Multiplikator fuer die
//!    Basis-Schwellen (<= 6 dB: 1.5x, >= 20 dB: 0.8x, linear dazwischen)
//! 3. Hysterese: Start ueber der positiven, Ende unter der negativen
//!    Schwelle, das Ende erst nach der Debounce-Zeit
//!
//! Die Zeit des Gates laeuft nur ueber `update_level` (eine Frame-Dauer
//! pro Aufruf), daher ist das Verhalten vollstaendig deterministisch.

use std::collections::VecDeque;

use murmel_core::event::AudioEvent;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Zeitfenster fuer die Erkennung schnellen Umschaltens (ms)
const TOGGLE_FENSTER_MS: u64 = 3_000;
/// Ab so vielen Flanken im Fenster wird die Debounce-Zeit verlaengert
const TOGGLE_GRENZE: usize = 4;
/// Nach so langer Dauersprache werden die Schwellen angehoben (ms)
const LANGE_SPRACHE_MS: u64 = 30_000;
/// Nach so langer Stille werden die Schwellen abgesenkt (ms)
const LANGE_STILLE_MS: u64 = 300_000;
const NUDGE_SCHRITT: f32 = 1.1;
const NUDGE_MIN: f32 = 0.7;
const NUDGE_MAX: f32 = 1.5;
/// Untergrenze fuer den Rauschboden in der SNR-Rechnung
const MIN_RAUSCHBODEN: f32 = 1e-6;

/// Konfiguration des Gates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Gate aktiv; deaktiviert wird immer gesendet
    pub enabled: bool,
    /// Schwellen anhand des Rauschbodens anpassen
    pub adaptive: bool,
    /// Basis-Schwelle fuer Sprachbeginn
    pub positive_threshold: f32,
    /// Basis-Schwelle fuer Sprachende
    pub negative_threshold: f32,
    /// Mindestdauer unter der negativen Schwelle bis Sprachende
    pub debounce_ms: u32,
    /// Obergrenze der verlaengerten Debounce-Zeit
    pub max_debounce_ms: u32,
    /// Dauer eines Frames; Zeitbasis des Gates
    pub frame_duration_ms: u32,
    /// Nominaler Sprachpegel fuer die SNR-Schaetzung
    pub reference_level: f32,
    /// Laenge des gleitenden Pegelfensters in Frames
    pub window_frames: usize,
    /// Mindestanzahl Messwerte bevor der Rauschboden steigen darf
    pub min_floor_samples: usize,
    /// Anteil pro Frame beim Absinken des Rauschbodens
    pub floor_decay: f32,
    /// Anteil pro Frame beim Anstieg des Rauschbodens
    pub floor_rise: f32,
    /// Untere Klammer fuer angepasste Schwellen
    pub min_threshold: f32,
    /// Obere Klammer fuer angepasste Schwellen
    pub max_threshold: f32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            adaptive: true,
            positive_threshold: 0.02,
            negative_threshold: 0.012,
            debounce_ms: 300,
            max_debounce_ms: 1_200,
            frame_duration_ms: 20,
            reference_level: 0.1,
            window_frames: 50,
            min_floor_samples: 25,
            floor_decay: 0.5,
            floor_rise: 0.02,
            min_threshold: 0.001,
            max_threshold: 0.5,
        }
    }
}

impl GateConfig {
    /// Prueft die Konfiguration auf Konsistenz
    pub fn validieren(&self) -> Result<(), String> {
        if !(self.positive_threshold > 0.0) || !(self.negative_threshold > 0.0) {
            return Err("VAD-Schwellen muessen positiv sein".into());
        }
        if self.negative_threshold >= self.positive_threshold {
            return Err(format!(
                "Negative Schwelle ({}) muss unter der positiven ({}) liegen",
                self.negative_threshold, self.positive_threshold
            ));
        }
        if self.frame_duration_ms == 0 {
            return Err("Frame-Dauer des Gates darf nicht 0 sein".into());
        }
        if self.max_debounce_ms < self.debounce_ms {
            return Err("max_debounce_ms muss >= debounce_ms sein".into());
        }
        if self.window_frames == 0 || self.min_floor_samples > self.window_frames {
            return Err("Pegelfenster zu klein fuer min_floor_samples".into());
        }
        Ok(())
    }
}

/// Flanke des Sprechzustands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateEvent {
    SpeechStarted,
    SpeechEnded,
}

impl From<GateEvent> for AudioEvent {
    fn from(event: GateEvent) -> Self {
        match event {
            GateEvent::SpeechStarted => AudioEvent::SpeechStarted,
            GateEvent::SpeechEnded => AudioEvent::SpeechEnded,
        }
    }
}

/// Voice Activity Gate mit adaptiven Schwellen
pub struct VoiceActivityGate {
    config: GateConfig,
    speaking: bool,
    noise_floor: Option<f32>,
    window: VecDeque<f32>,
    positive: f32,
    negative: f32,
    nudge: f32,
    debounce_ms: u32,
    now_ms: u64,
    below_since: Option<u64>,
    edges: VecDeque<u64>,
    phase_since: u64,
}

impl VoiceActivityGate {
    pub fn new(config: GateConfig) -> Self {
        let positive = config.positive_threshold;
        let negative = config.negative_threshold;
        let debounce_ms = config.debounce_ms;
        let window = VecDeque::with_capacity(config.window_frames);
        Self {
            config,
            speaking: false,
            noise_floor: None,
            window,
            positive,
            negative,
            nudge: 1.0,
            debounce_ms,
            now_ms: 0,
            below_since: None,
            edges: VecDeque::new(),
            phase_since: 0,
        }
    }

    /// Verarbeitet den Pegel eines Frames und liefert ggf. eine Flanke
    pub fn update_level(&mut self, level: f32) -> Option<GateEvent> {
        self.now_ms += u64::from(self.config.frame_duration_ms);
        if !self.config.enabled {
            return None;
        }

        let level = if level.is_finite() { level.max(0.0) } else { 0.0 };

        if self.window.len() == self.config.window_frames {
            self.window.pop_front();
        }
        self.window.push_back(level);

        self.rauschboden_nachfuehren(level);
        self.langzeit_anpassen();
        self.schwellen_berechnen();

        let event = self.hysterese(level);
        self.debounce_nachfuehren();
        event
    }

    fn rauschboden_nachfuehren(&mut self, level: f32) {
        let floor = match self.noise_floor {
            Some(f) => f,
            None => {
                self.noise_floor = Some(level.min(self.config.negative_threshold));
                return;
            }
        };

        let neu = if level < floor {
            floor + self.config.floor_decay * (level - floor)
        } else if !self.speaking && self.window.len() >= self.config.min_floor_samples {
            let median = median(&self.window);
            if median > floor {
                floor + self.config.floor_rise * (median - floor)
            } else {
                floor
            }
        } else {
            floor
        };
        self.noise_floor = Some(neu);
    }

    fn schwellen_berechnen(&mut self) {
        if !self.config.adaptive {
            self.positive = self.config.positive_threshold;
            self.negative = self.config.negative_threshold;
            return;
        }
        let floor = self.noise_floor.unwrap_or(0.0).max(MIN_RAUSCHBODEN);
        let snr_db = 20.0 * (self.config.reference_level / floor).log10();
        let faktor = snr_multiplikator(snr_db) * self.nudge;

        let (min, max) = (self.config.min_threshold, self.config.max_threshold);
        self.positive = (self.config.positive_threshold * faktor).clamp(min, max);
        self.negative = (self.config.negative_threshold * faktor)
            .clamp(min, max)
            .min(self.positive);
    }

    fn hysterese(&mut self, level: f32) -> Option<GateEvent> {
        if !self.speaking {
            if level >= self.positive {
                self.speaking = true;
                self.below_since = None;
                self.flanke();
                debug!(level, schwelle = self.positive, "Sprache beginnt");
                return Some(GateEvent::SpeechStarted);
            }
            return None;
        }

        if level >= self.negative {
            self.below_since = None;
            return None;
        }

        let frame_ms = u64::from(self.config.frame_duration_ms);
        let seit = *self
            .below_since
            .get_or_insert(self.now_ms.saturating_sub(frame_ms));
        if self.now_ms - seit >= u64::from(self.debounce_ms) {
            self.speaking = false;
            self.below_since = None;
            self.flanke();
            debug!(level, schwelle = self.negative, "Sprache endet");
            return Some(GateEvent::SpeechEnded);
        }
        None
    }

    fn flanke(&mut self) {
        self.phase_since = self.now_ms;
        self.edges.push_back(self.now_ms);
        self.alte_flanken_entfernen();
        if self.edges.len() >= TOGGLE_GRENZE && self.debounce_ms < self.config.max_debounce_ms {
            self.debounce_ms = (self.debounce_ms * 3 / 2).min(self.config.max_debounce_ms);
            debug!(debounce_ms = self.debounce_ms, "Schnelles Umschalten, Debounce verlaengert");
        }
    }

    fn alte_flanken_entfernen(&mut self) {
        while let Some(&t) = self.edges.front() {
            if self.now_ms - t > TOGGLE_FENSTER_MS {
                self.edges.pop_front();
            } else {
                break;
            }
        }
    }

    fn debounce_nachfuehren(&mut self) {
        self.alte_flanken_entfernen();
        if self.edges.is_empty() && self.debounce_ms != self.config.debounce_ms {
            self.debounce_ms = self.config.debounce_ms;
        }
    }

    fn langzeit_anpassen(&mut self) {
        if !self.config.adaptive {
            return;
        }
        let dauer = self.now_ms - self.phase_since;
        if self.speaking && dauer >= LANGE_SPRACHE_MS {
            self.nudge = (self.nudge * NUDGE_SCHRITT).min(NUDGE_MAX);
            self.phase_since = self.now_ms;
            debug!(nudge = self.nudge, "Dauersprache, Schwellen angehoben");
        } else if !self.speaking && dauer >= LANGE_STILLE_MS {
            self.nudge = (self.nudge / NUDGE_SCHRITT).max(NUDGE_MIN);
            self.phase_since = self.now_ms;
            debug!(nudge = self.nudge, "Lange Stille, Schwellen abgesenkt");
        }
    }

    /// Setzt den Rauschboden (z.B. aus einer Kalibrierung)
    pub fn seed_noise_floor(&mut self, level: f32) {
        let level = if level.is_finite() { level.max(0.0) } else { 0.0 };
        self.noise_floor = Some(level);
        self.schwellen_berechnen();
    }

    /// Aktiviert oder deaktiviert das Gate
    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
        if !enabled {
            self.speaking = false;
            self.below_since = None;
        }
    }

    /// Setzt den gesamten Zustand zurueck
    pub fn reset(&mut self) {
        self.speaking = false;
        self.noise_floor = None;
        self.window.clear();
        self.nudge = 1.0;
        self.debounce_ms = self.config.debounce_ms;
        self.below_since = None;
        self.edges.clear();
        self.phase_since = self.now_ms;
        self.schwellen_berechnen();
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    /// Ob Frames gesendet werden (deaktiviertes Gate sendet immer)
    pub fn is_transmitting(&self) -> bool {
        !self.config.enabled || self.speaking
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn noise_floor(&self) -> f32 {
        self.noise_floor.unwrap_or(0.0)
    }

    pub fn positive_threshold(&self) -> f32 {
        self.positive
    }

    pub fn negative_threshold(&self) -> f32 {
        self.negative
    }

    pub fn debounce_ms(&self) -> u32 {
        self.debounce_ms
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }
}

/// Multiplikator fuer die Basis-Schwellen abhaengig vom SNR
fn snr_multiplikator(snr_db: f32) -> f32 {
    if snr_db <= 6.0 {
        1.5
    } else if snr_db >= 20.0 {
        0.8
    } else {
        1.5 - (snr_db - 6.0) / 14.0 * 0.7
    }
}

fn median(werte: &VecDeque<f32>) -> f32 {
    let mut sortiert: Vec<f32> = werte.iter().copied().collect();
    sortiert.sort_by(|a, b| a.total_cmp(b));
    sortiert[sortiert.len() / 2]
}

/// Berechnet den RMS-Energiewert eines Frames
pub fn rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}
