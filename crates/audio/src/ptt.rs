//! Sendesteuerung (Push-to-Talk, Mute, Rolle)
//!
//! Drei Modi: Hold (Taste halten), Toggle (Taste umschalten),
//! VoiceActivation (Entscheidung des Voice Activity Gates). Mute und eine
//! Zuhoerer-Rolle ueberstimmen jeden Modus.

use serde::{Deserialize, Serialize};

/// Betriebsmodus fuer Push-to-Talk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PttMode {
    /// Taste halten um zu senden
    Hold,
    /// Einmal druecken zum Aktivieren, nochmals zum Deaktivieren
    Toggle,
    /// Automatisch ueber das Voice Activity Gate
    #[default]
    VoiceActivation,
}

/// Push-to-Talk Controller
pub struct PttController {
    mode: PttMode,
    key_held: bool,
    toggle_active: bool,
    vad_active: bool,
    /// Globales Mute (ueberschreibt alles)
    muted: bool,
    /// Aufnahmeseite durch die Rolle erlaubt
    capture_enabled: bool,
}

impl PttController {
    pub fn new(mode: PttMode) -> Self {
        Self {
            mode,
            key_held: false,
            toggle_active: false,
            vad_active: false,
            muted: false,
            capture_enabled: true,
        }
    }

    pub fn key_down(&mut self) {
        self.key_held = true;
    }

    pub fn key_up(&mut self) {
        self.key_held = false;
    }

    pub fn toggle(&mut self) {
        self.toggle_active = !self.toggle_active;
    }

    /// Entscheidung des Gates (nur im VoiceActivation-Modus relevant)
    pub fn set_vad_active(&mut self, active: bool) {
        self.vad_active = active;
    }

    /// Modus wechseln – setzt Tasten- und Toggle-Zustand zurueck
    pub fn set_mode(&mut self, mode: PttMode) {
        self.mode = mode;
        self.key_held = false;
        self.toggle_active = false;
        self.vad_active = false;
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Aufnahmeseite an- oder abschalten (Rollenwechsel)
    pub fn set_capture_enabled(&mut self, enabled: bool) {
        self.capture_enabled = enabled;
    }

    /// Weder stumm noch durch die Rolle gesperrt
    pub fn sendeberechtigt(&self) -> bool {
        !self.muted && self.capture_enabled
    }

    /// Gibt zurueck ob aktuell gesendet wird
    pub fn is_transmitting(&self) -> bool {
        if !self.sendeberechtigt() {
            return false;
        }
        match self.mode {
            PttMode::Hold => self.key_held,
            PttMode::Toggle => self.toggle_active,
            PttMode::VoiceActivation => self.vad_active,
        }
    }

    pub fn mode(&self) -> PttMode {
        self.mode
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn capture_enabled(&self) -> bool {
        self.capture_enabled
    }
}
