//! Codec-Konfiguration
//!
//! Auswahl des Codec-Backends, Opus-Encoder-Parameter und vordefinierte
//! Presets. Das Frame-Format (Abtastrate, Frame-Dauer) wird getrennt davon
//! in `murmel_core::FrameFormat` festgelegt und gilt fuer die ganze Sitzung.

use murmel_core::types::FrameFormat;
use serde::{Deserialize, Serialize};

/// Von Opus unterstuetzte Abtastraten in Hz
pub const OPUS_ABTASTRATEN: [u32; 5] = [8000, 12000, 16000, 24000, 48000];

/// Erlaubte Frame-Dauern in ms
pub const FRAME_DAUERN_MS: [u32; 4] = [10, 20, 40, 60];

// ---------------------------------------------------------------------------
// Codec-Auswahl
// ---------------------------------------------------------------------------

/// Codec-Backend einer Sitzung
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecKind {
    /// Opus (verlustbehaftet, libopus)
    #[default]
    Opus,
    /// 16-bit PCM little-endian (verlustfrei, ohne native Abhaengigkeit)
    Pcm16,
}

impl CodecKind {
    /// Bezeichnung fuer Logs und Telemetrie
    pub fn bezeichnung(&self) -> &'static str {
        match self {
            CodecKind::Opus => "opus",
            CodecKind::Pcm16 => "pcm16",
        }
    }

    /// Maximale Nutzdaten-Groesse eines kodierten Frames
    pub fn max_nutzdaten(&self, format: &FrameFormat) -> usize {
        match self {
            CodecKind::Opus => 4000,
            CodecKind::Pcm16 => format.samples_per_frame() * 2,
        }
    }
}

/// Prueft ob ein Frame-Format fuer die Sitzung zulaessig ist
pub fn format_validieren(format: &FrameFormat) -> Result<(), String> {
    if !OPUS_ABTASTRATEN.contains(&format.sample_rate) {
        return Err(format!(
            "Abtastrate {} Hz nicht unterstuetzt (erlaubt: {:?})",
            format.sample_rate, OPUS_ABTASTRATEN
        ));
    }
    if !FRAME_DAUERN_MS.contains(&format.frame_duration_ms) {
        return Err(format!(
            "Frame-Dauer {} ms nicht unterstuetzt (erlaubt: {:?})",
            format.frame_duration_ms, FRAME_DAUERN_MS
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Opus-Konfiguration
// ---------------------------------------------------------------------------

/// Opus-Anwendungsmodus
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpusApplication {
    /// Optimiert fuer Sprachverstaendlichkeit (VOIP)
    #[default]
    Voip,
    /// Optimiert fuer allgemeine Audio-Qualitaet (Musik)
    Audio,
    /// Minimale Verarbeitungsverzoegerung
    RestrictedLowdelay,
}

/// Opus-Encoder-Parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpusConfig {
    /// Ziel-Bitrate in kbps (6–510)
    pub bitrate_kbps: u16,
    /// Anwendungsmodus
    pub application: OpusApplication,
    /// In-Band Forward Error Correction
    pub fec_enabled: bool,
    /// Discontinuous Transmission
    pub dtx_enabled: bool,
    /// Komplexitaet (0–10)
    pub complexity: u8,
    /// Variable Bitrate
    pub vbr_enabled: bool,
}

impl Default for OpusConfig {
    fn default() -> Self {
        AudioPreset::default().config()
    }
}

impl OpusConfig {
    /// Validiert die Konfiguration
    pub fn validieren(&self) -> Result<(), String> {
        if self.bitrate_kbps < 6 || self.bitrate_kbps > 510 {
            return Err(format!(
                "Bitrate muss zwischen 6 und 510 kbps liegen (war: {})",
                self.bitrate_kbps
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

    /// Bitrate in bit/s
    pub fn bitrate_bps(&self) -> i32 {
        i32::from(self.bitrate_kbps) * 1000
    }
}

// ---------------------------------------------------------------------------
// Presets
// ---------------------------------------------------------------------------

/// Vordefinierte Encoder-Einstellungen
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioPreset {
    /// Sprache: niedrige Bitrate, FEC und DTX aktiv
    #[default]
    Speech,
    /// Ausgewogener Kompromiss zwischen Qualitaet und Bandbreite
    Balanced,
    /// Hohe Bitrate, keine Stillefilterung
    Music,
    /// Minimale Bandbreite
    LowBandwidth,
}

impl AudioPreset {
    /// Gibt die `OpusConfig` fuer dieses Preset zurueck
    pub fn config(&self) -> OpusConfig {
        match self {
            AudioPreset::Speech => OpusConfig {
                bitrate_kbps: 32,
                application: OpusApplication::Voip,
                fec_enabled: true,
                dtx_enabled: true,
                complexity: 8,
                vbr_enabled: true,
            },
            AudioPreset::Balanced => OpusConfig {
                bitrate_kbps: 64,
                application: OpusApplication::Voip,
                fec_enabled: true,
                dtx_enabled: false,
                complexity: 9,
                vbr_enabled: true,
            },
            AudioPreset::Music => OpusConfig {
                bitrate_kbps: 128,
                application: OpusApplication::Audio,
                fec_enabled: false,
                dtx_enabled: false,
                complexity: 10,
                vbr_enabled: false,
            },
            AudioPreset::LowBandwidth => OpusConfig {
                bitrate_kbps: 12,
                application: OpusApplication::Voip,
                fec_enabled: false,
                dtx_enabled: true,
                complexity: 5,
                vbr_enabled: true,
            },
        }
    }

    /// Menschenlesbarer Name
    pub fn bezeichnung(&self) -> &'static str {
        match self {
            AudioPreset::Speech => "Sprache",
            AudioPreset::Balanced => "Ausgewogen",
            AudioPreset::Music => "Musik",
            AudioPreset::LowBandwidth => "Niedrige Bandbreite",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
