//! Audio-Ereignisse fuer Observability
//!
//! Der Kern wirft nie Fehler an die UI-Schicht durch. Alles, was ein
//! Betreiber wissen will (Verluste, Resets, Stalls, Codec-Fehler), wird als
//! `AudioEvent` gesammelt und von der Sitzung an Logging und Metriken
//! weitergereicht.

use crate::types::StreamKey;
use serde::{Deserialize, Serialize};

/// Richtung eines Codec-Fehlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecRichtung {
    Encode,
    Decode,
}

/// Grund fuer das Freigeben eines Streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetireReason {
    /// Vom Signaling angefordert (Teilnehmer weg, Mix neu ausgehandelt)
    Angefordert,
    /// Garbage Collection: zu lange kein Paket
    Inaktiv,
    /// Sitzung wird beendet
    Beendet,
}

/// Alle Ereignisse, die der Audio-Kern nach aussen meldet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AudioEvent {
    // --- Senden ---
    /// Voice Activity Gate: Sprache beginnt
    SpeechStarted,
    /// Voice Activity Gate: Sprache endet
    SpeechEnded,

    // --- Empfang ---
    /// Neuer Remote-Stream angelegt (erstes Paket)
    StreamCreated { stream: StreamKey },
    /// Remote-Stream freigegeben
    StreamRetired {
        stream: StreamKey,
        reason: RetireReason,
    },
    /// Luecke <= max_gap: Pakete gelten als verloren
    PacketsLost {
        stream: StreamKey,
        expected: u32,
        received: u32,
        lost: u32,
    },
    /// Luecke > max_gap: Gegenseite hat neu synchronisiert
    StreamReset {
        stream: StreamKey,
        expected: u32,
        received: u32,
    },
    /// Scheduler hat den Buffer leergelaufen (normal, nur Metrik)
    BufferExhausted { stream: StreamKey },
    /// Heartbeat: zu lange kein erfolgreiches Einplanen
    StallDetected {
        stream: StreamKey,
        consecutive: u32,
    },
    /// Harter Reset nach zu vielen Stalls
    HardReset { stream: StreamKey },
    /// Verlorene Frames wurden durch Ersatz-Audio verdeckt
    FramesConcealed { stream: StreamKey, frames: u32 },
    /// Einzelner Codec-Fehler, durch Stille ersetzt
    CodecFailure {
        stream: Option<StreamKey>,
        richtung: CodecRichtung,
        grund: String,
    },

    // --- Eingangsgrenze ---
    /// Steuer- oder Netzwerkeingabe abgewiesen
    InputRejected { grund: String },
}

impl AudioEvent {
    /// Stream, auf den sich das Ereignis bezieht (falls vorhanden)
    pub fn stream(&self) -> Option<&StreamKey> {
        match self {
            Self::StreamCreated { stream }
            | Self::StreamRetired { stream, .. }
            | Self::PacketsLost { stream, .. }
            | Self::StreamReset { stream, .. }
            | Self::BufferExhausted { stream }
            | Self::StallDetected { stream, .. }
            | Self::HardReset { stream }
            | Self::FramesConcealed { stream, .. } => Some(stream),
            Self::CodecFailure { stream, .. } => stream.as_ref(),
            Self::SpeechStarted | Self::SpeechEnded | Self::InputRejected { .. } => None,
        }
    }

    /// Ob das Ereignis auf Warn-Niveau geloggt werden sollte
    pub fn ist_warnung(&self) -> bool {
        matches!(
            self,
            Self::PacketsLost { .. }
                | Self::HardReset { .. }
                | Self::CodecFailure { .. }
                | Self::InputRejected { .. }
        )
    }
}
