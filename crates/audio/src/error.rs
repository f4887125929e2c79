//! Fehlertypen fuer den Audio-Kern

use murmel_core::error::MurmelError;
use murmel_core::types::StreamId;
use thiserror::Error;

/// Alle moeglichen Fehler des Audio-Kerns
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Codec-Fehler: {0}")]
    CodecFehler(String),

    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    #[error("Falsche Frame-Laenge: erwartet {erwartet} Samples, erhalten {erhalten}")]
    FrameLaenge { erwartet: usize, erhalten: usize },

    #[error("Kein Decoder fuer {0} vorhanden")]
    DecoderFehlt(StreamId),

    #[error("Kalibrierungs-Timeout")]
    KalibrierungsTimeout,
}

impl AudioError {
    /// Codec-Fehler sind voruebergehend und werden mit Stille ueberbrueckt
    pub fn ist_transient(&self) -> bool {
        matches!(
            self,
            Self::CodecFehler(_) | Self::FrameLaenge { .. } | Self::DecoderFehlt(_)
        )
    }
}

impl From<AudioError> for MurmelError {
    fn from(err: AudioError) -> Self {
        match err {
            AudioError::Konfiguration(msg) => MurmelError::Konfiguration(msg),
            AudioError::DecoderFehlt(id) => MurmelError::UnbekannterStream(id.to_string()),
            other => MurmelError::Codec(other.to_string()),
        }
    }
}

pub type AudioResult<T> = Result<T, AudioError>;
