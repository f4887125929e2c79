//! Fehlertypen fuer murmel
//!
//! Zentraler Fehler-Enum fuer Fehler, die an der Grenze zum externen
//! Kollaborateur (Signaling, Netzwerk, Konfiguration) sichtbar werden.
//! Transiente Codec-Fehler werden intern durch Stille ersetzt und tauchen
//! hier nur auf, wenn ein Aufrufer sie explizit weiterreicht.

use thiserror::Error;

/// Globaler Result-Alias fuer murmel
pub type Result<T> = std::result::Result<T, MurmelError>;

/// Alle Fehler, die den Audio-Kern verlassen koennen
#[derive(Debug, Error)]
pub enum MurmelError {
    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    // --- Protokoll / Steuerung ---
    #[error("Ungueltige Nachricht: {0}")]
    UngueltigeNachricht(String),

    #[error("Unbekannter Stream: {0}")]
    UnbekannterStream(String),

    // --- Audio ---
    #[error("Codec-Fehler: {0}")]
    Codec(String),

    // --- Intern ---
    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl MurmelError {
    /// Erstellt einen internen Fehler aus einer beliebigen Nachricht
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Gibt true zurueck wenn der Fehler nur einen einzelnen Frame betrifft
    /// und die Sitzung normal weiterlaufen kann
    pub fn ist_transient(&self) -> bool {
        matches!(self, Self::Codec(_))
    }

    /// Gibt true zurueck wenn der Fehler an der Eingangsgrenze abgewiesen wurde
    pub fn ist_abgewiesen(&self) -> bool {
        matches!(
            self,
            Self::UngueltigeNachricht(_) | Self::UnbekannterStream(_) | Self::Konfiguration(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let e = MurmelError::UnbekannterStream("mix:lobby".into());
        assert_eq!(e.to_string(), "Unbekannter Stream: mix:lobby");
    }

    #[test]
    fn transient_erkennung() {
        assert!(MurmelError::Codec("kaputt".into()).ist_transient());
        assert!(!MurmelError::Konfiguration("x".into()).ist_transient());
    }

    #[test]
    fn abgewiesen_erkennung() {
        assert!(MurmelError::UnbekannterStream("x".into()).ist_abgewiesen());
        assert!(MurmelError::UngueltigeNachricht("x".into()).ist_abgewiesen());
        assert!(!MurmelError::intern("x").ist_abgewiesen());
    }
}
