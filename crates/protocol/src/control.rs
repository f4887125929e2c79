//! Steuersignale des Signaling-Kollaborateurs
//!
//! Der Kollaborateur (Anruf-Signaling, Rollenverwaltung) schickt Signale
//! als JSON mit `type`-Tag. Unbekannte oder fehlerhafte Signale werden an
//! der Grenze abgewiesen, ohne laufende Streams zu beeinflussen.

use murmel_core::error::{MurmelError, Result};
use murmel_core::types::StreamKey;
use serde::{Deserialize, Serialize};

/// Rolle des lokalen Teilnehmers
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    /// Darf senden und empfangen
    #[default]
    Speaker,
    /// Nur Wiedergabe, Aufnahmeseite abgeschaltet
    Listener,
}

impl ParticipantRole {
    /// Ob die Aufnahmeseite aktiv sein darf
    pub fn darf_senden(&self) -> bool {
        matches!(self, ParticipantRole::Speaker)
    }
}

/// Steuersignal an die Audio-Sitzung
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlSignal {
    /// Mikrofon stummschalten
    Mute,
    /// Stummschaltung aufheben
    Unmute,
    /// Rollenwechsel (Wiedergabe bleibt immer aktiv)
    RoleChange { role: ParticipantRole },
    /// Remote-Stream beenden (Teilnehmer hat verlassen o.ae.)
    RetireStream { stream_key: StreamKey },
}

impl ControlSignal {
    /// Parst ein Signal aus JSON
    ///
    /// Leere Stream-Schluessel werden als ungueltig abgewiesen.
    pub fn aus_json(text: &str) -> Result<Self> {
        let signal: ControlSignal = serde_json::from_str(text)
            .map_err(|e| MurmelError::UngueltigeNachricht(format!("Steuersignal: {}", e)))?;
        if let ControlSignal::RetireStream { stream_key } = &signal {
            if stream_key.as_str().is_empty() {
                return Err(MurmelError::UngueltigeNachricht(
                    "Leerer Stream-Schluessel".into(),
                ));
            }
        }
        Ok(signal)
    }

    /// Serialisiert das Signal als JSON
    pub fn als_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| MurmelError::Intern(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mute_parsen() {
        assert_eq!(
            ControlSignal::aus_json(r#"{"type":"mute"}"#).unwrap(),
            ControlSignal::Mute
        );
    }

    #[test]
    fn rollenwechsel_parsen() {
        let signal = ControlSignal::aus_json(r#"{"type":"role_change","role":"listener"}"#).unwrap();
        assert_eq!(
            signal,
            ControlSignal::RoleChange {
                role: ParticipantRole::Listener
            }
        );
        assert!(!ParticipantRole::Listener.darf_senden());
    }

    #[test]
    fn retire_stream_hin_und_zurueck() {
        let signal = ControlSignal::RetireStream {
            stream_key: StreamKey::from("bob"),
        };
        let json = signal.als_json().unwrap();
        assert!(json.contains("retire_stream"));
        assert_eq!(ControlSignal::aus_json(&json).unwrap(), signal);
    }

    #[test]
    fn fehlerhafte_signale_abgewiesen() {
        for text in [
            "",
            "{}",
            r#"{"type":"explode"}"#,
            r#"{"type":"role_change","role":"admin"}"#,
            r#"{"type":"retire_stream","stream_key":""}"#,
        ] {
            let err = ControlSignal::aus_json(text).unwrap_err();
            assert!(err.ist_abgewiesen(), "{} haette abgewiesen werden muessen", text);
        }
    }
}
