//! Signalanalyse der Aufnahmeseite
//!
//! Pegelmessung und das Voice Activity Gate. Nichts hier veraendert
//! Samples; die Module liefern nur Entscheidungen.

pub mod vad;

pub use vad::{rms_energy, GateConfig, GateEvent, VoiceActivityGate};
