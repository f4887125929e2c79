//! murmel-voice – Empfangspfad fuer Remote-Streams
//!
//! ## Module
//! - [`jitter_buffer`] – Packet Sequencer (Reihenfolge, Verlust, Reset)
//! - [`plc`] – Packet Loss Concealment
//! - [`scheduler`] – Playback Scheduler gegen die Audio-Uhr
//! - [`registry`] – Arena der Remote-Streams mit Generationen
//! - [`telemetry`] – Qualitaets-Snapshots pro Stream

pub mod jitter_buffer;
pub mod plc;
pub mod registry;
pub mod scheduler;
pub mod telemetry;

pub use jitter_buffer::{
    Discontinuity, PacketSequencer, PoppedFrame, PushErgebnis, SequencerConfig, SequencerStatistik,
};
pub use plc::{PacketLossConcealer, PlcStatistik};
pub use registry::{inaktive_bereinigen, RemoteStream, StreamArena, StreamConfig, StreamRegistry};
pub use scheduler::{
    PlaybackScheduler, SchedulerConfig, SchedulerEreignis, SchedulerStatistik, SchedulerZustand,
};
pub use telemetry::StreamTelemetrie;
