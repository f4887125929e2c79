//! murmel-core – Gemeinsame Typen, Audio-Uhr und Fehlertypen
//!
//! Dieses Crate stellt die Wertetypen bereit, ueber die die vier
//! Audio-Komponenten (Codec-Pipeline, Voice Activity Gate, Jitter Buffer,
//! Playback Scheduler) miteinander verbunden werden.

pub mod clock;
pub mod error;
pub mod event;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use clock::{AudioClock, ManualClock, ScheduledFrame};
pub use error::{MurmelError, Result};
pub use event::{AudioEvent, CodecRichtung, RetireReason};
pub use types::{AudioFrame, CompressedFrame, FrameFormat, SequencedPacket, StreamId, StreamKey};
