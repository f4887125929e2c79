//! murmel-protocol – Nachrichtenformate
//!
//! Dieses Crate definiert die Binaerformate fuer eingehende und ausgehende
//! Audio-Frames, die Steuersignale des Signaling-Kollaborateurs und die
//! Codec-Konfiguration.

pub mod codec;
pub mod control;
pub mod voice;

pub use codec::{format_validieren, AudioPreset, CodecKind, OpusApplication, OpusConfig};
pub use control::{ControlSignal, ParticipantRole};
pub use voice::{FrameFlags, InboundFrame, OutboundFrame};
