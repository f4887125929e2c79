//! murmel-audio – Audio-Kern des Clients
//!
//! - Codec-Backends (Opus, PCM16) und die Codec-Pipeline mit einem
//!   Decoder pro Remote-Stream
//! - Voice Activity Gate mit adaptiven Schwellen
//! - Sendesteuerung (Push-to-Talk, Mute, Rolle)
//! - Kalibrierung des Rauschbodens
//! - Aufnahmepfad bis zum ausgehenden Frame
//! - Render-Queue als `AudioClock` fuer den Render-Callback

pub mod calibration;
pub mod capture;
pub mod codec;
pub mod dsp;
pub mod error;
pub mod pipeline;
pub mod ptt;
pub mod render;

pub use calibration::{calibrate_from_samples, CalibrationResult};
pub use capture::{CaptureOutcome, CapturePath, CaptureStatistik};
pub use codec::{backend_erstellen, CodecBackend, FrameDecoder, FrameEncoder, OpusBackend, PcmBackend};
pub use dsp::{rms_energy, GateConfig, GateEvent, VoiceActivityGate};
pub use error::{AudioError, AudioResult};
pub use pipeline::{CodecPipeline, CodecStatistik};
pub use ptt::{PttController, PttMode};
pub use render::RenderQueue;
