//! Aufnahmepfad: Pegel -> Gate -> Sendesteuerung -> Encoder
//!
//! Nur tatsaechlich gesendete Frames erhoehen die ausgehende
//! Sequenznummer. Die Flanken einer Sprechsequenz werden ueber die
//! Frame-Flags markiert; endet eine Sequenz regulaer (Gate, Taste), geht
//! noch ein Abschluss-Frame mit `SPEAKING_STOP` raus. Mute und Rollenwechsel
//! beenden ohne weiteren Frame.

use murmel_core::types::AudioFrame;
use murmel_protocol::voice::{FrameFlags, OutboundFrame};
use tracing::{trace, warn};

use crate::dsp::vad::{rms_energy, GateConfig, GateEvent, VoiceActivityGate};
use crate::error::AudioError;
use crate::pipeline::CodecPipeline;
use crate::ptt::{PttController, PttMode};

/// Zaehler des Aufnahmepfads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStatistik {
    pub frames_gesendet: u64,
    pub frames_unterdrueckt: u64,
    pub encode_fehler: u64,
}

/// Ergebnis eines verarbeiteten Aufnahme-Frames
#[derive(Debug, Default)]
pub struct CaptureOutcome {
    /// Zu sendender Frame (falls gesendet wird)
    pub frame: Option<OutboundFrame>,
    /// Flanke des Gates in diesem Frame
    pub gate_event: Option<GateEvent>,
    /// Encoder-Fehler (der Frame wurde durch Stille ersetzt)
    pub encode_fehler: Option<AudioError>,
}

pub struct CapturePath {
    gate: VoiceActivityGate,
    ptt: PttController,
    next_sequence: u32,
    was_transmitting: bool,
    stats: CaptureStatistik,
}

impl CapturePath {
    pub fn new(gate_config: GateConfig, mode: PttMode) -> Self {
        Self {
            gate: VoiceActivityGate::new(gate_config),
            ptt: PttController::new(mode),
            next_sequence: 0,
            was_transmitting: false,
            stats: CaptureStatistik::default(),
        }
    }

    /// Verarbeitet einen Mikrofon-Frame
    pub fn process(
        &mut self,
        frame: &AudioFrame,
        capture_timestamp_ms: u64,
        codec: &mut CodecPipeline,
    ) -> CaptureOutcome {
        let gate_event = self.gate.update_level(rms_energy(frame.samples()));
        self.ptt.set_vad_active(self.gate.is_transmitting());

        let sending = self.ptt.is_transmitting();
        let flags = match (self.was_transmitting, sending) {
            (false, true) => FrameFlags::SPEAKING_START,
            (true, false) if self.ptt.sendeberechtigt() => FrameFlags::SPEAKING_STOP,
            (true, false) | (false, false) => {
                self.was_transmitting = false;
                self.stats.frames_unterdrueckt += 1;
                return CaptureOutcome {
                    gate_event,
                    ..CaptureOutcome::default()
                };
            }
            (true, true) => 0,
        };
        self.was_transmitting = sending;

        let sequence = self.next_sequence;
        let (compressed, encode_fehler) = match codec.encode(frame, sequence, capture_timestamp_ms) {
            Ok(c) => (Some(c), None),
            Err(e) => {
                self.stats.encode_fehler += 1;
                warn!(sequence, fehler = %e, "Encoding fehlgeschlagen, sende Stille");
                let stille = codec.silence();
                (codec.encode(&stille, sequence, capture_timestamp_ms).ok(), Some(e))
            }
        };

        let frame = compressed.map(|c| {
            self.next_sequence = self.next_sequence.wrapping_add(1);
            self.stats.frames_gesendet += 1;
            trace!(sequence, flags, bytes = c.payload.len(), "Frame gesendet");
            OutboundFrame::from_compressed(c, flags)
        });

        CaptureOutcome {
            frame,
            gate_event,
            encode_fehler,
        }
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.ptt.set_muted(muted);
    }

    pub fn set_capture_enabled(&mut self, enabled: bool) {
        self.ptt.set_capture_enabled(enabled);
    }

    pub fn gate(&self) -> &VoiceActivityGate {
        &self.gate
    }

    pub fn gate_mut(&mut self) -> &mut VoiceActivityGate {
        &mut self.gate
    }

    pub fn ptt(&self) -> &PttController {
        &self.ptt
    }

    pub fn ptt_mut(&mut self) -> &mut PttController {
        &mut self.ptt
    }

    pub fn is_transmitting(&self) -> bool {
        self.was_transmitting
    }

    pub fn next_sequence(&self) -> u32 {
        self.next_sequence
    }

    pub fn statistik(&self) -> CaptureStatistik {
        self.stats
    }
}
