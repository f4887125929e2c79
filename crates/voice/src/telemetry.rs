//! Stream-Telemetrie – Qualitaets-Snapshot pro Remote-Stream
//!
//! Fasst Sequencer-, Scheduler- und PLC-Zaehler zu einem Snapshot
//! zusammen, der von der Session abgefragt und geloggt wird.

use murmel_core::types::StreamKey;

use crate::registry::RemoteStream;
use crate::scheduler::SchedulerZustand;

/// Telemetrie-Snapshot eines Remote-Streams
#[derive(Debug, Clone, PartialEq)]
pub struct StreamTelemetrie {
    pub key: StreamKey,
    pub zustand: SchedulerZustand,
    /// Gepufferte Pakete
    pub fuellstand: usize,
    pub empfangen: u64,
    pub abgespielt: u64,
    pub verloren: u64,
    /// Verlorene im Verhaeltnis zu erwarteten Paketen (0.0–1.0)
    pub verlust_rate: f64,
    pub resets: u64,
    pub duplikate: u64,
    /// Standardabweichung der Transitzeit in ms
    pub jitter_ms: f64,
    pub stalls: u64,
    pub hard_resets: u64,
    /// Eingefuegte Ersatz-Frames
    pub verdeckt: u64,
}

impl StreamTelemetrie {
    pub fn erfassen(key: &StreamKey, stream: &RemoteStream) -> Self {
        let seq = stream.sequencer.statistik();
        let sched = stream.scheduler.statistik();
        let erwartet = seq.abgespielt + seq.verloren;
        let verlust_rate = if erwartet > 0 {
            seq.verloren as f64 / erwartet as f64
        } else {
            0.0
        };

        Self {
            key: key.clone(),
            zustand: stream.scheduler.zustand(),
            fuellstand: stream.sequencer.len(),
            empfangen: seq.empfangen,
            abgespielt: seq.abgespielt,
            verloren: seq.verloren,
            verlust_rate,
            resets: seq.resets,
            duplikate: seq.duplikate,
            jitter_ms: seq.jitter_ms,
            stalls: sched.stalls,
            hard_resets: sched.hard_resets,
            verdeckt: stream.scheduler.plc_statistik().gesamt(),
        }
    }

    /// Gibt eine lesbare Zusammenfassung zurueck
    pub fn zusammenfassung(&self) -> String {
        format!(
            "Stream {}: {:?} Buffer={} Loss={:.1}% Jitter={:.1}ms Resets={} Stalls={} HardResets={} PLC={}",
            self.key,
            self.zustand,
            self.fuellstand,
            self.verlust_rate * 100.0,
            self.jitter_ms,
            self.resets,
            self.stalls,
            self.hard_resets,
            self.verdeckt,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StreamConfig;
    use murmel_core::clock::ManualClock;
    use murmel_core::types::{AudioFrame, FrameFormat, SequencedPacket, StreamId};

    #[test]
    fn verlust_rate_aus_sequencer() {
        let mut stream = RemoteStream::neu(&StreamConfig::default(), FrameFormat::new(1000, 20), 0);
        let mut clock = ManualClock::new();
        let id = StreamId::new(0, 0);
        for seq in [0u32, 1, 3, 4] {
            stream
                .sequencer
                .push(SequencedPacket::new(seq, 0, 0, AudioFrame::silence(20)));
        }
        stream
            .scheduler
            .on_packets_available(id, &mut stream.sequencer, &mut clock, 0);

        let t = StreamTelemetrie::erfassen(&StreamKey::from("alice"), &stream);
        assert_eq!(t.empfangen, 4);
        assert_eq!(t.abgespielt, 4);
        assert_eq!(t.verloren, 1);
        assert!((t.verlust_rate - 0.2).abs() < 1e-9);
        assert_eq!(t.verdeckt, 1);
        assert!(t.zusammenfassung().contains("Loss=20.0%"));
    }
}
