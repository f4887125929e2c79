//! Prometheus-kompatible Metriken fuer Murmel
//!
//! Registrierte Metriken:
//! - `murmel_packets_received_total` – Counter: Empfangene Voice-Pakete
//! - `murmel_packets_lost_total` – Counter: Als verloren gemeldete Pakete
//! - `murmel_stream_resets_total` – Counter: Sequenz-Resets der Gegenseite
//! - `murmel_buffer_exhausted_total` – Counter: Leergelaufene Wiedergabe
//! - `murmel_stalls_total` – Counter: Erkannte Stalls
//! - `murmel_hard_resets_total` – Counter: Harte Resets
//! - `murmel_codec_failures_total` – Counter: Codec-Fehler (richtung)
//! - `murmel_frames_transmitted_total` – Counter: Gesendete Frames
//! - `murmel_frames_gated_total` – Counter: Vom Gate unterdrueckte Frames
//! - `murmel_frames_concealed_total` – Counter: Ersatz-Frames (PLC)
//! - `murmel_inputs_rejected_total` – Counter: Abgewiesene Eingaben
//! - `murmel_active_streams` – Gauge: Aktive Remote-Streams
//! - `murmel_transit_jitter_seconds` – Histogram: Jitter der Transitzeit

use anyhow::Result;
use murmel_core::event::{AudioEvent, CodecRichtung};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Alle Murmel-Prometheus-Metriken
#[derive(Clone)]
pub struct MurmelMetrics {
    pub registry: Arc<Registry>,

    // Empfang
    pub packets_received_total: IntCounter,
    pub packets_lost_total: IntCounter,
    pub stream_resets_total: IntCounter,
    pub buffer_exhausted_total: IntCounter,
    pub stalls_total: IntCounter,
    pub hard_resets_total: IntCounter,
    pub frames_concealed_total: IntCounter,
    pub active_streams: IntGauge,
    pub transit_jitter_seconds: Histogram,

    // Senden
    pub frames_transmitted_total: IntCounter,
    pub frames_gated_total: IntCounter,

    // Fehler
    pub codec_failures_total: IntCounterVec,
    pub inputs_rejected_total: IntCounter,
}

fn zaehler(registry: &Registry, name: &str, hilfe: &str) -> Result<IntCounter> {
    let counter = IntCounter::with_opts(Opts::new(name, hilfe))?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

impl MurmelMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        // --- Empfang ---
        let packets_received_total = zaehler(
            &registry,
            "murmel_packets_received_total",
            "Gesamtanzahl empfangener Voice-Pakete",
        )?;
        let packets_lost_total = zaehler(
            &registry,
            "murmel_packets_lost_total",
            "Als verloren gemeldete Voice-Pakete",
        )?;
        let stream_resets_total = zaehler(
            &registry,
            "murmel_stream_resets_total",
            "Sequenzspruenge groesser als die maximale Luecke",
        )?;
        let buffer_exhausted_total = zaehler(
            &registry,
            "murmel_buffer_exhausted_total",
            "Wiedergabe leergelaufen, bevor neue Pakete kamen",
        )?;
        let stalls_total = zaehler(
            &registry,
            "murmel_stalls_total",
            "Heartbeat: gefuellter Buffer ohne Einplanung",
        )?;
        let hard_resets_total = zaehler(
            &registry,
            "murmel_hard_resets_total",
            "Harte Resets nach zu vielen Stalls in Folge",
        )?;
        let frames_concealed_total = zaehler(
            &registry,
            "murmel_frames_concealed_total",
            "Eingefuegte Ersatz-Frames fuer verlorene Pakete",
        )?;

        let active_streams = IntGauge::with_opts(Opts::new(
            "murmel_active_streams",
            "Anzahl aktiver Remote-Streams",
        ))?;
        registry.register(Box::new(active_streams.clone()))?;

        let transit_jitter_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "murmel_transit_jitter_seconds",
                "Jitter der Transitzeit in Sekunden",
            )
            .buckets(vec![0.001, 0.002, 0.005, 0.01, 0.02, 0.05, 0.1, 0.25]),
        )?;
        registry.register(Box::new(transit_jitter_seconds.clone()))?;

        // --- Senden ---
        let frames_transmitted_total = zaehler(
            &registry,
            "murmel_frames_transmitted_total",
            "Gesendete Voice-Frames",
        )?;
        let frames_gated_total = zaehler(
            &registry,
            "murmel_frames_gated_total",
            "Vom Voice Activity Gate unterdrueckte Frames",
        )?;

        // --- Fehler ---
        let codec_failures_total = IntCounterVec::new(
            Opts::new("murmel_codec_failures_total", "Codec-Fehler, durch Stille ersetzt"),
            &["richtung"],
        )?;
        registry.register(Box::new(codec_failures_total.clone()))?;

        let inputs_rejected_total = zaehler(
            &registry,
            "murmel_inputs_rejected_total",
            "An der Eingangsgrenze abgewiesene Nachrichten",
        )?;

        Ok(Self {
            registry: Arc::new(registry),
            packets_received_total,
            packets_lost_total,
            stream_resets_total,
            buffer_exhausted_total,
            stalls_total,
            hard_resets_total,
            frames_concealed_total,
            active_streams,
            transit_jitter_seconds,
            frames_transmitted_total,
            frames_gated_total,
            codec_failures_total,
            inputs_rejected_total,
        })
    }

    /// Bildet ein Audio-Ereignis auf die passenden Metriken ab
    pub fn ereignis_erfassen(&self, ereignis: &AudioEvent) {
        match ereignis {
            AudioEvent::SpeechStarted | AudioEvent::SpeechEnded => {}
            AudioEvent::StreamCreated { .. } => self.active_streams.inc(),
            AudioEvent::StreamRetired { .. } => self.active_streams.dec(),
            AudioEvent::PacketsLost { lost, .. } => self.packets_lost_total.inc_by(u64::from(*lost)),
            AudioEvent::StreamReset { .. } => self.stream_resets_total.inc(),
            AudioEvent::BufferExhausted { .. } => self.buffer_exhausted_total.inc(),
            AudioEvent::StallDetected { .. } => self.stalls_total.inc(),
            AudioEvent::HardReset { .. } => self.hard_resets_total.inc(),
            AudioEvent::FramesConcealed { frames, .. } => {
                self.frames_concealed_total.inc_by(u64::from(*frames))
            }
            AudioEvent::CodecFailure { richtung, .. } => {
                let label = match richtung {
                    CodecRichtung::Encode => "encode",
                    CodecRichtung::Decode => "decode",
                };
                self.codec_failures_total.with_label_values(&[label]).inc();
            }
            AudioEvent::InputRejected { .. } => self.inputs_rejected_total.inc(),
        }
    }

    /// Jitter-Messung in Millisekunden
    pub fn jitter_beobachten(&self, jitter_ms: f64) {
        if jitter_ms.is_finite() && jitter_ms >= 0.0 {
            self.transit_jitter_seconds.observe(jitter_ms / 1000.0);
        }
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
