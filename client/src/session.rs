//! VoiceSession – verbindet Codec-Pipeline, Aufnahmepfad und Remote-Streams
//!
//! Die Sitzung ist single-threaded und ereignisgetrieben: eingehende Frames,
//! Aufnahme-Frames, Steuersignale, der Re-Arm-Timer und der Heartbeat
//! werden nacheinander auf demselben logischen Thread verarbeitet. Nichts
//! blockiert. Alle Fehler an der Eingangsgrenze werden abgewiesen und als
//! `AudioEvent` gemeldet, ohne andere Streams zu beeinflussen.

use std::collections::VecDeque;
use std::time::Duration;

use murmel_audio::{
    backend_erstellen, calibrate_from_samples, CalibrationResult, CapturePath, CodecPipeline,
    CodecStatistik,
};
use murmel_core::clock::AudioClock;
use murmel_core::error::{MurmelError, Result};
use murmel_core::event::{AudioEvent, CodecRichtung, RetireReason};
use murmel_core::types::{AudioFrame, FrameFormat, SequencedPacket, StreamId, StreamKey};
use murmel_observability::MurmelMetrics;
use murmel_protocol::control::{ControlSignal, ParticipantRole};
use murmel_protocol::voice::{InboundFrame, OutboundFrame};
use murmel_voice::{
    inaktive_bereinigen, PushErgebnis, RemoteStream, SchedulerEreignis, StreamConfig,
    StreamRegistry, StreamTelemetrie,
};
use tracing::{debug, info, trace, warn};

use crate::config::ClientConfig;

/// Maximale Anzahl ungelesener Ereignisse; aeltere werden verworfen
pub const MAX_EREIGNISSE: usize = 1024;

pub struct VoiceSession<C: AudioClock> {
    format: FrameFormat,
    stream_config: StreamConfig,
    idle_timeout_ms: u64,
    codec: CodecPipeline,
    capture: CapturePath,
    streams: StreamRegistry,
    clock: C,
    role: ParticipantRole,
    ereignisse: VecDeque<AudioEvent>,
    metriken: Option<MurmelMetrics>,
}

impl<C: AudioClock> VoiceSession<C> {
    /// Erstellt eine Sitzung aus einer validierten Konfiguration
    pub fn neu(config: &ClientConfig, clock: C) -> Result<Self> {
        config.validieren()?;
        let format = config.frame_format();
        let backend = backend_erstellen(config.audio.codec, format, config.opus_config())?;
        let codec = CodecPipeline::new(backend)?;

        info!(
            codec = config.audio.codec.bezeichnung(),
            sample_rate = format.sample_rate,
            frame_ms = format.frame_duration_ms,
            "Audio-Sitzung gestartet"
        );

        Ok(Self {
            format,
            stream_config: config.stream_config(),
            idle_timeout_ms: config.streams.idle_timeout_ms,
            codec,
            capture: CapturePath::new(config.gate_config(), config.vad.ptt_mode),
            streams: StreamRegistry::neu(),
            clock,
            role: ParticipantRole::Speaker,
            ereignisse: VecDeque::new(),
            metriken: None,
        })
    }

    /// Ereignisse zusaetzlich in Prometheus-Metriken erfassen
    pub fn mit_metriken(mut self, metriken: MurmelMetrics) -> Self {
        self.metriken = Some(metriken);
        self
    }

    // -----------------------------------------------------------------------
    // Empfang
    // -----------------------------------------------------------------------

    /// Verarbeitet eine rohe Netzwerknachricht
    pub fn handle_inbound(&mut self, daten: &[u8], now_ms: u64) -> Result<()> {
        match InboundFrame::decode(daten) {
            Ok(frame) => self.handle_inbound_frame(frame, now_ms),
            Err(e) => Err(self.abweisen(MurmelError::UngueltigeNachricht(e.to_string()))),
        }
    }

    /// Verarbeitet einen bereits dekodierten eingehenden Frame
    pub fn handle_inbound_frame(&mut self, frame: InboundFrame, now_ms: u64) -> Result<()> {
        let key = frame.stream_key.clone();
        if key.as_str().is_empty() {
            return Err(self.abweisen(MurmelError::UngueltigeNachricht(
                "Leerer Stream-Schluessel".into(),
            )));
        }
        let id = self.stream_anlegen(&key, now_ms)?;

        // Duplikate duerfen den Decoder-Zustand des Streams nicht veraendern
        if let Some(stream) = self.streams.get_mut(id) {
            if stream.sequencer.duplikat_verwerfen(frame.sequence) {
                stream.last_activity_ms = now_ms;
                trace!(stream = %key, sequence = frame.sequence, "Duplikat vor dem Dekodieren verworfen");
                return Ok(());
            }
        }

        let compressed = frame.compressed();
        let pcm = match self.codec.decode(id, &compressed) {
            Ok(Some(pcm)) => pcm,
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!(stream = %key, sequence = frame.sequence, fehler = %e, "Dekodierung fehlgeschlagen, setze Stille ein");
                self.melden(AudioEvent::CodecFailure {
                    stream: Some(key.clone()),
                    richtung: CodecRichtung::Decode,
                    grund: e.to_string(),
                });
                self.codec.silence()
            }
        };

        let Some(stream) = self.streams.get_mut(id) else {
            return Err(MurmelError::UnbekannterStream(key.to_string()));
        };
        stream.last_activity_ms = now_ms;
        let war_leer = stream.sequencer.is_empty();
        let paket = SequencedPacket::new(frame.sequence, frame.capture_timestamp_ms, now_ms, pcm);
        if stream.sequencer.push(paket) == PushErgebnis::Duplikat {
            trace!(stream = %key, sequence = frame.sequence, "Duplikat ignoriert");
            return Ok(());
        }
        if let Some(m) = &self.metriken {
            m.packets_received_total.inc();
        }

        let ereignisse = stream.scheduler.bei_ankunft(
            id,
            &mut stream.sequencer,
            &mut self.clock,
            war_leer,
            now_ms,
        );
        self.scheduler_ereignisse(&key, ereignisse);
        Ok(())
    }

    /// Liefert den Stream zu `key` oder legt ihn samt Decoder an
    fn stream_anlegen(&mut self, key: &StreamKey, now_ms: u64) -> Result<StreamId> {
        let config = &self.stream_config;
        let format = self.format;
        let (id, neu) = self
            .streams
            .get_or_insert_with(key, |_| RemoteStream::neu(config, format, now_ms));
        if !neu {
            return Ok(id);
        }

        if let Err(e) = self.codec.ensure_decoder(id) {
            self.streams.retire(id);
            warn!(stream = %key, fehler = %e, "Decoder konnte nicht angelegt werden");
            self.melden(AudioEvent::CodecFailure {
                stream: Some(key.clone()),
                richtung: CodecRichtung::Decode,
                grund: e.to_string(),
            });
            return Err(e.into());
        }
        info!(stream = %key, %id, "Remote-Stream angelegt");
        self.melden(AudioEvent::StreamCreated {
            stream: key.clone(),
        });
        Ok(id)
    }

    // -----------------------------------------------------------------------
    // Aufnahme
    // -----------------------------------------------------------------------

    /// Verarbeitet einen Mikrofon-Frame; liefert den zu sendenden Frame
    pub fn handle_capture(&mut self, frame: &AudioFrame, capture_timestamp_ms: u64) -> Option<OutboundFrame> {
        let outcome = self.capture.process(frame, capture_timestamp_ms, &mut self.codec);

        if let Some(flanke) = outcome.gate_event {
            debug!(?flanke, "Sprachaktivitaet");
            self.melden(flanke.into());
        }
        if let Some(fehler) = outcome.encode_fehler {
            self.melden(AudioEvent::CodecFailure {
                stream: None,
                richtung: CodecRichtung::Encode,
                grund: fehler.to_string(),
            });
        }
        if let Some(m) = &self.metriken {
            match outcome.frame {
                Some(_) => m.frames_transmitted_total.inc(),
                None => m.frames_gated_total.inc(),
            }
        }
        outcome.frame
    }

    /// Misst den Rauschboden aus einer Stille-Aufnahme und setzt ihn im Gate
    pub fn kalibrieren(&mut self, samples: &[f32]) -> Result<CalibrationResult> {
        let ergebnis = calibrate_from_samples(samples, self.format.samples_per_frame())?;
        ergebnis.auf_gate_anwenden(self.capture.gate_mut());
        info!(
            rauschboden_db = ergebnis.noise_floor_db,
            frames = ergebnis.frames_measured,
            "Rauschboden kalibriert"
        );
        Ok(ergebnis)
    }

    // -----------------------------------------------------------------------
    // Steuerung
    // -----------------------------------------------------------------------

    /// Parst und verarbeitet ein Steuersignal im JSON-Format
    pub fn handle_control_json(&mut self, text: &str) -> Result<()> {
        match ControlSignal::aus_json(text) {
            Ok(signal) => self.handle_control(signal),
            Err(e) => Err(self.abweisen(e)),
        }
    }

    /// Verarbeitet ein Steuersignal
    ///
    /// Ein unbekannter Stream-Schluessel wird abgewiesen und gemeldet.
    pub fn handle_control(&mut self, signal: ControlSignal) -> Result<()> {
        debug!(?signal, "Steuersignal");
        match signal {
            ControlSignal::Mute => self.capture.set_muted(true),
            ControlSignal::Unmute => self.capture.set_muted(false),
            ControlSignal::RoleChange { role } => {
                info!(alt = ?self.role, neu = ?role, "Rollenwechsel");
                self.role = role;
                // Wiedergabe bleibt unabhaengig von der Rolle aktiv
                self.capture.set_capture_enabled(role.darf_senden());
            }
            ControlSignal::RetireStream { stream_key } => {
                if !self.retire_stream(&stream_key, RetireReason::Angefordert) {
                    return Err(self.abweisen(MurmelError::UnbekannterStream(stream_key.to_string())));
                }
            }
        }
        Ok(())
    }

    /// Beendet einen Remote-Stream synchron
    ///
    /// Eingeplante Frames werden storniert, Decoder, Sequencer und Scheduler
    /// freigegeben. Ein spaeteres Paket mit demselben Schluessel beginnt frisch.
    pub fn retire_stream(&mut self, key: &StreamKey, reason: RetireReason) -> bool {
        let Some((id, stream)) = self.streams.retire_key(key) else {
            return false;
        };
        self.stream_freigeben(id, key.clone(), stream, reason);
        true
    }

    fn stream_freigeben(&mut self, id: StreamId, key: StreamKey, mut stream: RemoteStream, reason: RetireReason) {
        let storniert = stream.scheduler.stornieren(id, &mut self.clock);
        self.codec.clear_decoder(id);
        info!(stream = %key, %id, ?reason, storniert, "Remote-Stream beendet");
        self.melden(AudioEvent::StreamRetired { stream: key, reason });
    }

    /// Beendet alle Streams (Sitzungsende)
    pub fn beenden(&mut self) {
        for id in self.streams.ids() {
            if let Some((key, stream)) = self.streams.retire(id) {
                self.stream_freigeben(id, key, stream, RetireReason::Beendet);
            }
        }
        self.codec.clear_all_decoders();
    }

    // -----------------------------------------------------------------------
    // Timer
    // -----------------------------------------------------------------------

    /// Re-Arm-Timer: plant Streams weiter, deren Weckzeitpunkt erreicht ist
    pub fn on_timer(&mut self, now_ms: u64) {
        for id in self.streams.ids() {
            let Some(key) = self.streams.key(id).cloned() else {
                continue;
            };
            let Some(stream) = self.streams.get_mut(id) else {
                continue;
            };
            let ereignisse = stream
                .scheduler
                .bei_timer(id, &mut stream.sequencer, &mut self.clock, now_ms);
            self.scheduler_ereignisse(&key, ereignisse);
        }
    }

    /// Periodischer Heartbeat
    ///
    /// Entfernt abgelaufene Pakete, erkennt haengende Wiedergabe und gibt
    /// Streams frei, die laenger als `idle_timeout_ms` nichts empfangen haben.
    pub fn heartbeat(&mut self, now_ms: u64) {
        for id in self.streams.ids() {
            let Some(key) = self.streams.key(id).cloned() else {
                continue;
            };
            let Some(stream) = self.streams.get_mut(id) else {
                continue;
            };
            stream.sequencer.evict_expired(now_ms);
            let jitter_ms = stream.sequencer.jitter_ms();
            let ereignisse = stream
                .scheduler
                .heartbeat(id, &mut stream.sequencer, &mut self.clock, now_ms);
            if let Some(m) = &self.metriken {
                m.jitter_beobachten(jitter_ms);
            }
            self.scheduler_ereignisse(&key, ereignisse);
        }

        for (id, key, stream) in inaktive_bereinigen(&mut self.streams, now_ms, self.idle_timeout_ms) {
            self.stream_freigeben(id, key, stream, RetireReason::Inaktiv);
        }
    }

    /// Fruehester Re-Arm-Zeitpunkt aller Streams (Audio-Zeit in s)
    pub fn next_wakeup(&self) -> Option<f64> {
        self.streams
            .iter()
            .filter_map(|(_, _, s)| s.scheduler.rearm_at())
            .min_by(|a, b| a.total_cmp(b))
    }

    // -----------------------------------------------------------------------
    // Ereignisse
    // -----------------------------------------------------------------------

    fn scheduler_ereignisse(&mut self, key: &StreamKey, ereignisse: Vec<SchedulerEreignis>) {
        for ereignis in ereignisse {
            let stream = key.clone();
            let audio_event = match ereignis {
                SchedulerEreignis::Verlust {
                    expected,
                    received,
                    lost,
                } => AudioEvent::PacketsLost {
                    stream,
                    expected,
                    received,
                    lost,
                },
                SchedulerEreignis::Reset { expected, received } => AudioEvent::StreamReset {
                    stream,
                    expected,
                    received,
                },
                SchedulerEreignis::Verdeckt { frames } => AudioEvent::FramesConcealed { stream, frames },
                SchedulerEreignis::Erschoepft => AudioEvent::BufferExhausted { stream },
                SchedulerEreignis::Stall { consecutive } => AudioEvent::StallDetected { stream, consecutive },
                SchedulerEreignis::HardReset { .. } => AudioEvent::HardReset { stream },
            };
            self.melden(audio_event);
        }
    }

    /// Weist eine Eingabe ab und meldet sie
    fn abweisen(&mut self, fehler: MurmelError) -> MurmelError {
        warn!(fehler = %fehler, "Eingabe abgewiesen");
        self.melden(AudioEvent::InputRejected {
            grund: fehler.to_string(),
        });
        fehler
    }

    fn melden(&mut self, ereignis: AudioEvent) {
        if let Some(m) = &self.metriken {
            m.ereignis_erfassen(&ereignis);
        }
        if self.ereignisse.len() >= MAX_EREIGNISSE {
            self.ereignisse.pop_front();
        }
        self.ereignisse.push_back(ereignis);
    }

    /// Entnimmt alle seit dem letzten Aufruf gemeldeten Ereignisse
    pub fn drain_events(&mut self) -> Vec<AudioEvent> {
        self.ereignisse.drain(..).collect()
    }

    // -----------------------------------------------------------------------
    // Zustand
    // -----------------------------------------------------------------------

    /// Telemetrie-Snapshot aller aktiven Streams
    pub fn telemetrie(&self) -> Vec<StreamTelemetrie> {
        self.streams
            .iter()
            .map(|(_, key, stream)| StreamTelemetrie::erfassen(key, stream))
            .collect()
    }

    /// Heartbeat-Intervall des Treibers
    pub fn heartbeat_intervall(&self) -> Duration {
        Duration::from_millis(self.stream_config.scheduler.heartbeat_interval_ms)
    }

    pub fn stream_id(&self, key: &StreamKey) -> Option<StreamId> {
        self.streams.lookup(key)
    }

    pub fn stream_anzahl(&self) -> usize {
        self.streams.len()
    }

    pub fn format(&self) -> FrameFormat {
        self.format
    }

    pub fn role(&self) -> ParticipantRole {
        self.role
    }

    pub fn capture(&self) -> &CapturePath {
        &self.capture
    }

    /// Zugriff fuer Push-to-Talk-Tasten und Kalibrierung
    pub fn capture_mut(&mut self) -> &mut CapturePath {
        &mut self.capture
    }

    pub fn codec_statistik(&self) -> CodecStatistik {
        self.codec.statistik()
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use murmel_audio::PcmBackend;
    use murmel_core::clock::ManualClock;
    use murmel_protocol::codec::CodecKind;
    use murmel_protocol::voice::FrameFlags;

    fn config() -> ClientConfig {
        let mut cfg = ClientConfig::default();
        cfg.audio.codec = CodecKind::Pcm16;
        cfg.audio.sample_rate = 8_000;
        cfg
    }

    fn session() -> VoiceSession<ManualClock> {
        VoiceSession::neu(&config(), ManualClock::new()).unwrap()
    }

    /// Sender-Pipeline, die konstante Frames kodiert
    fn sender() -> CodecPipeline {
        let format = config().frame_format();
        CodecPipeline::new(Box::new(PcmBackend::new(format))).unwrap()
    }

    fn paket(sender: &mut CodecPipeline, key: &str, seq: u32, pegel: f32) -> Vec<u8> {
        let frame = AudioFrame::new(vec![pegel; sender.format().samples_per_frame()]);
        let compressed = sender.encode(&frame, seq, u64::from(seq) * 20).unwrap();
        OutboundFrame::from_compressed(compressed, 0)
            .als_eingehend(key)
            .encode()
            .unwrap()
            .to_vec()
    }

    fn pegel_geplant(s: &VoiceSession<ManualClock>, key: &str) -> Vec<f32> {
        let id = s.stream_id(&StreamKey::from(key)).unwrap();
        s.clock()
            .scheduled_for(id)
            .iter()
            .map(|f| f.frame.samples()[0])
            .collect()
    }

    #[test]
    fn empfang_wird_dekodiert_und_eingeplant() {
        let mut s = session();
        let mut tx = sender();
        s.handle_inbound(&paket(&mut tx, "alice", 0, 0.1), 0).unwrap();
        s.handle_inbound(&paket(&mut tx, "alice", 1, 0.2), 0).unwrap();

        let pegel = pegel_geplant(&s, "alice");
        assert_eq!(pegel.len(), 2);
        assert!((pegel[0] - 0.1).abs() < 1e-3);
        assert!((pegel[1] - 0.2).abs() < 1e-3);

        let events = s.drain_events();
        assert_eq!(
            events,
            vec![AudioEvent::StreamCreated {
                stream: StreamKey::from("alice")
            }]
        );
        assert!(s.drain_events().is_empty());
    }

    #[test]
    fn umsortierte_pakete_in_reihenfolge() {
        let mut s = session();
        let mut tx = sender();
        s.handle_inbound(&paket(&mut tx, "alice", 1, 0.2), 0).unwrap();
        s.handle_inbound(&paket(&mut tx, "alice", 0, 0.1), 5).unwrap();
        let pegel = pegel_geplant(&s, "alice");
        assert!((pegel[0] - 0.1).abs() < 1e-3);
        assert!((pegel[1] - 0.2).abs() < 1e-3);
    }

    #[test]
    fn verlust_wird_gemeldet_und_verdeckt() {
        let mut s = session();
        let mut tx = sender();
        for seq in [0, 1, 3] {
            s.handle_inbound(&paket(&mut tx, "alice", seq, 0.4), 0).unwrap();
        }
        let events = s.drain_events();
        assert!(events.contains(&AudioEvent::PacketsLost {
            stream: StreamKey::from("alice"),
            expected: 2,
            received: 3,
            lost: 1,
        }));
        assert!(events.contains(&AudioEvent::FramesConcealed {
            stream: StreamKey::from("alice"),
            frames: 1,
        }));
        assert_eq!(pegel_geplant(&s, "alice").len(), 4);
    }

    #[test]
    fn streams_sind_unabhaengig() {
        let mut s = session();
        let mut tx = sender();
        s.handle_inbound(&paket(&mut tx, "alice", 100, 0.1), 0).unwrap();
        s.handle_inbound(&paket(&mut tx, "bob", 7, 0.3), 0).unwrap();
        s.handle_inbound(&paket(&mut tx, "bob", 8, 0.3), 0).unwrap();
        assert_eq!(s.stream_anzahl(), 2);
        assert!(pegel_geplant(&s, "alice").is_empty());
        assert_eq!(pegel_geplant(&s, "bob").len(), 2);
    }

    #[test]
    fn kaputte_nachricht_wird_abgewiesen() {
        let mut s = session();
        let mut tx = sender();
        s.handle_inbound(&paket(&mut tx, "alice", 0, 0.1), 0).unwrap();
        s.drain_events();

        let fehler = s.handle_inbound(&[1, 2, 3], 0).unwrap_err();
        assert!(fehler.ist_abgewiesen());
        assert!(matches!(
            s.drain_events().as_slice(),
            [AudioEvent::InputRejected { .. }]
        ));

        // Anderer Stream unbeeinflusst
        s.handle_inbound(&paket(&mut tx, "alice", 1, 0.1), 0).unwrap();
        assert_eq!(pegel_geplant(&s, "alice").len(), 2);
    }

    #[test]
    fn decoder_fehler_ersetzt_durch_stille() {
        let mut s = session();
        let mut tx = sender();
        s.handle_inbound(&paket(&mut tx, "alice", 0, 0.5), 0).unwrap();
        // Ungerade Nutzdatenlaenge ist fuer PCM16 ungueltig
        let kaputt = InboundFrame::new("alice", 1, 20, vec![0u8; 3]);
        s.handle_inbound(&kaputt.encode().unwrap(), 0).unwrap();

        let pegel = pegel_geplant(&s, "alice");
        assert_eq!(pegel.len(), 2);
        assert_eq!(pegel[1], 0.0);
        assert!(s.drain_events().iter().any(|e| matches!(
            e,
            AudioEvent::CodecFailure {
                richtung: CodecRichtung::Decode,
                ..
            }
        )));
        assert_eq!(s.codec_statistik().decode_fehler, 1);
    }

    #[test]
    fn beenden_storniert_und_beginnt_frisch() {
        let mut s = session();
        let mut tx = sender();
        s.handle_inbound(&paket(&mut tx, "alice", 0, 0.1), 0).unwrap();
        s.handle_inbound(&paket(&mut tx, "alice", 1, 0.1), 0).unwrap();
        let alt = s.stream_id(&StreamKey::from("alice")).unwrap();

        s.handle_control_json(r#"{"type":"retire_stream","stream_key":"alice"}"#)
            .unwrap();
        assert!(s.clock().scheduled().is_empty());
        assert_eq!(s.clock().cancelled(), 2);
        assert_eq!(s.stream_anzahl(), 0);

        s.handle_inbound(&paket(&mut tx, "alice", 50, 0.1), 100).unwrap();
        let neu = s.stream_id(&StreamKey::from("alice")).unwrap();
        assert_ne!(alt, neu);
        let events = s.drain_events();
        assert!(events.contains(&AudioEvent::StreamRetired {
            stream: StreamKey::from("alice"),
            reason: RetireReason::Angefordert,
        }));
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, AudioEvent::StreamCreated { .. }))
                .count(),
            2
        );
    }

    #[test]
    fn unbekannter_stream_beenden_wird_abgewiesen() {
        let mut s = session();
        let mut tx = sender();
        s.handle_inbound(&paket(&mut tx, "alice", 0, 0.1), 0).unwrap();
        s.handle_inbound(&paket(&mut tx, "alice", 1, 0.1), 0).unwrap();
        s.drain_events();

        let fehler = s
            .handle_control_json(r#"{"type":"retire_stream","stream_key":"niemand"}"#)
            .unwrap_err();
        assert!(matches!(fehler, MurmelError::UnbekannterStream(ref k) if k == "niemand"));
        assert!(fehler.ist_abgewiesen());
        assert!(matches!(
            s.drain_events().as_slice(),
            [AudioEvent::InputRejected { .. }]
        ));

        // Andere Streams unbeeinflusst
        assert_eq!(s.stream_anzahl(), 1);
        assert_eq!(pegel_geplant(&s, "alice").len(), 2);
        assert!(s
            .handle_control(ControlSignal::RetireStream {
                stream_key: StreamKey::from("niemand"),
            })
            .is_err());
        s.handle_inbound(&paket(&mut tx, "alice", 2, 0.1), 0).unwrap();
        assert_eq!(pegel_geplant(&s, "alice").len(), 3);
    }

    #[test]
    fn duplikat_erreicht_den_decoder_nicht() {
        let mut s = session();
        let mut tx = sender();
        let erstes = paket(&mut tx, "alice", 0, 0.1);
        s.handle_inbound(&erstes, 0).unwrap();
        s.handle_inbound(&erstes, 5).unwrap();
        assert_eq!(s.codec_statistik().frames_dekodiert, 1);

        s.handle_inbound(&paket(&mut tx, "alice", 1, 0.1), 10).unwrap();
        assert_eq!(pegel_geplant(&s, "alice").len(), 2);

        // Verspaetete Wiederholung nach der Wiedergabe
        s.handle_inbound(&erstes, 20).unwrap();
        assert_eq!(s.codec_statistik().frames_dekodiert, 2);
        assert_eq!(pegel_geplant(&s, "alice").len(), 2);
        let t = s.telemetrie();
        assert_eq!(t[0].duplikate, 2);
    }

    #[test]
    fn kaputtes_steuersignal_wird_abgewiesen() {
        let mut s = session();
        assert!(s.handle_control_json(r#"{"type":"lauter"}"#).is_err());
        assert!(s.handle_control_json("kein json").is_err());
        let events = s.drain_events();
        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .all(|e| matches!(e, AudioEvent::InputRejected { .. })));
    }

    #[test]
    fn aufnahme_sendet_mit_startflag() {
        let mut s = session();
        let laut = AudioFrame::new(vec![0.3; s.format().samples_per_frame()]);
        let frame = s.handle_capture(&laut, 0).unwrap();
        assert!(frame.hat_flag(FrameFlags::SPEAKING_START));
        assert_eq!(frame.sequence, 0);
        assert_eq!(s.drain_events(), vec![AudioEvent::SpeechStarted]);

        let frame = s.handle_capture(&laut, 20).unwrap();
        assert_eq!(frame.sequence, 1);
        assert_eq!(frame.flags, 0);
    }

    #[test]
    fn stummgeschaltet_wird_nichts_gesendet() {
        let mut s = session();
        let laut = AudioFrame::new(vec![0.3; s.format().samples_per_frame()]);
        s.handle_control_json(r#"{"type":"mute"}"#).unwrap();
        assert!(s.handle_capture(&laut, 0).is_none());
        s.handle_control(ControlSignal::Unmute).unwrap();
        assert!(s.handle_capture(&laut, 20).is_some());
    }

    #[test]
    fn zuhoerer_empfaengt_weiter() {
        let mut s = session();
        let mut tx = sender();
        s.handle_control(ControlSignal::RoleChange {
            role: ParticipantRole::Listener,
        })
        .unwrap();
        let laut = AudioFrame::new(vec![0.3; s.format().samples_per_frame()]);
        assert!(s.handle_capture(&laut, 0).is_none());

        s.handle_inbound(&paket(&mut tx, "alice", 0, 0.1), 0).unwrap();
        s.handle_inbound(&paket(&mut tx, "alice", 1, 0.1), 0).unwrap();
        assert_eq!(pegel_geplant(&s, "alice").len(), 2);
        assert_eq!(s.role(), ParticipantRole::Listener);
    }

    #[test]
    fn falsche_framelaenge_wird_als_stille_gesendet() {
        let mut s = session();
        let laut = AudioFrame::new(vec![0.3; 7]);
        s.handle_capture(&AudioFrame::new(vec![0.3; 160]), 0);
        s.drain_events();
        let frame = s.handle_capture(&laut, 20).unwrap();
        assert_eq!(frame.payload.len(), 320);
        assert!(s.drain_events().iter().any(|e| matches!(
            e,
            AudioEvent::CodecFailure {
                stream: None,
                richtung: CodecRichtung::Encode,
                ..
            }
        )));
    }

    #[test]
    fn kalibrierung_setzt_rauschboden_des_gates() {
        let mut s = session();
        let ergebnis = s.kalibrieren(&vec![0.004f32; 160 * 10]).unwrap();
        assert_eq!(ergebnis.frames_measured, 10);
        assert!((s.capture().gate().noise_floor() - 0.004).abs() < 1e-5);

        let fehler = s.kalibrieren(&[0.004f32; 20]).unwrap_err();
        assert!(matches!(fehler, MurmelError::Konfiguration(_)));
    }

    #[test]
    fn heartbeat_gibt_inaktive_streams_frei() {
        let mut s = session();
        let mut tx = sender();
        s.handle_inbound(&paket(&mut tx, "alice", 0, 0.1), 0).unwrap();
        s.heartbeat(10_000);
        assert_eq!(s.stream_anzahl(), 1);
        s.heartbeat(30_001);
        assert_eq!(s.stream_anzahl(), 0);
        assert!(s.drain_events().contains(&AudioEvent::StreamRetired {
            stream: StreamKey::from("alice"),
            reason: RetireReason::Inaktiv,
        }));
    }

    #[test]
    fn heartbeat_plant_einzelpaket_nach_stall() {
        let mut s = session();
        let mut tx = sender();
        s.handle_inbound(&paket(&mut tx, "alice", 0, 0.1), 0).unwrap();
        assert!(pegel_geplant(&s, "alice").is_empty());
        s.heartbeat(250);
        assert_eq!(pegel_geplant(&s, "alice").len(), 1);
        assert!(s.drain_events().contains(&AudioEvent::StallDetected {
            stream: StreamKey::from("alice"),
            consecutive: 1,
        }));
    }

    #[test]
    fn timer_plant_weiter_und_weckzeit() {
        let mut s = session();
        let mut tx = sender();
        assert_eq!(s.next_wakeup(), None);
        for seq in 0..40 {
            s.handle_inbound(&paket(&mut tx, "alice", seq, 0.1), 0).unwrap();
        }
        let vorher = pegel_geplant(&s, "alice").len();
        assert!(vorher < 40);
        let weckzeit = s.next_wakeup().unwrap();

        s.clock_mut().set_time(weckzeit);
        s.on_timer((weckzeit * 1000.0) as u64);
        assert!(pegel_geplant(&s, "alice").len() > vorher);
    }

    #[test]
    fn telemetrie_pro_stream() {
        let mut s = session();
        let mut tx = sender();
        for seq in [0, 1, 3] {
            s.handle_inbound(&paket(&mut tx, "alice", seq, 0.1), 0).unwrap();
        }
        let t = s.telemetrie();
        assert_eq!(t.len(), 1);
        assert_eq!(t[0].key, StreamKey::from("alice"));
        assert_eq!(t[0].verloren, 1);
    }

    #[test]
    fn metriken_werden_erfasst() {
        let metriken = MurmelMetrics::neu().unwrap();
        let mut s = session().mit_metriken(metriken.clone());
        let mut tx = sender();
        s.handle_inbound(&paket(&mut tx, "alice", 0, 0.1), 0).unwrap();
        s.handle_inbound(&paket(&mut tx, "alice", 0, 0.1), 0).unwrap();
        assert_eq!(metriken.packets_received_total.get(), 1);
        assert_eq!(metriken.active_streams.get(), 1);
        s.beenden();
        assert_eq!(metriken.active_streams.get(), 0);
    }

    #[test]
    fn ereignis_puffer_ist_begrenzt() {
        let mut s = session();
        for _ in 0..MAX_EREIGNISSE + 10 {
            let _ = s.handle_inbound(&[], 0);
        }
        assert_eq!(s.drain_events().len(), MAX_EREIGNISSE);
    }
}
