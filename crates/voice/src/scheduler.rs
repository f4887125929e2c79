//! Playback Scheduler
//!
//! Leert den Packet Sequencer gegen eine monotone Audio-Uhr. Frames werden
//! um `target_delay` versetzt und hoechstens `lookahead` im Voraus
//! eingeplant; solange Pakete uebrig sind, wird kurz vor dem Ende der
//! eingeplanten Audiodaten erneut geweckt.
//!
//! ```text
//! Idle -> Scheduling -> Idle
//! Scheduling -> Stalled -> Scheduling
//! Stalled -> Reset -> Scheduling
//! ```
//!
//! Der Heartbeat prueft, ob trotz gefuelltem Buffer zu lange nichts
//! eingeplant wurde (Stall), erzwingt dann ein Neuplanen und setzt den
//! Stream nach zu vielen Stalls in Folge hart zurueck.
//!
//! Audio-Zeit kommt ausschliesslich von der `AudioClock`, Wandzeit (ms)
//! fuer Stall-Entscheidungen wird explizit uebergeben.

use murmel_core::clock::AudioClock;
use murmel_core::types::{FrameFormat, StreamId};
use tracing::{debug, trace, warn};

use crate::jitter_buffer::{Discontinuity, PacketSequencer};
use crate::plc::{PacketLossConcealer, PlcStatistik};

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Versatz neu gestarteter Wiedergabe zur aktuellen Audio-Zeit (s)
    pub target_delay_secs: f64,
    /// Maximaler Planungshorizont (s)
    pub lookahead_secs: f64,
    /// Mindestanzahl Pakete, bevor ein ruhender Stream startet
    pub min_start_packets: usize,
    /// Heartbeat-Intervall (ms)
    pub heartbeat_interval_ms: u64,
    /// Ohne Einplanung laenger als das gilt ein gefuellter Stream als haengend
    pub stall_threshold_ms: u64,
    /// Stalls in Folge bis zum harten Reset
    pub max_consecutive_stalls: u32,
    /// So lange vor dem Ende der eingeplanten Audiodaten wird geweckt (s)
    pub rearm_lead_secs: f64,
    /// Ersatz-Frames pro Verlust (0 = keine Verdeckung)
    pub conceal_max_frames: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            target_delay_secs: 0.04,
            lookahead_secs: 0.5,
            min_start_packets: 2,
            heartbeat_interval_ms: 100,
            stall_threshold_ms: 200,
            max_consecutive_stalls: 10,
            rearm_lead_secs: 0.1,
            conceal_max_frames: 3,
        }
    }
}

// ---------------------------------------------------------------------------
// Zustand und Ereignisse
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerZustand {
    Idle,
    Scheduling,
    Stalled,
    Reset,
}

/// Ereignisse eines Planungslaufs, vom Aufrufer in `AudioEvent`s uebersetzt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEreignis {
    Verlust { expected: u32, received: u32, lost: u32 },
    Reset { expected: u32, received: u32 },
    Verdeckt { frames: u32 },
    /// Die eingeplanten Audiodaten waren aufgebraucht, bevor neue kamen
    Erschoepft,
    Stall { consecutive: u32 },
    HardReset { storniert: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStatistik {
    pub frames_geplant: u64,
    pub stalls: u64,
    pub hard_resets: u64,
    pub erschoepft: u64,
}

// ---------------------------------------------------------------------------
// PlaybackScheduler
// ---------------------------------------------------------------------------

/// Wiedergabeplanung eines Remote-Streams
pub struct PlaybackScheduler {
    config: SchedulerConfig,
    frame_secs: f64,
    concealer: PacketLossConcealer,
    next_scheduled_time: Option<f64>,
    zustand: SchedulerZustand,
    last_success_ms: u64,
    consecutive_stalls: u32,
    rearm_at: Option<f64>,
    statistik: SchedulerStatistik,
}

impl PlaybackScheduler {
    pub fn neu(config: SchedulerConfig, format: FrameFormat, now_ms: u64) -> Self {
        let concealer = PacketLossConcealer::neu(config.conceal_max_frames, format.samples_per_frame());
        Self {
            config,
            frame_secs: format.frame_duration_secs(),
            concealer,
            next_scheduled_time: None,
            zustand: SchedulerZustand::Idle,
            last_success_ms: now_ms,
            consecutive_stalls: 0,
            rearm_at: None,
            statistik: SchedulerStatistik::default(),
        }
    }

    /// Neue Pakete liegen im Sequencer
    ///
    /// Ohne laufende Wiedergabe startet ein Stream erst ab
    /// `min_start_packets`. `war_leer` startet die Stall-Uhr neu, wenn der
    /// Buffer gerade erst befuellt wurde.
    pub fn bei_ankunft<C: AudioClock + ?Sized>(
        &mut self,
        stream: StreamId,
        seq: &mut PacketSequencer,
        clock: &mut C,
        war_leer: bool,
        now_ms: u64,
    ) -> Vec<SchedulerEreignis> {
        if war_leer {
            self.last_success_ms = now_ms;
        }
        let laeuft = matches!(self.next_scheduled_time, Some(t) if t >= clock.current_time());
        if !laeuft && seq.len() < self.config.min_start_packets {
            return Vec::new();
        }
        self.on_packets_available(stream, seq, clock, now_ms)
    }

    /// Re-Arm-Timer: plant weiter, wenn der Weckzeitpunkt erreicht ist
    pub fn bei_timer<C: AudioClock + ?Sized>(
        &mut self,
        stream: StreamId,
        seq: &mut PacketSequencer,
        clock: &mut C,
        now_ms: u64,
    ) -> Vec<SchedulerEreignis> {
        match self.rearm_at {
            Some(t) if clock.current_time() >= t => self.on_packets_available(stream, seq, clock, now_ms),
            _ => Vec::new(),
        }
    }

    /// Plant so viele Frames wie der Horizont erlaubt
    pub fn on_packets_available<C: AudioClock + ?Sized>(
        &mut self,
        stream: StreamId,
        seq: &mut PacketSequencer,
        clock: &mut C,
        now_ms: u64,
    ) -> Vec<SchedulerEreignis> {
        self.planen(stream, seq, clock, now_ms, false)
    }

    fn planen<C: AudioClock + ?Sized>(
        &mut self,
        stream: StreamId,
        seq: &mut PacketSequencer,
        clock: &mut C,
        now_ms: u64,
        erzwungen: bool,
    ) -> Vec<SchedulerEreignis> {
        let mut ereignisse = Vec::new();
        let jetzt = clock.current_time();
        let mut next = match self.next_scheduled_time {
            Some(t) if t >= jetzt => t,
            Some(t) => {
                self.statistik.erschoepft += 1;
                ereignisse.push(SchedulerEreignis::Erschoepft);
                debug!(%stream, rueckstand = jetzt - t, "Wiedergabe leergelaufen");
                jetzt + self.config.target_delay_secs
            }
            None => jetzt + self.config.target_delay_secs,
        };

        let horizont = jetzt + self.config.lookahead_secs;
        let mut geplant = 0u64;
        while next < horizont {
            let Some(popped) = seq.pop_next() else {
                break;
            };

            match popped.discontinuity {
                Some(Discontinuity::Loss {
                    expected,
                    received,
                    lost,
                }) => {
                    ereignisse.push(SchedulerEreignis::Verlust {
                        expected,
                        received,
                        lost,
                    });
                    let ersatz = self.concealer.verdecken(lost);
                    if !ersatz.is_empty() {
                        let frames = ersatz.len() as u32;
                        for frame in ersatz {
                            clock.schedule(stream, next, frame);
                            next += self.frame_secs;
                        }
                        ereignisse.push(SchedulerEreignis::Verdeckt { frames });
                    }
                }
                Some(Discontinuity::Reset { expected, received }) => {
                    ereignisse.push(SchedulerEreignis::Reset { expected, received });
                    self.concealer.zuruecksetzen();
                }
                None => {}
            }

            self.concealer.frame_merken(&popped.frame);
            trace!(%stream, sequence = popped.sequence, at = next, "Frame eingeplant");
            clock.schedule(stream, next, popped.frame);
            next += self.frame_secs;
            geplant += 1;
        }

        self.next_scheduled_time = Some(next);
        if geplant > 0 {
            self.statistik.frames_geplant += geplant;
            self.last_success_ms = now_ms;
            if !erzwungen {
                self.consecutive_stalls = 0;
            }
        }

        if seq.is_empty() {
            self.zustand = SchedulerZustand::Idle;
            self.rearm_at = None;
        } else {
            self.zustand = SchedulerZustand::Scheduling;
            // Zum Weckzeitpunkt muss mindestens ein Frame in den Horizont passen
            let fruehestens = next - self.config.lookahead_secs + self.frame_secs;
            let weckzeit = (next - self.config.rearm_lead_secs).max(fruehestens);
            self.rearm_at = Some(weckzeit.max(jetzt + self.frame_secs));
        }
        ereignisse
    }

    /// Periodische Pruefung auf haengende Wiedergabe
    pub fn heartbeat<C: AudioClock + ?Sized>(
        &mut self,
        stream: StreamId,
        seq: &mut PacketSequencer,
        clock: &mut C,
        now_ms: u64,
    ) -> Vec<SchedulerEreignis> {
        if seq.is_empty() {
            return Vec::new();
        }
        if now_ms.saturating_sub(self.last_success_ms) <= self.config.stall_threshold_ms {
            // Heartbeat-Planung setzt den Stall-Zaehler nicht zurueck
            return self.planen(stream, seq, clock, now_ms, true);
        }

        self.consecutive_stalls += 1;
        self.statistik.stalls += 1;
        let mut ereignisse = vec![SchedulerEreignis::Stall {
            consecutive: self.consecutive_stalls,
        }];
        warn!(
            %stream,
            consecutive = self.consecutive_stalls,
            gepuffert = seq.len(),
            "Wiedergabe haengt"
        );

        if self.consecutive_stalls >= self.config.max_consecutive_stalls {
            let storniert = self.hard_reset(stream, seq, clock, now_ms);
            ereignisse.push(SchedulerEreignis::HardReset { storniert });
            return ereignisse;
        }

        self.zustand = SchedulerZustand::Stalled;
        let jetzt = clock.current_time();
        if matches!(self.next_scheduled_time, Some(t) if t > jetzt + self.config.target_delay_secs) {
            // Horizont liegt hinter einer stehenden Uhr
            clock.cancel_stream(stream);
        }
        self.next_scheduled_time = None;
        ereignisse.extend(self.planen(stream, seq, clock, now_ms, true));
        ereignisse
    }

    fn hard_reset<C: AudioClock + ?Sized>(
        &mut self,
        stream: StreamId,
        seq: &mut PacketSequencer,
        clock: &mut C,
        now_ms: u64,
    ) -> usize {
        let storniert = clock.cancel_stream(stream);
        seq.reset();
        self.concealer.zuruecksetzen();
        self.next_scheduled_time = None;
        self.rearm_at = None;
        self.consecutive_stalls = 0;
        self.last_success_ms = now_ms;
        self.zustand = SchedulerZustand::Reset;
        self.statistik.hard_resets += 1;
        warn!(%stream, storniert, "Harter Reset der Wiedergabe");
        storniert
    }

    /// Storniert alle eingeplanten Frames (Stream wird beendet)
    pub fn stornieren<C: AudioClock + ?Sized>(&mut self, stream: StreamId, clock: &mut C) -> usize {
        self.next_scheduled_time = None;
        self.rearm_at = None;
        self.zustand = SchedulerZustand::Idle;
        clock.cancel_stream(stream)
    }

    pub fn zustand(&self) -> SchedulerZustand {
        self.zustand
    }

    pub fn next_scheduled_time(&self) -> Option<f64> {
        self.next_scheduled_time
    }

    /// Audio-Zeitpunkt, zu dem `bei_timer` wieder aufgerufen werden soll
    pub fn rearm_at(&self) -> Option<f64> {
        self.rearm_at
    }

    pub fn consecutive_stalls(&self) -> u32 {
        self.consecutive_stalls
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn statistik(&self) -> &SchedulerStatistik {
        &self.statistik
    }

    pub fn plc_statistik(&self) -> &PlcStatistik {
        self.concealer.statistik()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
