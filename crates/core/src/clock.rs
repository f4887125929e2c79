//! Audio-Uhr als explizite Faehigkeit
//!
//! Der Playback Scheduler greift nie auf eine globale Uhr zu. Stattdessen
//! bekommt er eine `AudioClock`, die die aktuelle Zeit der Render-Uhr liefert
//! und Frames zu einem Zeitpunkt T einplant. Einmal eingeplante Frames sind
//! fire-and-forget, koennen aber pro Stream storniert werden.
//!
//! `ManualClock` ist eine virtuelle Uhr fuer deterministische Tests.

use crate::types::{AudioFrame, StreamId};

/// Ein auf der Render-Uhr eingeplanter Frame
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledFrame {
    /// Stream, zu dem der Frame gehoert
    pub stream: StreamId,
    /// Startzeitpunkt auf der Audio-Uhr in Sekunden
    pub at: f64,
    /// PCM-Daten
    pub frame: AudioFrame,
}

/// Faehigkeit der Render-Uhr
pub trait AudioClock {
    /// Aktuelle Zeit der Render-Uhr in Sekunden (monoton)
    fn current_time(&self) -> f64;

    /// Plant `frame` fuer `stream` zum Zeitpunkt `at` ein
    fn schedule(&mut self, stream: StreamId, at: f64, frame: AudioFrame);

    /// Storniert alle noch nicht gerenderten Frames eines Streams.
    /// Gibt die Anzahl stornierter Frames zurueck.
    fn cancel_stream(&mut self, stream: StreamId) -> usize;
}

/// Virtuelle Uhr: Zeit wird nur durch `advance`/`set_time` bewegt
#[derive(Debug, Default)]
pub struct ManualClock {
    now: f64,
    scheduled: Vec<ScheduledFrame>,
    cancelled: usize,
}

impl ManualClock {
    /// Erstellt eine virtuelle Uhr bei t = 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Setzt die Uhr auf einen absoluten Zeitpunkt
    pub fn set_time(&mut self, secs: f64) {
        self.now = secs;
    }

    /// Bewegt die Uhr um `secs` vorwaerts
    pub fn advance(&mut self, secs: f64) {
        self.now += secs;
    }

    /// Alle eingeplanten (noch nicht entnommenen) Frames in Einplan-Reihenfolge
    pub fn scheduled(&self) -> &[ScheduledFrame] {
        &self.scheduled
    }

    /// Eingeplante Frames eines Streams
    pub fn scheduled_for(&self, stream: StreamId) -> Vec<&ScheduledFrame> {
        self.scheduled.iter().filter(|f| f.stream == stream).collect()
    }

    /// Entnimmt alle Frames, deren Startzeit erreicht ist (simuliert Rendern)
    pub fn take_due(&mut self) -> Vec<ScheduledFrame> {
        let now = self.now;
        let (faellig, rest): (Vec<_>, Vec<_>) =
            self.scheduled.drain(..).partition(|f| f.at <= now);
        self.scheduled = rest;
        faellig
    }

    /// Gesamtzahl stornierter Frames seit Erstellung
    pub fn cancelled(&self) -> usize {
        self.cancelled
    }
}

impl AudioClock for ManualClock {
    fn current_time(&self) -> f64 {
        self.now
    }

    fn schedule(&mut self, stream: StreamId, at: f64, frame: AudioFrame) {
        self.scheduled.push(ScheduledFrame { stream, at, frame });
    }

    fn cancel_stream(&mut self, stream: StreamId) -> usize {
        let vorher = self.scheduled.len();
        self.scheduled.retain(|f| f.stream != stream);
        let storniert = vorher - self.scheduled.len();
        self.cancelled += storniert;
        storniert
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manuelle_uhr_bewegt_sich_nur_explizit() {
        let mut clock = ManualClock::new();
        assert_eq!(clock.current_time(), 0.0);
        clock.advance(0.25);
        clock.advance(0.25);
        assert!((clock.current_time() - 0.5).abs() < 1e-9);
        clock.set_time(2.0);
        assert_eq!(clock.current_time(), 2.0);
    }

    #[test]
    fn faellige_frames_entnehmen() {
        let mut clock = ManualClock::new();
        let s = StreamId::new(0, 0);
        clock.schedule(s, 0.02, AudioFrame::silence(4));
        clock.schedule(s, 0.04, AudioFrame::silence(4));
        clock.set_time(0.03);
        assert_eq!(clock.take_due().len(), 1);
        assert_eq!(clock.scheduled().len(), 1);
    }

    #[test]
    fn stornieren_betrifft_nur_einen_stream() {
        let mut clock = ManualClock::new();
        let a = StreamId::new(0, 0);
        let b = StreamId::new(1, 0);
        clock.schedule(a, 0.1, AudioFrame::silence(4));
        clock.schedule(b, 0.1, AudioFrame::silence(4));
        clock.schedule(a, 0.2, AudioFrame::silence(4));
        assert_eq!(clock.cancel_stream(a), 2);
        assert_eq!(clock.scheduled().len(), 1);
        assert_eq!(clock.scheduled()[0].stream, b);
        assert_eq!(clock.cancelled(), 2);
    }
}
