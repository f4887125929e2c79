//! Render-Queue: `AudioClock` fuer einen echten Render-Callback
//!
//! Der Scheduler plant Frames auf Audio-Zeitpunkte ein, der Render-Callback
//! des Ausgabegeraets zieht in fester Taktung Samples heraus. Die Uhr ist
//! die Anzahl bereits gerenderter Samples. Alle Streams werden gemischt;
//! Frames, deren Zeit komplett vorbei ist, werden verworfen.
//!
//! Die Queue ist der einzige Zustand, den die Sitzung mit einem anderen
//! Thread teilt.

use std::sync::Arc;

use murmel_core::clock::{AudioClock, ScheduledFrame};
use murmel_core::types::{AudioFrame, StreamId};
use parking_lot::Mutex;
use tracing::trace;

struct RenderInner {
    sample_rate: u32,
    /// Bereits gerenderte Samples
    position: u64,
    pending: Vec<ScheduledFrame>,
    verworfen: u64,
}

/// Gemeinsam genutzte Render-Queue
#[derive(Clone)]
pub struct RenderQueue {
    inner: Arc<Mutex<RenderInner>>,
}

impl RenderQueue {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RenderInner {
                sample_rate: sample_rate.max(1),
                position: 0,
                pending: Vec::new(),
                verworfen: 0,
            })),
        }
    }

    /// Fuellt `out` mit dem Mix aller faelligen Frames und rueckt die Uhr vor
    pub fn render(&self, out: &mut [f32]) {
        out.fill(0.0);
        let mut inner = self.inner.lock();
        let rate = f64::from(inner.sample_rate);
        let start = inner.position as i64;
        let ende = start + out.len() as i64;
        let mut verworfen = 0u64;

        inner.pending.retain(|geplant| {
            let frame_start = (geplant.at * rate).round() as i64;
            let frame_ende = frame_start + geplant.frame.len() as i64;
            if frame_ende <= start {
                verworfen += 1;
                return false;
            }
            let von = frame_start.max(start);
            let bis = frame_ende.min(ende);
            for t in von..bis {
                out[(t - start) as usize] += geplant.frame.samples()[(t - frame_start) as usize];
            }
            frame_ende > ende
        });

        for s in out.iter_mut() {
            *s = s.clamp(-1.0, 1.0);
        }
        inner.verworfen += verworfen;
        inner.position += out.len() as u64;
        if verworfen > 0 {
            trace!(verworfen, "Verspaetete Frames verworfen");
        }
    }

    /// Anzahl noch nicht (vollstaendig) gerenderter Frames
    pub fn ausstehend(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Anzahl verworfener, verspaeteter Frames
    pub fn verworfen(&self) -> u64 {
        self.inner.lock().verworfen
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.lock().sample_rate
    }
}

impl AudioClock for RenderQueue {
    fn current_time(&self) -> f64 {
        let inner = self.inner.lock();
        inner.position as f64 / f64::from(inner.sample_rate)
    }

    fn schedule(&mut self, stream: StreamId, at: f64, frame: AudioFrame) {
        if !at.is_finite() || frame.is_empty() {
            return;
        }
        self.inner.lock().pending.push(ScheduledFrame { stream, at, frame });
    }

    fn cancel_stream(&mut self, stream: StreamId) -> usize {
        let mut inner = self.inner.lock();
        let vorher = inner.pending.len();
        inner.pending.retain(|f| f.stream != stream);
        vorher - inner.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 1000;

    #[test]
    fn uhr_folgt_gerenderten_samples() {
        let queue = RenderQueue::new(RATE);
        assert_eq!(queue.current_time(), 0.0);
        let mut buf = vec![0.0; 250];
        queue.render(&mut buf);
        assert!((queue.current_time() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn frame_wird_zum_zeitpunkt_gerendert() {
        let mut queue = RenderQueue::new(RATE);
        queue.schedule(StreamId::new(0, 0), 0.005, AudioFrame::new(vec![0.5; 10]));
        let mut buf = vec![0.0; 10];
        queue.render(&mut buf);
        assert_eq!(&buf[..5], &[0.0; 5]);
        assert_eq!(&buf[5..], &[0.5; 5]);
        assert_eq!(queue.ausstehend(), 1);

        queue.render(&mut buf);
        assert_eq!(&buf[..5], &[0.5; 5]);
        assert_eq!(&buf[5..], &[0.0; 5]);
        assert_eq!(queue.ausstehend(), 0);
    }

    #[test]
    fn streams_werden_gemischt_und_begrenzt() {
        let mut queue = RenderQueue::new(RATE);
        queue.schedule(StreamId::new(0, 0), 0.0, AudioFrame::new(vec![0.7; 4]));
        queue.schedule(StreamId::new(1, 0), 0.0, AudioFrame::new(vec![0.7; 4]));
        queue.schedule(StreamId::new(2, 0), 0.002, AudioFrame::new(vec![-0.2; 2]));
        let mut buf = vec![0.0; 4];
        queue.render(&mut buf);
        assert_eq!(buf, vec![1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn verspaetete_frames_verworfen() {
        let mut queue = RenderQueue::new(RATE);
        let mut buf = vec![0.0; 100];
        queue.render(&mut buf);
        queue.schedule(StreamId::new(0, 0), 0.01, AudioFrame::new(vec![0.5; 20]));
        queue.render(&mut buf);
        assert!(buf.iter().all(|s| *s == 0.0));
        assert_eq!(queue.verworfen(), 1);
    }

    #[test]
    fn stream_stornieren() {
        let mut queue = RenderQueue::new(RATE);
        let a = StreamId::new(0, 0);
        let b = StreamId::new(1, 0);
        queue.schedule(a, 0.0, AudioFrame::new(vec![0.1; 4]));
        queue.schedule(a, 0.004, AudioFrame::new(vec![0.1; 4]));
        queue.schedule(b, 0.0, AudioFrame::new(vec![0.3; 4]));
        assert_eq!(queue.cancel_stream(a), 2);
        let mut buf = vec![0.0; 4];
        queue.render(&mut buf);
        assert_eq!(buf, vec![0.3; 4]);
    }

    #[test]
    fn geteilt_zwischen_threads() {
        let mut queue = RenderQueue::new(RATE);
        let render = queue.clone();
        queue.schedule(StreamId::new(0, 0), 0.0, AudioFrame::new(vec![0.25; 8]));
        let handle = std::thread::spawn(move || {
            let mut buf = vec![0.0; 8];
            render.render(&mut buf);
            buf
        });
        assert_eq!(handle.join().unwrap(), vec![0.25; 8]);
        assert!((queue.current_time() - 0.008).abs() < 1e-9);
    }
}
