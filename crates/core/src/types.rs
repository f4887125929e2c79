//! Gemeinsame Wertetypen fuer den Audio-Pfad
//!
//! Die vier Audio-Komponenten kennen sich gegenseitig nicht; sie werden
//! ausschliesslich ueber die Typen in diesem Modul verbunden.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Stream-Identitaet
// ---------------------------------------------------------------------------

/// Logischer Stream-Schluessel des externen Kollaborateurs
///
/// Ein Schluessel pro Teilnehmer oder einer fuer den Server-Mix
/// (abhaengig von der Konfiguration). Der Schluessel eines Teilnehmers
/// kann sich aendern, z.B. nach einem Rollenwechsel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamKey(String);

impl StreamKey {
    /// Erstellt einen neuen Stream-Schluessel
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Gibt den Schluessel als `&str` zurueck
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StreamKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for StreamKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl std::fmt::Display for StreamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Index eines Stream-Slots in der Arena plus Generation
///
/// Nach dem Freigeben eines Slots wird die Generation erhoeht, sodass
/// eine alte `StreamId` nie wieder auf einen neuen Stream zeigt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamId {
    index: u32,
    generation: u32,
}

impl StreamId {
    /// Erstellt eine `StreamId` aus Slot-Index und Generation
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot-Index in der Arena
    pub fn index(&self) -> usize {
        self.index as usize
    }

    /// Generation des Slots zum Zeitpunkt der Vergabe
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stream#{}.{}", self.index, self.generation)
    }
}

// ---------------------------------------------------------------------------
// Frame-Format
// ---------------------------------------------------------------------------

/// Fest vereinbartes Frame-Format einer Sitzung (Mono)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameFormat {
    /// Abtastrate in Hz
    pub sample_rate: u32,
    /// Frame-Dauer in Millisekunden
    pub frame_duration_ms: u32,
}

impl FrameFormat {
    /// Erstellt ein neues Frame-Format
    pub fn new(sample_rate: u32, frame_duration_ms: u32) -> Self {
        Self {
            sample_rate,
            frame_duration_ms,
        }
    }

    /// Anzahl Samples pro Frame (z.B. 960 bei 20ms/48kHz)
    pub fn samples_per_frame(&self) -> usize {
        (self.sample_rate as u64 * self.frame_duration_ms as u64 / 1000) as usize
    }

    /// Frame-Dauer in Sekunden (Audio-Uhr)
    pub fn frame_duration_secs(&self) -> f64 {
        self.frame_duration_ms as f64 / 1000.0
    }

    /// Erzeugt einen Stille-Frame der vereinbarten Laenge
    pub fn silence(&self) -> AudioFrame {
        AudioFrame::silence(self.samples_per_frame())
    }
}

impl Default for FrameFormat {
    fn default() -> Self {
        Self::new(48_000, 20)
    }
}

// ---------------------------------------------------------------------------
// AudioFrame
// ---------------------------------------------------------------------------

/// PCM-Frame: normalisierte f32-Samples (-1.0..1.0), Mono
///
/// Die Laenge ist fuer die gesamte Sitzung konstant.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AudioFrame {
    samples: Vec<f32>,
}

impl AudioFrame {
    /// Erstellt einen Frame aus vorhandenen Samples
    pub fn new(samples: Vec<f32>) -> Self {
        Self { samples }
    }

    /// Komfort-Stille: Frame mit `len` Null-Samples
    pub fn silence(len: usize) -> Self {
        Self {
            samples: vec![0.0; len],
        }
    }

    /// Anzahl Samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Gibt zurueck ob der Frame keine Samples enthaelt
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Lesender Zugriff auf die Samples
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Kopie mit skalierter Amplitude
    pub fn scaled(&self, faktor: f32) -> Self {
        Self {
            samples: self.samples.iter().map(|s| s * faktor).collect(),
        }
    }

    /// Prueft ob alle Samples exakt 0 sind
    pub fn is_silent(&self) -> bool {
        self.samples.iter().all(|s| *s == 0.0)
    }
}

impl From<Vec<f32>> for AudioFrame {
    fn from(samples: Vec<f32>) -> Self {
        Self::new(samples)
    }
}

// ---------------------------------------------------------------------------
// CompressedFrame / SequencedPacket
// ---------------------------------------------------------------------------

/// Kodierter Frame: opake Codec-Bytes plus Herkunftsmetadaten
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedFrame {
    /// Sequenznummer des Ursprungs-Frames
    pub sequence: u32,
    /// Aufnahme-Zeitstempel in Millisekunden
    pub capture_timestamp_ms: u64,
    /// Opake Codec-Nutzdaten
    pub payload: Bytes,
}

impl CompressedFrame {
    /// Erstellt einen neuen kodierten Frame
    pub fn new(sequence: u32, capture_timestamp_ms: u64, payload: impl Into<Bytes>) -> Self {
        Self {
            sequence,
            capture_timestamp_ms,
            payload: payload.into(),
        }
    }
}

/// Dekodiertes, sequenziertes Paket im Besitz des Jitter Buffers
#[derive(Debug, Clone, PartialEq)]
pub struct SequencedPacket {
    /// Sequenznummer (modulo 2^32, darf ueberlaufen)
    pub sequence: u32,
    /// Aufnahme-Zeitstempel des Senders in ms
    pub capture_timestamp_ms: u64,
    /// Lokaler Ankunftszeitpunkt in ms
    pub arrival_timestamp_ms: u64,
    /// Dekodierter PCM-Frame
    pub frame: AudioFrame,
}

impl SequencedPacket {
    /// Erstellt ein neues Paket
    pub fn new(
        sequence: u32,
        capture_timestamp_ms: u64,
        arrival_timestamp_ms: u64,
        frame: AudioFrame,
    ) -> Self {
        Self {
            sequence,
            capture_timestamp_ms,
            arrival_timestamp_ms,
            frame,
        }
    }

    /// Transitzeit (Ankunft minus Aufnahme) in ms, saettigend
    ///
    /// Die Zeitstempel stammen vom Netzwerk und sind nicht vertrauenswuerdig.
    pub fn transit_ms(&self) -> i64 {
        let ankunft = self.arrival_timestamp_ms.min(i64::MAX as u64) as i64;
        let aufnahme = self.capture_timestamp_ms.min(i64::MAX as u64) as i64;
        ankunft.saturating_sub(aufnahme)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_format_standard() {
        let format = FrameFormat::default();
        assert_eq!(format.samples_per_frame(), 960);
        assert!((format.frame_duration_secs() - 0.02).abs() < f64::EPSILON);
    }

    #[test]
    fn frame_format_16khz_10ms() {
        let format = FrameFormat::new(16_000, 10);
        assert_eq!(format.samples_per_frame(), 160);
        assert_eq!(format.silence().len(), 160);
    }

    #[test]
    fn stille_frame_ist_still() {
        let frame = AudioFrame::silence(960);
        assert_eq!(frame.len(), 960);
        assert!(frame.is_silent());
    }

    #[test]
    fn frame_skalieren() {
        let frame = AudioFrame::new(vec![0.5, -0.5]);
        let leiser = frame.scaled(0.5);
        assert_eq!(leiser.samples(), &[0.25, -0.25]);
    }

    #[test]
    fn stream_id_display() {
        let id = StreamId::new(3, 1);
        assert_eq!(id.to_string(), "stream#3.1");
        assert_eq!(id.index(), 3);
    }

    #[test]
    fn stream_key_serde_transparent() {
        let key = StreamKey::from("mix:lobby");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"mix:lobby\"");
    }

    #[test]
    fn transit_saettigt_bei_absurden_zeitstempeln() {
        let paket = SequencedPacket::new(1, u64::MAX, 0, AudioFrame::silence(4));
        assert_eq!(paket.transit_ms(), -(i64::MAX));
        let paket = SequencedPacket::new(1, 100, 140, AudioFrame::silence(4));
        assert_eq!(paket.transit_ms(), 40);
    }
}
