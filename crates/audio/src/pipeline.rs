//! Codec-Pipeline
//!
//! Ein Encoder fuer die Aufnahmeseite, ein unabhaengiger Decoder pro
//! Remote-Stream. Decoder werden nur explizit ueber `ensure_decoder`
//! angelegt (bei Stream-Erzeugung), nie implizit pro Frame. Ein Fehler
//! eines Streams beruehrt keinen anderen Decoder.

use std::collections::HashMap;

use murmel_core::types::{AudioFrame, CompressedFrame, FrameFormat, StreamId};
use murmel_protocol::codec::CodecKind;
use tracing::{debug, trace};

use crate::codec::{CodecBackend, FrameDecoder, FrameEncoder};
use crate::error::{AudioError, AudioResult};

/// Zaehler der Codec-Pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodecStatistik {
    pub frames_kodiert: u64,
    pub frames_dekodiert: u64,
    pub encode_fehler: u64,
    pub decode_fehler: u64,
}

/// Encoder plus Decoder-Tabelle pro Stream
pub struct CodecPipeline {
    backend: Box<dyn CodecBackend>,
    encoder: Box<dyn FrameEncoder>,
    decoders: HashMap<StreamId, Box<dyn FrameDecoder>>,
    format: FrameFormat,
    stats: CodecStatistik,
}

impl CodecPipeline {
    /// Erstellt die Pipeline samt Encoder
    pub fn new(backend: Box<dyn CodecBackend>) -> AudioResult<Self> {
        let encoder = backend.encoder_erstellen()?;
        let format = backend.format();
        debug!(codec = backend.kind().bezeichnung(), ?format, "Codec-Pipeline erstellt");
        Ok(Self {
            backend,
            encoder,
            decoders: HashMap::new(),
            format,
            stats: CodecStatistik::default(),
        })
    }

    pub fn kind(&self) -> CodecKind {
        self.backend.kind()
    }

    pub fn format(&self) -> FrameFormat {
        self.format
    }

    /// Kodiert genau einen Frame der vereinbarten Laenge
    pub fn encode(
        &mut self,
        frame: &AudioFrame,
        sequence: u32,
        capture_timestamp_ms: u64,
    ) -> AudioResult<CompressedFrame> {
        let result = self.encode_inner(frame);
        match result {
            Ok(payload) => {
                self.stats.frames_kodiert += 1;
                Ok(CompressedFrame::new(sequence, capture_timestamp_ms, payload))
            }
            Err(e) => {
                self.stats.encode_fehler += 1;
                Err(e)
            }
        }
    }

    fn encode_inner(&mut self, frame: &AudioFrame) -> AudioResult<Vec<u8>> {
        let erwartet = self.format.samples_per_frame();
        if frame.len() != erwartet {
            return Err(AudioError::FrameLaenge {
                erwartet,
                erhalten: frame.len(),
            });
        }
        self.encoder.encode(frame.samples())
    }

    /// Legt den Decoder fuer einen Stream an, falls noch keiner existiert
    pub fn ensure_decoder(&mut self, stream: StreamId) -> AudioResult<()> {
        if self.decoders.contains_key(&stream) {
            return Ok(());
        }
        let decoder = self.backend.decoder_erstellen()?;
        self.decoders.insert(stream, decoder);
        debug!(%stream, "Decoder angelegt");
        Ok(())
    }

    /// Dekodiert einen Frame eines Streams
    ///
    /// `Ok(None)` heisst: der Codec braucht mehr Kontext, kein Frame.
    pub fn decode(
        &mut self,
        stream: StreamId,
        compressed: &CompressedFrame,
    ) -> AudioResult<Option<AudioFrame>> {
        let erwartet = self.format.samples_per_frame();
        let decoder = self
            .decoders
            .get_mut(&stream)
            .ok_or(AudioError::DecoderFehlt(stream))?;

        let result = decoder.decode(&compressed.payload).and_then(|pcm| {
            if pcm.is_empty() {
                Ok(None)
            } else if pcm.len() != erwartet {
                Err(AudioError::FrameLaenge {
                    erwartet,
                    erhalten: pcm.len(),
                })
            } else {
                Ok(Some(AudioFrame::new(pcm)))
            }
        });

        match &result {
            Ok(Some(_)) => {
                self.stats.frames_dekodiert += 1;
                trace!(%stream, sequence = compressed.sequence, "Frame dekodiert");
            }
            Ok(None) => trace!(%stream, sequence = compressed.sequence, "Decoder braucht mehr Kontext"),
            Err(_) => self.stats.decode_fehler += 1,
        }
        result
    }

    /// Stille-Frame der vereinbarten Laenge
    pub fn silence(&self) -> AudioFrame {
        self.format.silence()
    }

    /// Gibt den Decoder eines Streams frei
    pub fn clear_decoder(&mut self, stream: StreamId) -> bool {
        let entfernt = self.decoders.remove(&stream).is_some();
        if entfernt {
            debug!(%stream, "Decoder freigegeben");
        }
        entfernt
    }

    /// Gibt alle Decoder frei
    pub fn clear_all_decoders(&mut self) {
        self.decoders.clear();
    }

    pub fn decoder_anzahl(&self) -> usize {
        self.decoders.len()
    }

    pub fn hat_decoder(&self, stream: StreamId) -> bool {
        self.decoders.contains_key(&stream)
    }

    pub fn statistik(&self) -> CodecStatistik {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{OpusBackend, PcmBackend};
    use murmel_protocol::codec::AudioPreset;

    fn pcm_pipeline() -> CodecPipeline {
        CodecPipeline::new(Box::new(PcmBackend::new(FrameFormat::default()))).unwrap()
    }

    fn ton(len: usize) -> AudioFrame {
        AudioFrame::new((0..len).map(|i| ((i as f32) * 0.05).sin() * 0.3).collect())
    }

    #[test]
    fn roundtrip_erhaelt_frame_laenge() {
        let mut pipeline = pcm_pipeline();
        let stream = StreamId::new(0, 0);
        pipeline.ensure_decoder(stream).unwrap();

        let compressed = pipeline.encode(&ton(960), 7, 140).unwrap();
        assert_eq!(compressed.sequence, 7);
        assert_eq!(compressed.capture_timestamp_ms, 140);

        let frame = pipeline.decode(stream, &compressed).unwrap().unwrap();
        assert_eq!(frame.len(), 960);
        assert_eq!(pipeline.statistik().frames_dekodiert, 1);
    }

    #[test]
    fn opus_roundtrip_erhaelt_frame_laenge() {
        let backend = OpusBackend::new(FrameFormat::default(), AudioPreset::Balanced.config());
        let mut pipeline = CodecPipeline::new(Box::new(backend)).unwrap();
        let stream = StreamId::new(3, 1);
        pipeline.ensure_decoder(stream).unwrap();
        let compressed = pipeline.encode(&ton(960), 0, 0).unwrap();
        let frame = pipeline.decode(stream, &compressed).unwrap().unwrap();
        assert_eq!(frame.len(), 960);
    }

    #[test]
    fn falsche_eingabelaenge_ist_fehler() {
        let mut pipeline = pcm_pipeline();
        assert!(matches!(
            pipeline.encode(&ton(100), 0, 0),
            Err(AudioError::FrameLaenge { erwartet: 960, erhalten: 100 })
        ));
        assert_eq!(pipeline.statistik().encode_fehler, 1);
    }

    #[test]
    fn falsche_decoder_ausgabe_ist_fehler() {
        let mut pipeline = pcm_pipeline();
        let stream = StreamId::new(0, 0);
        pipeline.ensure_decoder(stream).unwrap();
        let kurz = CompressedFrame::new(1, 0, vec![0u8; 10]);
        assert!(pipeline.decode(stream, &kurz).is_err());
        assert_eq!(pipeline.statistik().decode_fehler, 1);
    }

    #[test]
    fn leere_nutzdaten_ergeben_keinen_frame() {
        let mut pipeline = pcm_pipeline();
        let stream = StreamId::new(0, 0);
        pipeline.ensure_decoder(stream).unwrap();
        let leer = CompressedFrame::new(1, 0, Vec::new());
        assert_eq!(pipeline.decode(stream, &leer).unwrap(), None);
    }

    #[test]
    fn ohne_decoder_kein_implizites_anlegen() {
        let mut pipeline = pcm_pipeline();
        let stream = StreamId::new(5, 0);
        let compressed = pipeline.encode(&ton(960), 0, 0).unwrap();
        assert!(matches!(
            pipeline.decode(stream, &compressed),
            Err(AudioError::DecoderFehlt(_))
        ));
        assert_eq!(pipeline.decoder_anzahl(), 0);
    }

    #[test]
    fn fehler_eines_streams_beruehrt_andere_nicht() {
        let mut pipeline = pcm_pipeline();
        let a = StreamId::new(0, 0);
        let b = StreamId::new(1, 0);
        pipeline.ensure_decoder(a).unwrap();
        pipeline.ensure_decoder(b).unwrap();

        assert!(pipeline.decode(a, &CompressedFrame::new(1, 0, vec![1u8; 3])).is_err());
        let ok = pipeline.encode(&ton(960), 1, 0).unwrap();
        assert!(pipeline.decode(b, &ok).unwrap().is_some());
        assert!(pipeline.decode(a, &ok).unwrap().is_some());
    }

    #[test]
    fn decoder_freigeben() {
        let mut pipeline = pcm_pipeline();
        let a = StreamId::new(0, 0);
        let b = StreamId::new(1, 0);
        pipeline.ensure_decoder(a).unwrap();
        pipeline.ensure_decoder(a).unwrap();
        pipeline.ensure_decoder(b).unwrap();
        assert_eq!(pipeline.decoder_anzahl(), 2);

        assert!(pipeline.clear_decoder(a));
        assert!(!pipeline.clear_decoder(a));
        assert!(pipeline.hat_decoder(b));

        pipeline.clear_all_decoders();
        assert_eq!(pipeline.decoder_anzahl(), 0);
    }
}
