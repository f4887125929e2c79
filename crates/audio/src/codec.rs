//! Codec-Backends
//!
//! Ein Backend erzeugt einen Encoder fuer die Aufnahmeseite und beliebig
//! viele unabhaengige Decoder (einen pro Remote-Stream). Opus kapselt
//! audiopus, PCM16 ist verlustfrei und braucht keine native Bibliothek.

use audiopus::{
    coder::{Decoder, Encoder},
    Application, Channels, SampleRate,
};
use murmel_core::types::FrameFormat;
use murmel_protocol::codec::{format_validieren, CodecKind, OpusApplication, OpusConfig};
use tracing::debug;

use crate::error::{AudioError, AudioResult};

/// OPUS_SET_DTX_REQUEST
const OPUS_SET_DTX: i32 = 4016;

/// Maximale Groesse eines Opus-Pakets
const MAX_OPUS_PAKET: usize = 4000;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Kodiert genau einen PCM-Frame zu einem Paket
pub trait FrameEncoder: Send {
    fn encode(&mut self, pcm: &[f32]) -> AudioResult<Vec<u8>>;
}

/// Dekodiert ein Paket zu null oder einem PCM-Frame
///
/// Eine leere Rueckgabe bedeutet, dass der Decoder mehr Kontext braucht.
pub trait FrameDecoder: Send {
    fn decode(&mut self, data: &[u8]) -> AudioResult<Vec<f32>>;
}

/// Fabrik fuer Encoder und Decoder eines Codecs
pub trait CodecBackend: Send + Sync {
    fn kind(&self) -> CodecKind;
    fn format(&self) -> FrameFormat;
    fn encoder_erstellen(&self) -> AudioResult<Box<dyn FrameEncoder>>;
    fn decoder_erstellen(&self) -> AudioResult<Box<dyn FrameDecoder>>;
}

/// Erstellt das konfigurierte Backend
pub fn backend_erstellen(
    kind: CodecKind,
    format: FrameFormat,
    opus: OpusConfig,
) -> AudioResult<Box<dyn CodecBackend>> {
    format_validieren(&format).map_err(AudioError::Konfiguration)?;
    match kind {
        CodecKind::Opus => {
            opus.validieren().map_err(AudioError::Konfiguration)?;
            Ok(Box::new(OpusBackend::new(format, opus)))
        }
        CodecKind::Pcm16 => Ok(Box::new(PcmBackend::new(format))),
    }
}

// ---------------------------------------------------------------------------
// Opus
// ---------------------------------------------------------------------------

/// Opus-Backend (Mono)
pub struct OpusBackend {
    format: FrameFormat,
    config: OpusConfig,
}

impl OpusBackend {
    pub fn new(format: FrameFormat, config: OpusConfig) -> Self {
        Self { format, config }
    }
}

impl CodecBackend for OpusBackend {
    fn kind(&self) -> CodecKind {
        CodecKind::Opus
    }

    fn format(&self) -> FrameFormat {
        self.format
    }

    fn encoder_erstellen(&self) -> AudioResult<Box<dyn FrameEncoder>> {
        Ok(Box::new(OpusEncoder::new(self.format, self.config.clone())?))
    }

    fn decoder_erstellen(&self) -> AudioResult<Box<dyn FrameDecoder>> {
        Ok(Box::new(OpusDecoder::new(self.format)?))
    }
}

/// Opus-Encoder: kodiert f32-PCM zu Opus-Bytes
pub struct OpusEncoder {
    encoder: Encoder,
    frame_size: usize,
}

impl OpusEncoder {
    /// Erstellt einen neuen Encoder
    pub fn new(format: FrameFormat, config: OpusConfig) -> AudioResult<Self> {
        config.validieren().map_err(AudioError::Konfiguration)?;

        let mut encoder = Encoder::new(
            rate_to_audiopus(format.sample_rate)?,
            Channels::Mono,
            app_to_audiopus(config.application),
        )
        .map_err(codec_fehler)?;

        encoder
            .set_bitrate(audiopus::Bitrate::BitsPerSecond(config.bitrate_bps()))
            .map_err(codec_fehler)?;
        encoder
            .set_complexity(config.complexity)
            .map_err(codec_fehler)?;
        encoder.set_vbr(config.vbr_enabled).map_err(codec_fehler)?;
        encoder
            .set_inband_fec(config.fec_enabled)
            .map_err(codec_fehler)?;

        // audiopus 0.2 hat kein set_dtx
        if config.dtx_enabled {
            let _ = encoder.set_encoder_ctl_request(OPUS_SET_DTX, 1);
        }

        let frame_size = format.samples_per_frame();
        debug!(
            bitrate_kbps = config.bitrate_kbps,
            sample_rate = format.sample_rate,
            frame_size,
            "OpusEncoder erstellt"
        );

        Ok(Self {
            encoder,
            frame_size,
        })
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }
}

impl FrameEncoder for OpusEncoder {
    fn encode(&mut self, pcm: &[f32]) -> AudioResult<Vec<u8>> {
        if pcm.len() != self.frame_size {
            return Err(AudioError::FrameLaenge {
                erwartet: self.frame_size,
                erhalten: pcm.len(),
            });
        }

        let mut output = vec![0u8; MAX_OPUS_PAKET];
        let written = self
            .encoder
            .encode_float(pcm, &mut output)
            .map_err(codec_fehler)?;
        output.truncate(written);
        Ok(output)
    }
}

/// Opus-Decoder: dekodiert Opus-Bytes zu f32-PCM
pub struct OpusDecoder {
    decoder: Decoder,
    frame_size: usize,
}

impl OpusDecoder {
    pub fn new(format: FrameFormat) -> AudioResult<Self> {
        let decoder =
            Decoder::new(rate_to_audiopus(format.sample_rate)?, Channels::Mono).map_err(codec_fehler)?;
        Ok(Self {
            decoder,
            frame_size: format.samples_per_frame(),
        })
    }

    /// Packet Loss Concealment des Codecs selbst
    pub fn decode_plc(&mut self) -> AudioResult<Vec<f32>> {
        let mut output = vec![0.0f32; self.frame_size];
        let decoded = self
            .decoder
            .decode_float(None::<&[u8]>, &mut output, false)
            .map_err(codec_fehler)?;
        output.truncate(decoded);
        Ok(output)
    }
}

impl FrameDecoder for OpusDecoder {
    fn decode(&mut self, data: &[u8]) -> AudioResult<Vec<f32>> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        let mut output = vec![0.0f32; self.frame_size];
        let decoded = self
            .decoder
            .decode_float(Some(data), &mut output, false)
            .map_err(codec_fehler)?;
        output.truncate(decoded);
        Ok(output)
    }
}

fn codec_fehler(e: audiopus::Error) -> AudioError {
    AudioError::CodecFehler(e.to_string())
}

fn rate_to_audiopus(hz: u32) -> AudioResult<SampleRate> {
    match hz {
        8000 => Ok(SampleRate::Hz8000),
        12000 => Ok(SampleRate::Hz12000),
        16000 => Ok(SampleRate::Hz16000),
        24000 => Ok(SampleRate::Hz24000),
        48000 => Ok(SampleRate::Hz48000),
        other => Err(AudioError::Konfiguration(format!(
            "Opus unterstuetzt {} Hz nicht",
            other
        ))),
    }
}

fn app_to_audiopus(app: OpusApplication) -> Application {
    match app {
        OpusApplication::Voip => Application::Voip,
        OpusApplication::Audio => Application::Audio,
        OpusApplication::RestrictedLowdelay => Application::LowDelay,
    }
}

// ---------------------------------------------------------------------------
// PCM16
// ---------------------------------------------------------------------------

/// Unkomprimiertes 16-bit PCM (little-endian)
pub struct PcmBackend {
    format: FrameFormat,
}

impl PcmBackend {
    pub fn new(format: FrameFormat) -> Self {
        Self { format }
    }
}

impl CodecBackend for PcmBackend {
    fn kind(&self) -> CodecKind {
        CodecKind::Pcm16
    }

    fn format(&self) -> FrameFormat {
        self.format
    }

    fn encoder_erstellen(&self) -> AudioResult<Box<dyn FrameEncoder>> {
        Ok(Box::new(Pcm16Codec::new(self.format.samples_per_frame())))
    }

    fn decoder_erstellen(&self) -> AudioResult<Box<dyn FrameDecoder>> {
        Ok(Box::new(Pcm16Codec::new(self.format.samples_per_frame())))
    }
}

/// PCM16-Encoder und -Decoder (zustandslos)
pub struct Pcm16Codec {
    frame_size: usize,
}

impl Pcm16Codec {
    pub fn new(frame_size: usize) -> Self {
        Self { frame_size }
    }
}

impl FrameEncoder for Pcm16Codec {
    fn encode(&mut self, pcm: &[f32]) -> AudioResult<Vec<u8>> {
        if pcm.len() != self.frame_size {
            return Err(AudioError::FrameLaenge {
                erwartet: self.frame_size,
                erhalten: pcm.len(),
            });
        }
        let mut out = Vec::with_capacity(pcm.len() * 2);
        for &s in pcm {
            let s = if s.is_finite() { s.clamp(-1.0, 1.0) } else { 0.0 };
            let wert = (s * i16::MAX as f32).round() as i16;
            out.extend_from_slice(&wert.to_le_bytes());
        }
        Ok(out)
    }
}

impl FrameDecoder for Pcm16Codec {
    fn decode(&mut self, data: &[u8]) -> AudioResult<Vec<f32>> {
        if data.len() % 2 != 0 {
            return Err(AudioError::CodecFehler(format!(
                "PCM16-Nutzdaten mit ungerader Laenge: {}",
                data.len()
            )));
        }
        Ok(data
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / i16::MAX as f32)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmel_protocol::codec::AudioPreset;

    fn sinus(len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (i as f32 / len as f32 * 0.1).sin() * 0.5)
            .collect()
    }

    #[test]
    fn opus_encoder_decoder_roundtrip() {
        let format = FrameFormat::default();
        let backend = OpusBackend::new(format, AudioPreset::Speech.config());
        let mut enc = backend.encoder_erstellen().unwrap();
        let mut dec = backend.decoder_erstellen().unwrap();

        let encoded = enc.encode(&sinus(960)).expect("Encoding sollte funktionieren");
        assert!(!encoded.is_empty());
        let decoded = dec.decode(&encoded).expect("Decoding sollte funktionieren");
        assert_eq!(decoded.len(), 960);
    }

    #[test]
    fn opus_falsche_frame_groesse() {
        let mut enc = OpusEncoder::new(FrameFormat::new(16000, 20), AudioPreset::Speech.config()).unwrap();
        assert_eq!(enc.frame_size(), 320);
        let err = enc.encode(&[0.0f32; 100]).unwrap_err();
        assert!(matches!(err, AudioError::FrameLaenge { erwartet: 320, erhalten: 100 }));
    }

    #[test]
    fn opus_leeres_paket_ergibt_keinen_frame() {
        let mut dec = OpusDecoder::new(FrameFormat::default()).unwrap();
        assert!(dec.decode(&[]).unwrap().is_empty());
        assert_eq!(dec.decode_plc().unwrap().len(), 960);
    }

    #[test]
    fn alle_presets_encoder_erstellbar() {
        for preset in [
            AudioPreset::Speech,
            AudioPreset::Balanced,
            AudioPreset::Music,
            AudioPreset::LowBandwidth,
        ] {
            assert!(
                OpusEncoder::new(FrameFormat::default(), preset.config()).is_ok(),
                "Preset {:?} sollte Encoder erstellen koennen",
                preset
            );
        }
    }

    #[test]
    fn backend_ungueltige_konfiguration() {
        let mut config = AudioPreset::Speech.config();
        config.bitrate_kbps = 5;
        assert!(backend_erstellen(CodecKind::Opus, FrameFormat::default(), config).is_err());
        assert!(backend_erstellen(
            CodecKind::Pcm16,
            FrameFormat::new(44100, 20),
            OpusConfig::default()
        )
        .is_err());
    }

    #[test]
    fn pcm16_roundtrip_verlustarm() {
        let backend = PcmBackend::new(FrameFormat::new(16000, 10));
        let mut enc = backend.encoder_erstellen().unwrap();
        let mut dec = backend.decoder_erstellen().unwrap();
        let pcm = sinus(160);
        let bytes = enc.encode(&pcm).unwrap();
        assert_eq!(bytes.len(), 320);
        let out = dec.decode(&bytes).unwrap();
        assert_eq!(out.len(), 160);
        for (a, b) in pcm.iter().zip(out.iter()) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn pcm16_begrenzt_und_ersetzt_nan() {
        let mut codec = Pcm16Codec::new(3);
        let bytes = codec.encode(&[2.0, f32::NAN, -2.0]).unwrap();
        let out = codec.decode(&bytes).unwrap();
        assert!((out[0] - 1.0).abs() < 1e-4);
        assert_eq!(out[1], 0.0);
        assert!((out[2] + 1.0).abs() < 1e-4);
    }

    #[test]
    fn pcm16_ungerade_laenge_fehler() {
        let mut codec = Pcm16Codec::new(2);
        assert!(codec.decode(&[1, 2, 3]).is_err());
    }
}
