//! Client-Konfiguration
//!
//! Wird beim Sitzungsstart aus einer TOML-Datei geladen und gilt danach
//! unveraendert. Alle Felder haben Standardwerte, sodass die Sitzung ohne
//! Konfigurationsdatei lauffaehig ist.

use murmel_audio::{GateConfig, PttMode};
use murmel_core::error::{MurmelError, Result};
use murmel_core::types::FrameFormat;
use murmel_protocol::codec::{format_validieren, AudioPreset, CodecKind, OpusConfig};
use murmel_protocol::voice::MAX_NUTZDATEN_LAENGE;
use murmel_voice::{SchedulerConfig, SequencerConfig, StreamConfig};
use serde::{Deserialize, Serialize};

/// Umgebungsvariable fuer den Pfad der Konfigurationsdatei
pub const ENV_CONFIG: &str = "MURMEL_CONFIG";

/// Standardpfad der Konfigurationsdatei
pub const STANDARD_PFAD: &str = "murmel.toml";

/// Vollstaendige Client-Konfiguration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Frame-Format und Codec
    pub audio: AudioEinstellungen,
    /// Packet Sequencer und Zielverzoegerung
    pub jitter: JitterEinstellungen,
    /// Heartbeat, Stall-Erkennung, Verlustverdeckung
    pub playback: PlaybackEinstellungen,
    /// Voice Activity Gate und Sendemodus
    pub vad: VadEinstellungen,
    /// Lebensdauer von Remote-Streams
    pub streams: StreamEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// Frame-Format und Codec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioEinstellungen {
    /// Frame-Dauer in ms (10, 20, 40 oder 60)
    pub frame_duration_ms: u32,
    /// Abtastrate in Hz
    pub sample_rate: u32,
    /// Codec-Backend: "opus" oder "pcm16"
    pub codec: CodecKind,
    /// Opus-Preset
    pub preset: AudioPreset,
    /// Ueberschreibt die Bitrate des Presets (kbit/s)
    pub bitrate_kbps: Option<u16>,
}

impl Default for AudioEinstellungen {
    fn default() -> Self {
        Self {
            frame_duration_ms: 20,
            sample_rate: 48_000,
            codec: CodecKind::Opus,
            preset: AudioPreset::Speech,
            bitrate_kbps: None,
        }
    }
}

/// Jitter Buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JitterEinstellungen {
    pub target_delay_ms: u32,
    pub lookahead_ms: u32,
    pub max_buffered_packets: usize,
    pub packet_max_age_ms: u64,
    pub max_gap: u32,
    pub min_start_packets: usize,
}

impl Default for JitterEinstellungen {
    fn default() -> Self {
        Self {
            target_delay_ms: 40,
            lookahead_ms: 500,
            max_buffered_packets: 100,
            packet_max_age_ms: 1_000,
            max_gap: 50,
            min_start_packets: 2,
        }
    }
}

/// Wiedergabe-Ueberwachung
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackEinstellungen {
    pub heartbeat_interval_ms: u64,
    pub stall_threshold_ms: u64,
    pub max_consecutive_stalls: u32,
    /// 0 = keine Verlustverdeckung
    pub conceal_max_frames: u32,
}

impl Default for PlaybackEinstellungen {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 100,
            stall_threshold_ms: 200,
            max_consecutive_stalls: 10,
            conceal_max_frames: 3,
        }
    }
}

/// Voice Activity Gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VadEinstellungen {
    pub enabled: bool,
    pub adaptive: bool,
    pub positive_threshold: f32,
    pub negative_threshold: f32,
    pub debounce_ms: u32,
    /// "hold", "toggle" oder "voice_activation"
    pub ptt_mode: PttMode,
}

impl Default for VadEinstellungen {
    fn default() -> Self {
        let gate = GateConfig::default();
        Self {
            enabled: gate.enabled,
            adaptive: gate.adaptive,
            positive_threshold: gate.positive_threshold,
            negative_threshold: gate.negative_threshold,
            debounce_ms: gate.debounce_ms,
            ptt_mode: PttMode::VoiceActivation,
        }
    }
}

/// Remote-Streams
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamEinstellungen {
    /// Streams ohne Paket seit so vielen ms werden freigegeben
    pub idle_timeout_ms: u64,
}

impl Default for StreamEinstellungen {
    fn default() -> Self {
        Self {
            idle_timeout_ms: 30_000,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl ClientConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => Self::aus_toml(&inhalt)
                .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
                ))
            }
        };
        config.validieren()?;
        Ok(config)
    }

    /// Parst eine Konfiguration aus einem TOML-String (ohne Validierung)
    pub fn aus_toml(inhalt: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(inhalt)
    }

    /// Pfad aus `MURMEL_CONFIG` oder Standard
    pub fn pfad_aus_env() -> String {
        std::env::var(ENV_CONFIG).unwrap_or_else(|_| STANDARD_PFAD.into())
    }

    /// Prueft alle Werte auf Zulaessigkeit
    pub fn validieren(&self) -> Result<()> {
        let fehler = |msg: String| Err(MurmelError::Konfiguration(msg));

        format_validieren(&self.frame_format()).map_err(MurmelError::Konfiguration)?;
        if self.audio.codec == CodecKind::Opus {
            self.opus_config().validieren().map_err(MurmelError::Konfiguration)?;
        }
        let max_nutzdaten = self.audio.codec.max_nutzdaten(&self.frame_format());
        if max_nutzdaten > MAX_NUTZDATEN_LAENGE {
            return fehler(format!(
                "{} mit {} Hz / {} ms ergibt {} Bytes pro Frame (erlaubt: {})",
                self.audio.codec.bezeichnung(),
                self.audio.sample_rate,
                self.audio.frame_duration_ms,
                max_nutzdaten,
                MAX_NUTZDATEN_LAENGE
            ));
        }

        let j = &self.jitter;
        if j.max_buffered_packets == 0 {
            return fehler("jitter.max_buffered_packets darf nicht 0 sein".into());
        }
        if j.max_gap == 0 {
            return fehler("jitter.max_gap darf nicht 0 sein".into());
        }
        if j.min_start_packets == 0 || j.min_start_packets > j.max_buffered_packets {
            return fehler(format!(
                "jitter.min_start_packets muss zwischen 1 und {} liegen",
                j.max_buffered_packets
            ));
        }
        if j.packet_max_age_ms == 0 {
            return fehler("jitter.packet_max_age_ms darf nicht 0 sein".into());
        }
        let vorlauf_ms = (SchedulerConfig::default().rearm_lead_secs * 1000.0).round() as u32;
        if j.lookahead_ms < j.target_delay_ms.saturating_add(vorlauf_ms) {
            return fehler(format!(
                "jitter.lookahead_ms ({}) muss mindestens target_delay_ms ({}) plus {} ms Re-Arm-Vorlauf sein",
                j.lookahead_ms, j.target_delay_ms, vorlauf_ms
            ));
        }

        let p = &self.playback;
        if p.heartbeat_interval_ms == 0 {
            return fehler("playback.heartbeat_interval_ms darf nicht 0 sein".into());
        }
        if p.stall_threshold_ms < p.heartbeat_interval_ms {
            return fehler("playback.stall_threshold_ms muss >= heartbeat_interval_ms sein".into());
        }
        if p.max_consecutive_stalls == 0 {
            return fehler("playback.max_consecutive_stalls darf nicht 0 sein".into());
        }

        self.gate_config().validieren().map_err(MurmelError::Konfiguration)?;

        if self.streams.idle_timeout_ms == 0 {
            return fehler("streams.idle_timeout_ms darf nicht 0 sein".into());
        }
        if !murmel_observability::log_level_gueltig(&self.logging.level) {
            return fehler(format!("Unbekanntes Log-Level: {}", self.logging.level));
        }
        if !murmel_observability::log_format_gueltig(&self.logging.format) {
            return fehler(format!("Unbekanntes Log-Format: {}", self.logging.format));
        }
        Ok(())
    }

    pub fn frame_format(&self) -> FrameFormat {
        FrameFormat::new(self.audio.sample_rate, self.audio.frame_duration_ms)
    }

    /// Opus-Parameter aus Preset plus optionaler Bitrate
    pub fn opus_config(&self) -> OpusConfig {
        let mut config = self.audio.preset.config();
        if let Some(bitrate) = self.audio.bitrate_kbps {
            config.bitrate_kbps = bitrate;
        }
        config
    }

    pub fn gate_config(&self) -> GateConfig {
        GateConfig {
            enabled: self.vad.enabled,
            adaptive: self.vad.adaptive,
            positive_threshold: self.vad.positive_threshold,
            negative_threshold: self.vad.negative_threshold,
            debounce_ms: self.vad.debounce_ms,
            max_debounce_ms: GateConfig::default().max_debounce_ms.max(self.vad.debounce_ms),
            frame_duration_ms: self.audio.frame_duration_ms,
            ..GateConfig::default()
        }
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            sequencer: SequencerConfig {
                max_gap: self.jitter.max_gap,
                max_packets: self.jitter.max_buffered_packets,
                max_age_ms: self.jitter.packet_max_age_ms,
            },
            scheduler: SchedulerConfig {
                target_delay_secs: f64::from(self.jitter.target_delay_ms) / 1000.0,
                lookahead_secs: f64::from(self.jitter.lookahead_ms) / 1000.0,
                min_start_packets: self.jitter.min_start_packets,
                heartbeat_interval_ms: self.playback.heartbeat_interval_ms,
                stall_threshold_ms: self.playback.stall_threshold_ms,
                max_consecutive_stalls: self.playback.max_consecutive_stalls,
                conceal_max_frames: self.playback.conceal_max_frames,
                ..SchedulerConfig::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ClientConfig::default();
        assert!(cfg.validieren().is_ok());
        assert_eq!(cfg.frame_format().samples_per_frame(), 960);
        assert_eq!(cfg.jitter.max_buffered_packets, 100);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [audio]
            codec = "pcm16"
            frame_duration_ms = 10
            sample_rate = 16000

            [jitter]
            max_gap = 20

            [vad]
            ptt_mode = "hold"
        "#;
        let cfg = ClientConfig::aus_toml(toml).unwrap();
        assert_eq!(cfg.audio.codec, CodecKind::Pcm16);
        assert_eq!(cfg.frame_format().samples_per_frame(), 160);
        assert_eq!(cfg.jitter.max_gap, 20);
        assert_eq!(cfg.vad.ptt_mode, PttMode::Hold);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.jitter.target_delay_ms, 40);
        assert!(cfg.validieren().is_ok());
    }

    #[test]
    fn bitrate_ueberschreibt_preset() {
        let cfg = ClientConfig::aus_toml("[audio]\npreset = \"music\"\nbitrate_kbps = 96\n").unwrap();
        let opus = cfg.opus_config();
        assert_eq!(opus.bitrate_kbps, 96);
        assert!(!opus.dtx_enabled);
    }

    #[test]
    fn ungueltige_werte_werden_abgewiesen() {
        let faelle = [
            "[audio]\nframe_duration_ms = 25\n",
            "[audio]\nsample_rate = 44100\n",
            "[audio]\nbitrate_kbps = 1000\n",
            "[audio]\ncodec = \"pcm16\"\n",
            "[jitter]\nmax_buffered_packets = 0\n",
            "[jitter]\nlookahead_ms = 20\n",
            "[jitter]\nlookahead_ms = 100\n",
            "[playback]\nmax_consecutive_stalls = 0\n",
            "[vad]\nnegative_threshold = 0.5\npositive_threshold = 0.1\n",
            "[logging]\nlevel = \"laut\"\n",
        ];
        for toml in faelle {
            let cfg = ClientConfig::aus_toml(toml).unwrap();
            let fehler = cfg.validieren().unwrap_err();
            assert!(
                matches!(fehler, MurmelError::Konfiguration(_)),
                "{toml}: {fehler}"
            );
        }
    }

    #[test]
    fn horizont_braucht_re_arm_vorlauf() {
        let knapp = ClientConfig::aus_toml("[jitter]\ntarget_delay_ms = 40\nlookahead_ms = 139\n").unwrap();
        assert!(knapp.validieren().is_err());
        let genug = ClientConfig::aus_toml("[jitter]\ntarget_delay_ms = 40\nlookahead_ms = 140\n").unwrap();
        assert!(genug.validieren().is_ok());
    }

    #[test]
    fn unbekannter_codec_ist_parse_fehler() {
        assert!(ClientConfig::aus_toml("[audio]\ncodec = \"mp3\"\n").is_err());
    }

    #[test]
    fn stream_config_rechnet_in_sekunden() {
        let cfg = ClientConfig::default();
        let stream = cfg.stream_config();
        assert!((stream.scheduler.target_delay_secs - 0.04).abs() < 1e-9);
        assert!((stream.scheduler.lookahead_secs - 0.5).abs() < 1e-9);
        assert_eq!(stream.sequencer.max_age_ms, 1_000);
    }

    #[test]
    fn fehlende_datei_liefert_standard() {
        let cfg = ClientConfig::laden("/nonexistent/murmel-test.toml").unwrap();
        assert_eq!(cfg, ClientConfig::default());
    }
}
