//! Packet Loss Concealment (PLC)
//!
//! Fuellt die Zeit verlorener Pakete mit Ersatz-Audio, damit das Render-
//! Timing lueckenlos bleibt.
//!
//! ## Strategien
//! 1. **Wiederholung mit Fade**: der letzte gueltige Frame wird wiederholt,
//!    mit abnehmendem Pegel pro Wiederholung
//! 2. **Stille**: nach `MAX_WIEDERHOLUNGEN` aufeinanderfolgenden Ersatz-Frames
//!
//! Bei einem Stream-Reset wird nie verdeckt.

use murmel_core::types::AudioFrame;

/// Maximale Anzahl von Wiederholungen vor dem Uebergang zu Stille
pub const MAX_WIEDERHOLUNGEN: u32 = 3;

/// Fade-Faktor pro Wiederholung (0.75 = 25% Abnahme pro Frame)
pub const FADE_FAKTOR: f32 = 0.75;

/// PLC-Statistiken
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlcStatistik {
    /// Eingefuegte Wiederholungen
    pub wiederholungen: u64,
    /// Eingefuegte Stille-Frames
    pub stille_eingefuegt: u64,
}

impl PlcStatistik {
    pub fn gesamt(&self) -> u64 {
        self.wiederholungen + self.stille_eingefuegt
    }
}

/// Verdeckt Verluste eines Streams
pub struct PacketLossConcealer {
    /// Hoechstens so viele Ersatz-Frames pro Verlust (0 = aus)
    max_frames: u32,
    frame_len: usize,
    letzter_frame: Option<AudioFrame>,
    aufeinanderfolgend: u32,
    statistik: PlcStatistik,
}

impl PacketLossConcealer {
    pub fn neu(max_frames: u32, frame_len: usize) -> Self {
        Self {
            max_frames,
            frame_len,
            letzter_frame: None,
            aufeinanderfolgend: 0,
            statistik: PlcStatistik::default(),
        }
    }

    /// Merkt sich einen echten Frame als Vorlage fuer Wiederholungen
    pub fn frame_merken(&mut self, frame: &AudioFrame) {
        self.letzter_frame = Some(frame.clone());
        self.aufeinanderfolgend = 0;
    }

    /// Liefert die Ersatz-Frames fuer `verloren` fehlende Pakete
    pub fn verdecken(&mut self, verloren: u32) -> Vec<AudioFrame> {
        let anzahl = verloren.min(self.max_frames);
        let mut frames = Vec::with_capacity(anzahl as usize);
        for _ in 0..anzahl {
            frames.push(self.naechster_ersatz());
        }
        frames
    }

    fn naechster_ersatz(&mut self) -> AudioFrame {
        self.aufeinanderfolgend += 1;
        match &self.letzter_frame {
            Some(letzter) if self.aufeinanderfolgend <= MAX_WIEDERHOLUNGEN => {
                self.statistik.wiederholungen += 1;
                letzter.scaled(FADE_FAKTOR.powi(self.aufeinanderfolgend as i32))
            }
            _ => {
                self.statistik.stille_eingefuegt += 1;
                AudioFrame::silence(self.frame_len)
            }
        }
    }

    /// Vergisst den letzten Frame (nach Reset)
    pub fn zuruecksetzen(&mut self) {
        self.letzter_frame = None;
        self.aufeinanderfolgend = 0;
    }

    pub fn statistik(&self) -> &PlcStatistik {
        &self.statistik
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wiederholung_mit_fade_dann_stille() {
        let mut plc = PacketLossConcealer::neu(5, 2);
        plc.frame_merken(&AudioFrame::new(vec![1.0, -1.0]));
        let frames = plc.verdecken(5);
        assert_eq!(frames.len(), 5);
        assert!((frames[0].samples()[0] - 0.75).abs() < 1e-6);
        assert!((frames[1].samples()[0] - 0.5625).abs() < 1e-6);
        assert!((frames[2].samples()[1] + 0.421875).abs() < 1e-6);
        assert!(frames[3].is_silent());
        assert!(frames[4].is_silent());
        assert_eq!(plc.statistik().wiederholungen, 3);
        assert_eq!(plc.statistik().stille_eingefuegt, 2);
    }

    #[test]
    fn begrenzt_auf_max_frames() {
        let mut plc = PacketLossConcealer::neu(3, 4);
        plc.frame_merken(&AudioFrame::new(vec![0.5; 4]));
        assert_eq!(plc.verdecken(40).len(), 3);
        assert_eq!(plc.verdecken(1).len(), 1);
    }

    #[test]
    fn echter_frame_setzt_fade_zurueck() {
        let mut plc = PacketLossConcealer::neu(3, 1);
        plc.frame_merken(&AudioFrame::new(vec![1.0]));
        plc.verdecken(2);
        plc.frame_merken(&AudioFrame::new(vec![1.0]));
        let frames = plc.verdecken(1);
        assert!((frames[0].samples()[0] - 0.75).abs() < 1e-6);
    }

    #[test]
    fn ohne_vorlage_stille() {
        let mut plc = PacketLossConcealer::neu(3, 8);
        let frames = plc.verdecken(2);
        assert!(frames.iter().all(|f| f.is_silent() && f.len() == 8));
    }

    #[test]
    fn deaktiviert_liefert_nichts() {
        let mut plc = PacketLossConcealer::neu(0, 8);
        plc.frame_merken(&AudioFrame::new(vec![1.0; 8]));
        assert!(plc.verdecken(3).is_empty());
        assert_eq!(plc.statistik().gesamt(), 0);
    }
}
