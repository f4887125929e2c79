//! Kalibrierung des Rauschbodens
//!
//! Misst den Umgebungspegel aus einer Stille-Aufnahme und setzt damit den
//! Startwert des Voice Activity Gates.

use crate::dsp::vad::{rms_energy, VoiceActivityGate};
use crate::error::{AudioError, AudioResult};

/// Ergebnis einer Kalibrierungsmessung
#[derive(Debug, Clone)]
pub struct CalibrationResult {
    /// Gemessener Rauschboden (RMS, linear)
    pub noise_floor_rms: f32,
    /// Gemessener Rauschboden in dBFS
    pub noise_floor_db: f32,
    /// Empfohlene positive Schwelle (linear)
    pub suggested_positive: f32,
    /// Empfohlene negative Schwelle (linear)
    pub suggested_negative: f32,
    /// Anzahl der gemessenen Frames
    pub frames_measured: u32,
    /// Peak-Pegel waehrend der Messung in dBFS
    pub peak_db: f32,
}

impl CalibrationResult {
    /// Uebernimmt den gemessenen Rauschboden ins Gate
    pub fn auf_gate_anwenden(&self, gate: &mut VoiceActivityGate) {
        gate.seed_noise_floor(self.noise_floor_rms);
    }
}

/// Kalibriert den Rauschboden aus PCM-Samples
///
/// `samples` sollte Stille oder Umgebungsgeraeusch enthalten und wird in
/// Frames zu `frame_size` Samples zerlegt; ein unvollstaendiger Rest wird
/// ignoriert.
pub fn calibrate_from_samples(samples: &[f32], frame_size: usize) -> AudioResult<CalibrationResult> {
    if samples.is_empty() || frame_size == 0 {
        return Err(AudioError::Konfiguration(
            "Samples und Frame-Groesse muessen > 0 sein".to_string(),
        ));
    }
    if samples.len() < frame_size {
        return Err(AudioError::Konfiguration(format!(
            "Zu wenige Samples fuer Kalibrierung: {} < {}",
            samples.len(),
            frame_size
        )));
    }

    let mut energies: Vec<f32> = Vec::new();
    let mut peak: f32 = 0.0;
    for chunk in samples.chunks_exact(frame_size) {
        energies.push(rms_energy(chunk));
        peak = chunk.iter().map(|s| s.abs()).fold(peak, f32::max);
    }

    if energies.is_empty() {
        return Err(AudioError::KalibrierungsTimeout);
    }

    // Mittelwert der unteren 75% (ignoriert Spitzen)
    energies.sort_by(|a, b| a.total_cmp(b));
    let cutoff = (energies.len() * 3 / 4).max(1);
    let noise_floor_rms: f32 = energies[..cutoff].iter().sum::<f32>() / cutoff as f32;

    Ok(CalibrationResult {
        noise_floor_rms,
        noise_floor_db: linear_to_db(noise_floor_rms),
        suggested_positive: noise_floor_rms * 4.0,
        suggested_negative: noise_floor_rms * 2.5,
        frames_measured: energies.len() as u32,
        peak_db: linear_to_db(peak),
    })
}

pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        return -100.0;
    }
    20.0 * linear.log10()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::vad::GateConfig;

    #[test]
    fn kalibrierung_stille() {
        let samples = vec![0.001f32; 48000];
        let result = calibrate_from_samples(&samples, 960).unwrap();
        assert!(result.noise_floor_db < -40.0);
        assert_eq!(result.frames_measured, 50);
        assert!(result.suggested_positive > result.suggested_negative);
    }

    #[test]
    fn spitzen_werden_ignoriert() {
        let mut samples = vec![0.01f32; 9600];
        // Ein lauter Frame von zehn
        for s in samples[..960].iter_mut() {
            *s = 0.9;
        }
        let result = calibrate_from_samples(&samples, 960).unwrap();
        assert!((result.noise_floor_rms - 0.01).abs() < 1e-4);
        assert!(result.peak_db > -1.0);
    }

    #[test]
    fn ungueltige_eingaben() {
        assert!(calibrate_from_samples(&[], 480).is_err());
        assert!(calibrate_from_samples(&[0.1f32; 100], 480).is_err());
        assert!(calibrate_from_samples(&[0.1f32; 1000], 0).is_err());
    }

    #[test]
    fn gate_wird_gesetzt() {
        let result = calibrate_from_samples(&vec![0.004f32; 9600], 960).unwrap();
        let mut gate = VoiceActivityGate::new(GateConfig::default());
        result.auf_gate_anwenden(&mut gate);
        assert!((gate.noise_floor() - 0.004).abs() < 1e-5);
    }

    #[test]
    fn linear_to_db_korrekt() {
        assert!((linear_to_db(1.0) - 0.0).abs() < 0.01);
        assert!((linear_to_db(0.1) - (-20.0)).abs() < 0.01);
        assert_eq!(linear_to_db(0.0), -100.0);
    }
}
