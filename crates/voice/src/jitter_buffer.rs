//! Packet Sequencer (Jitter Buffer)
//!
//! Haelt dekodierte Frames eines Remote-Streams nach Sequenznummer und
//! bestimmt den naechsten abzuspielenden Frame. Sequenznummern laufen
//! modulo 2^32; alle Vergleiche erfolgen relativ zur Abspielposition,
//! sodass ein Wrap-Around nie als Verlust oder als alte Daten gilt.
//!
//! ## Regeln
//! - Erstes Paket: `last_played = sequence - 1`
//! - `pop_next` nimmt `last_played + 1`, sonst den in modularer Reihenfolge
//!   naechsten Kandidaten. Luecke <= `max_gap`: Verlust (genau ein Signal,
//!   uebersprungene Nummern werden nie nachgeholt). Groesser: Stream-Reset.
//! - Vor dem ersten `pop_next` darf ein frueheres Paket den Stream neu
//!   verankern.
//! - Pakete an oder hinter der Abspielposition (innerhalb `max_gap`) sind
//!   Duplikate bzw. zu spaet und werden verworfen. Noch weiter zurueck
//!   liegende Pakete gelten als Resync des Senders.
//! - Pakete aelter als `max_age_ms` (Ankunft) werden entfernt, bei mehr als
//!   `max_packets` Paketen wird in modularer Reihenfolge ab der
//!   Abspielposition das aelteste verdraengt.
//!
//! ## Performance
//! - O(log n) Einfuegen und Entnehmen (BTreeMap)
//! - Keine Locks (pro Stream single-threaded verwendet)

use std::collections::BTreeMap;

use murmel_core::types::{AudioFrame, SequencedPacket};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Konfiguration des Sequencers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencerConfig {
    /// Groesste Luecke, die noch als Verlust gilt
    pub max_gap: u32,
    /// Maximale Anzahl gepufferter Pakete
    pub max_packets: usize,
    /// Maximales Alter eines Pakets seit Ankunft (ms)
    pub max_age_ms: u64,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            max_gap: 50,
            max_packets: 100,
            max_age_ms: 1_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Ergebnisse
// ---------------------------------------------------------------------------

/// Unstetigkeit vor einem entnommenen Frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discontinuity {
    /// `lost` Pakete zwischen `expected` und `received` fehlen endgueltig
    Loss { expected: u32, received: u32, lost: u32 },
    /// Sprung groesser als `max_gap`: der Sender hat neu begonnen
    Reset { expected: u32, received: u32 },
}

/// Von `pop_next` entnommener Frame
#[derive(Debug, Clone, PartialEq)]
pub struct PoppedFrame {
    pub sequence: u32,
    pub capture_timestamp_ms: u64,
    pub frame: AudioFrame,
    pub discontinuity: Option<Discontinuity>,
}

/// Ergebnis von `push`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushErgebnis {
    /// Eingefuegt; `verdraengt` Pakete wurden wegen Kapazitaet entfernt
    Eingefuegt { verdraengt: usize },
    /// Bereits gepuffert oder schon abgespielt
    Duplikat,
}

// ---------------------------------------------------------------------------
// Statistiken
// ---------------------------------------------------------------------------

/// Statistiken des Sequencers (Snapshot)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequencerStatistik {
    /// Empfangene Pakete gesamt
    pub empfangen: u64,
    /// Entnommene Frames
    pub abgespielt: u64,
    /// Verworfene Duplikate und verspaetete Pakete
    pub duplikate: u64,
    /// Als verloren gemeldete Sequenznummern
    pub verloren: u64,
    /// Stream-Resets
    pub resets: u64,
    /// Wegen Kapazitaet verdraengte Pakete
    pub verdraengt: u64,
    /// Wegen Alter entfernte Pakete
    pub abgelaufen: u64,
    /// Standardabweichung der Transitzeit in ms
    pub jitter_ms: f64,
    /// Aktueller Fuellstand
    pub fuellstand: usize,
}

// ---------------------------------------------------------------------------
// PacketSequencer
// ---------------------------------------------------------------------------

/// Jitter Buffer eines Remote-Streams
pub struct PacketSequencer {
    config: SequencerConfig,
    pakete: BTreeMap<u32, SequencedPacket>,
    /// Zuletzt abgespielte Sequenznummer (bzw. Anker vor dem ersten Pop)
    last_played: Option<u32>,
    /// Erste gesehene Sequenznummer seit dem letzten Reset
    first_seen: Option<u32>,
    /// Mindestens ein Frame wurde entnommen
    gestartet: bool,
    statistik: SequencerStatistik,
    jitter_mittel: f64,
    jitter_m2: f64,
    jitter_n: u64,
}

impl PacketSequencer {
    pub fn neu(config: SequencerConfig) -> Self {
        Self {
            config,
            pakete: BTreeMap::new(),
            last_played: None,
            first_seen: None,
            gestartet: false,
            statistik: SequencerStatistik::default(),
            jitter_mittel: 0.0,
            jitter_m2: 0.0,
            jitter_n: 0,
        }
    }

    pub fn standard() -> Self {
        Self::neu(SequencerConfig::default())
    }

    /// Fuegt ein Paket ein
    ///
    /// Die Ankunftszeit des Pakets dient gleichzeitig als aktuelle Zeit fuer
    /// die Alterspruefung.
    pub fn push(&mut self, paket: SequencedPacket) -> PushErgebnis {
        let seq = paket.sequence;
        self.statistik.empfangen += 1;
        self.evict_expired(paket.arrival_timestamp_ms);

        match self.last_played {
            None => {
                self.last_played = Some(seq.wrapping_sub(1));
                self.first_seen = Some(seq);
                debug!(sequence = seq, "Stream verankert");
            }
            Some(_) => {
                if self.hinter_position(seq) {
                    if self.gestartet {
                        self.statistik.duplikate += 1;
                        trace!(sequence = seq, "Verspaetetes Paket verworfen");
                        return PushErgebnis::Duplikat;
                    }
                    if !self.pakete.contains_key(&seq) {
                        self.last_played = Some(seq.wrapping_sub(1));
                        self.first_seen = Some(seq);
                        debug!(sequence = seq, "Stream vor Wiedergabebeginn neu verankert");
                    }
                }
            }
        }

        if self.pakete.contains_key(&seq) {
            self.statistik.duplikate += 1;
            trace!(sequence = seq, "Duplikat verworfen");
            return PushErgebnis::Duplikat;
        }

        self.jitter_messen(paket.transit_ms());
        self.pakete.insert(seq, paket);

        let mut verdraengt = 0;
        while self.pakete.len() > self.config.max_packets {
            let Some(aelteste) = self.naechster_kandidat() else {
                break;
            };
            self.pakete.remove(&aelteste);
            verdraengt += 1;
            self.statistik.verdraengt += 1;
            debug!(sequence = aelteste, "Buffer voll, aeltestes Paket verdraengt");
        }

        self.statistik.fuellstand = self.pakete.len();
        PushErgebnis::Eingefuegt { verdraengt }
    }

    /// Prueft ohne Zustandsaenderung, ob `push` das Paket verwerfen wuerde
    pub fn ist_duplikat(&self, seq: u32) -> bool {
        self.pakete.contains_key(&seq) || (self.gestartet && self.hinter_position(seq))
    }

    /// Verwirft ein Duplikat schon vor dem Dekodieren
    ///
    /// Liefert `true` und zaehlt das Paket, wenn es ein Duplikat ist. Der
    /// Decoder des Streams sieht das Paket dann nie.
    pub fn duplikat_verwerfen(&mut self, seq: u32) -> bool {
        if !self.ist_duplikat(seq) {
            return false;
        }
        self.statistik.empfangen += 1;
        self.statistik.duplikate += 1;
        trace!(sequence = seq, "Duplikat vor dem Dekodieren verworfen");
        true
    }

    /// Liegt `seq` hoechstens `max_gap` hinter der Wiedergabeposition
    fn hinter_position(&self, seq: u32) -> bool {
        let Some(letzte) = self.last_played else {
            return false;
        };
        let rueckstand = letzte.wrapping_add(1).wrapping_sub(seq);
        rueckstand >= 1 && rueckstand <= self.config.max_gap
    }

    /// Entnimmt den naechsten Frame in Sequenzreihenfolge
    ///
    /// Ein leerer Buffer ist normal und liefert `None` ohne Meldung.
    pub fn pop_next(&mut self) -> Option<PoppedFrame> {
        let letzte = self.last_played?;
        let erwartet = letzte.wrapping_add(1);

        if let Some(paket) = self.pakete.remove(&erwartet) {
            return Some(self.entnommen(paket, None));
        }

        let kandidat = self.naechster_kandidat()?;
        let paket = self.pakete.remove(&kandidat)?;
        let luecke = kandidat.wrapping_sub(erwartet);

        let discontinuity = if luecke <= self.config.max_gap {
            self.statistik.verloren += u64::from(luecke);
            warn!(erwartet, erhalten = kandidat, verloren = luecke, "Pakete verloren");
            Discontinuity::Loss {
                expected: erwartet,
                received: kandidat,
                lost: luecke,
            }
        } else {
            self.statistik.resets += 1;
            self.first_seen = Some(kandidat);
            debug!(erwartet, erhalten = kandidat, "Sequenzsprung, Stream-Reset");
            Discontinuity::Reset {
                expected: erwartet,
                received: kandidat,
            }
        };

        Some(self.entnommen(paket, Some(discontinuity)))
    }

    fn entnommen(&mut self, paket: SequencedPacket, discontinuity: Option<Discontinuity>) -> PoppedFrame {
        self.last_played = Some(paket.sequence);
        self.gestartet = true;
        self.statistik.abgespielt += 1;
        self.statistik.fuellstand = self.pakete.len();
        trace!(sequence = paket.sequence, "Frame entnommen");
        PoppedFrame {
            sequence: paket.sequence,
            capture_timestamp_ms: paket.capture_timestamp_ms,
            frame: paket.frame,
            discontinuity,
        }
    }

    /// Naechste gepufferte Sequenznummer in modularer Reihenfolge ab
    /// `last_played + 1`
    fn naechster_kandidat(&self) -> Option<u32> {
        let erwartet = self.last_played?.wrapping_add(1);
        self.pakete
            .range(erwartet..)
            .next()
            .or_else(|| self.pakete.range(..erwartet).next())
            .map(|(&seq, _)| seq)
    }

    /// Entfernt Pakete, deren Ankunft laenger als `max_age_ms` zurueckliegt
    pub fn evict_expired(&mut self, now_ms: u64) -> usize {
        let max_age = self.config.max_age_ms;
        let vorher = self.pakete.len();
        self.pakete
            .retain(|_, p| now_ms.saturating_sub(p.arrival_timestamp_ms) <= max_age);
        let entfernt = vorher - self.pakete.len();
        if entfernt > 0 {
            self.statistik.abgelaufen += entfernt as u64;
            self.statistik.fuellstand = self.pakete.len();
            debug!(entfernt, "Abgelaufene Pakete entfernt");
        }
        entfernt
    }

    /// Leert den Buffer und vergisst die Sequenzposition
    ///
    /// Das naechste Paket verankert den Stream neu. Statistiken bleiben.
    pub fn reset(&mut self) {
        self.pakete.clear();
        self.last_played = None;
        self.first_seen = None;
        self.gestartet = false;
        self.statistik.fuellstand = 0;
    }

    pub fn len(&self) -> usize {
        self.pakete.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pakete.is_empty()
    }

    pub fn last_played(&self) -> Option<u32> {
        self.last_played
    }

    pub fn first_seen(&self) -> Option<u32> {
        self.first_seen
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    pub fn statistik(&self) -> &SequencerStatistik {
        &self.statistik
    }

    /// Standardabweichung der Transitzeit in ms
    pub fn jitter_ms(&self) -> f64 {
        if self.jitter_n < 2 {
            return 0.0;
        }
        (self.jitter_m2 / (self.jitter_n - 1) as f64).sqrt()
    }

    /// Welford-Online-Algorithmus (numerisch stabil)
    fn jitter_messen(&mut self, transit_ms: i64) {
        let wert = transit_ms as f64;
        self.jitter_n += 1;
        let delta = wert - self.jitter_mittel;
        self.jitter_mittel += delta / self.jitter_n as f64;
        let delta2 = wert - self.jitter_mittel;
        self.jitter_m2 += delta * delta2;
        self.statistik.jitter_ms = self.jitter_ms();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
