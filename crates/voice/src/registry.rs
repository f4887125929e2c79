//! Stream-Registry – Remote-Streams als Arena mit Generationen
//!
//! Jeder Remote-Stream belegt einen Slot. `StreamId` = Slot-Index plus
//! Generation; nach dem Freigeben wird die Generation erhoeht, sodass
//! veraltete IDs (z.B. aus bereits eingeplanten Timern) ins Leere laufen.
//! Der externe `StreamKey` wird ueber einen Index auf die ID abgebildet.
//!
//! Die Registry gehoert genau einer Session und ist nicht thread-safe.

use std::collections::HashMap;

use murmel_core::types::{FrameFormat, StreamId, StreamKey};
use tracing::{debug, info};

use crate::jitter_buffer::{PacketSequencer, SequencerConfig};
use crate::scheduler::{PlaybackScheduler, SchedulerConfig};

// ---------------------------------------------------------------------------
// Arena
// ---------------------------------------------------------------------------

struct Slot<T> {
    generation: u32,
    eintrag: Option<(StreamKey, T)>,
}

/// Slot-Arena mit Generationszaehler und Key-Index
pub struct StreamArena<T> {
    slots: Vec<Slot<T>>,
    frei: Vec<u32>,
    index: HashMap<StreamKey, StreamId>,
}

impl<T> StreamArena<T> {
    pub fn neu() -> Self {
        Self {
            slots: Vec::new(),
            frei: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Liefert den Stream zu `key` oder legt ihn mit `erzeugen` an
    ///
    /// Der bool ist `true`, wenn der Stream neu angelegt wurde.
    pub fn get_or_insert_with<F>(&mut self, key: &StreamKey, erzeugen: F) -> (StreamId, bool)
    where
        F: FnOnce(StreamId) -> T,
    {
        if let Some(id) = self.index.get(key) {
            return (*id, false);
        }

        let slot_index = match self.frei.pop() {
            Some(i) => i,
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    eintrag: None,
                });
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[slot_index as usize];
        let id = StreamId::new(slot_index, slot.generation);
        slot.eintrag = Some((key.clone(), erzeugen(id)));
        self.index.insert(key.clone(), id);
        debug!(%key, %id, "Stream-Slot belegt");
        (id, true)
    }

    pub fn lookup(&self, key: &StreamKey) -> Option<StreamId> {
        self.index.get(key).copied()
    }

    fn slot(&self, id: StreamId) -> Option<&Slot<T>> {
        self.slots
            .get(id.index())
            .filter(|s| s.generation == id.generation())
    }

    pub fn get(&self, id: StreamId) -> Option<&T> {
        self.slot(id)?.eintrag.as_ref().map(|(_, t)| t)
    }

    pub fn get_mut(&mut self, id: StreamId) -> Option<&mut T> {
        self.slots
            .get_mut(id.index())
            .filter(|s| s.generation == id.generation())?
            .eintrag
            .as_mut()
            .map(|(_, t)| t)
    }

    pub fn key(&self, id: StreamId) -> Option<&StreamKey> {
        self.slot(id)?.eintrag.as_ref().map(|(k, _)| k)
    }

    /// Gibt den Slot frei und erhoeht die Generation
    pub fn retire(&mut self, id: StreamId) -> Option<(StreamKey, T)> {
        let slot = self
            .slots
            .get_mut(id.index())
            .filter(|s| s.generation == id.generation())?;
        let (key, wert) = slot.eintrag.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.frei.push(id.index() as u32);
        self.index.remove(&key);
        debug!(%key, %id, "Stream-Slot freigegeben");
        Some((key, wert))
    }

    pub fn retire_key(&mut self, key: &StreamKey) -> Option<(StreamId, T)> {
        let id = self.lookup(key)?;
        self.retire(id).map(|(_, t)| (id, t))
    }

    /// Snapshot aller aktiven IDs (erlaubt Mutation waehrend der Iteration)
    pub fn ids(&self) -> Vec<StreamId> {
        self.index.values().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StreamId, &StreamKey, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.eintrag
                .as_ref()
                .map(|(k, t)| (StreamId::new(i as u32, slot.generation), k, t))
        })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

impl<T> Default for StreamArena<T> {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// RemoteStream
// ---------------------------------------------------------------------------

/// Konfiguration fuer neu angelegte Remote-Streams
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamConfig {
    pub sequencer: SequencerConfig,
    pub scheduler: SchedulerConfig,
}

/// Empfangszustand eines Remote-Streams: Sequencer plus Scheduler
pub struct RemoteStream {
    pub sequencer: PacketSequencer,
    pub scheduler: PlaybackScheduler,
    /// Letztes empfangenes Paket (Wandzeit ms)
    pub last_activity_ms: u64,
}

impl RemoteStream {
    pub fn neu(config: &StreamConfig, format: FrameFormat, now_ms: u64) -> Self {
        Self {
            sequencer: PacketSequencer::neu(config.sequencer.clone()),
            scheduler: PlaybackScheduler::neu(config.scheduler.clone(), format, now_ms),
            last_activity_ms: now_ms,
        }
    }

    /// Prueft ob der Stream laenger als `timeout_ms` nichts empfangen hat
    pub fn ist_inaktiv(&self, now_ms: u64, timeout_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_activity_ms) > timeout_ms
    }
}

/// Registry aller Remote-Streams einer Session
pub type StreamRegistry = StreamArena<RemoteStream>;

/// Entfernt inaktive Streams und liefert ihre IDs und Schluessel
pub fn inaktive_bereinigen(
    registry: &mut StreamRegistry,
    now_ms: u64,
    timeout_ms: u64,
) -> Vec<(StreamId, StreamKey, RemoteStream)> {
    let inaktive: Vec<StreamId> = registry
        .iter()
        .filter(|(_, _, s)| s.ist_inaktiv(now_ms, timeout_ms))
        .map(|(id, _, _)| id)
        .collect();

    inaktive
        .into_iter()
        .filter_map(|id| {
            let (key, stream) = registry.retire(id)?;
            info!(%key, %id, "Inaktiver Stream entfernt (Timeout)");
            Some((id, key, stream))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gleicher_key_gleiche_id() {
        let mut arena: StreamArena<u32> = StreamArena::neu();
        let key = StreamKey::from("alice");
        let (a, neu_a) = arena.get_or_insert_with(&key, |_| 1);
        let (b, neu_b) = arena.get_or_insert_with(&key, |_| 2);
        assert_eq!(a, b);
        assert!(neu_a);
        assert!(!neu_b);
        assert_eq!(arena.get(a), Some(&1));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn veraltete_id_nach_retire_ungueltig() {
        let mut arena: StreamArena<&str> = StreamArena::neu();
        let (alt, _) = arena.get_or_insert_with(&StreamKey::from("alice"), |_| "a");
        assert_eq!(arena.retire(alt), Some((StreamKey::from("alice"), "a")));
        assert!(arena.get(alt).is_none());
        assert!(arena.retire(alt).is_none());

        let (neu, _) = arena.get_or_insert_with(&StreamKey::from("bob"), |_| "b");
        assert_eq!(neu.index(), alt.index());
        assert_ne!(neu, alt);
        assert!(arena.get(alt).is_none());
        assert_eq!(arena.get(neu), Some(&"b"));
        assert_eq!(arena.key(neu), Some(&StreamKey::from("bob")));
    }

    #[test]
    fn erzeuger_bekommt_eigene_id() {
        let mut arena: StreamArena<StreamId> = StreamArena::neu();
        let (id, _) = arena.get_or_insert_with(&StreamKey::from("x"), |id| id);
        assert_eq!(arena.get(id), Some(&id));
    }

    #[test]
    fn retire_per_key() {
        let mut arena: StreamArena<u8> = StreamArena::neu();
        let key = StreamKey::from("mix");
        let (id, _) = arena.get_or_insert_with(&key, |_| 7);
        assert_eq!(arena.retire_key(&key), Some((id, 7)));
        assert!(arena.lookup(&key).is_none());
        assert!(arena.is_empty());
        assert!(arena.retire_key(&key).is_none());
    }

    #[test]
    fn inaktive_streams_werden_entfernt() {
        let mut registry = StreamRegistry::neu();
        let config = StreamConfig::default();
        let format = FrameFormat::default();
        let (alt, _) = registry.get_or_insert_with(&StreamKey::from("alt"), |_| {
            RemoteStream::neu(&config, format, 0)
        });
        let (frisch, _) = registry.get_or_insert_with(&StreamKey::from("frisch"), |_| {
            RemoteStream::neu(&config, format, 25_000)
        });

        let entfernt = inaktive_bereinigen(&mut registry, 31_000, 30_000);
        assert_eq!(entfernt.len(), 1);
        assert_eq!(entfernt[0].0, alt);
        assert_eq!(entfernt[0].1, StreamKey::from("alt"));
        assert!(registry.get(frisch).is_some());
        assert_eq!(registry.len(), 1);
    }
}
