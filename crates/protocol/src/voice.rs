//! Voice-Frames (Binaerformat)
//!
//! Der Transport ist nachrichtenorientiert: jede Nachricht enthaelt genau
//! einen Frame. Sequenznummer und Zeitstempel kommen vom Netzwerk und
//! werden als nicht vertrauenswuerdige Ganzzahlen behandelt.
//!
//! ## Eingehend (Netzwerk -> Client), Header = 16 Bytes + Schluessel
//!
//! ```text
//! Offset  Len  Beschreibung
//! ------  ---  -----------
//!  0       1   Version
//!  1       1   Flags (siehe `FrameFlags`)
//!  2       2   Laenge des Stream-Schluessels K (big-endian)
//!  4       4   Sequenznummer (big-endian)
//!  8       8   Aufnahme-Zeitstempel in ms (big-endian)
//! 16       K   Stream-Schluessel (UTF-8)
//! 16+K     N   Nutzdaten (Codec-Bytes)
//! ```
//!
//! ## Ausgehend (Client -> Netzwerk), Header = 16 Bytes
//!
//! ```text
//!  0       1   Version
//!  1       1   Flags
//!  2       2   reserviert (0)
//!  4       4   Sequenznummer (big-endian)
//!  8       8   Aufnahme-Zeitstempel in ms (big-endian)
//! 16       N   Nutzdaten
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use murmel_core::types::{CompressedFrame, StreamKey};
use std::io;

/// Aktuelle Protokollversion
pub const PROTOKOLL_VERSION: u8 = 1;

/// Maximale Nutzdaten-Laenge (1280 Bytes, typisches Opus-MTU-Limit)
pub const MAX_NUTZDATEN_LAENGE: usize = 1280;

/// Maximale Laenge eines Stream-Schluessels in Bytes
pub const MAX_STREAM_KEY_LAENGE: usize = 255;

/// Groesse der festen Header in Bytes
pub const HEADER_SIZE: usize = 16;

// ---------------------------------------------------------------------------
// Flags
// ---------------------------------------------------------------------------

/// Bit-Masken fuer das Flags-Byte
pub struct FrameFlags;

impl FrameFlags {
    /// Erster Frame einer Sprechsequenz
    pub const SPEAKING_START: u8 = 0x01;
    /// Letzter Frame einer Sprechsequenz
    pub const SPEAKING_STOP: u8 = 0x02;
}

fn ungueltig(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

fn version_pruefen(version: u8) -> io::Result<()> {
    if version != PROTOKOLL_VERSION {
        return Err(ungueltig(format!(
            "Ungueltige Protokollversion: {} (erwartet {})",
            version, PROTOKOLL_VERSION
        )));
    }
    Ok(())
}

fn nutzdaten_pruefen(len: usize) -> io::Result<()> {
    if len > MAX_NUTZDATEN_LAENGE {
        return Err(ungueltig(format!(
            "Nutzdaten zu lang: {} Bytes (Maximum {})",
            len, MAX_NUTZDATEN_LAENGE
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// InboundFrame
// ---------------------------------------------------------------------------

/// Eingehender Frame eines Remote-Streams
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    /// Logischer Stream-Schluessel
    pub stream_key: StreamKey,
    /// Sequenznummer (modulo 2^32)
    pub sequence: u32,
    /// Aufnahme-Zeitstempel des Senders in ms
    pub capture_timestamp_ms: u64,
    /// Flags-Bitmaske (siehe `FrameFlags`)
    pub flags: u8,
    /// Codec-Nutzdaten
    pub payload: Bytes,
}

impl InboundFrame {
    /// Erstellt einen eingehenden Frame ohne Flags
    pub fn new(
        stream_key: impl Into<StreamKey>,
        sequence: u32,
        capture_timestamp_ms: u64,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            stream_key: stream_key.into(),
            sequence,
            capture_timestamp_ms,
            flags: 0,
            payload: payload.into(),
        }
    }

    /// Serialisiert den Frame (big-endian)
    ///
    /// # Fehler
    /// - `InvalidData` wenn Schluessel oder Nutzdaten die Limits verletzen
    pub fn encode(&self) -> io::Result<Bytes> {
        let key = self.stream_key.as_str().as_bytes();
        if key.is_empty() || key.len() > MAX_STREAM_KEY_LAENGE {
            return Err(ungueltig(format!(
                "Stream-Schluessel muss 1..={} Bytes lang sein (war {})",
                MAX_STREAM_KEY_LAENGE,
                key.len()
            )));
        }
        nutzdaten_pruefen(self.payload.len())?;

        let mut buf = BytesMut::with_capacity(HEADER_SIZE + key.len() + self.payload.len());
        buf.put_u8(PROTOKOLL_VERSION);
        buf.put_u8(self.flags);
        buf.put_u16(key.len() as u16);
        buf.put_u32(self.sequence);
        buf.put_u64(self.capture_timestamp_ms);
        buf.put_slice(key);
        buf.put_slice(&self.payload);
        Ok(buf.freeze())
    }

    /// Deserialisiert und validiert einen Frame
    ///
    /// # Fehler
    /// - `InvalidData` bei zu kurzem Puffer, falscher Version, leerem oder
    ///   nicht-UTF-8 Schluessel oder zu langen Nutzdaten
    pub fn decode(buf: &[u8]) -> io::Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(ungueltig(format!(
                "Header zu kurz: {} Bytes (erwartet {})",
                buf.len(),
                HEADER_SIZE
            )));
        }

        let mut cur = buf;
        version_pruefen(cur.get_u8())?;
        let flags = cur.get_u8();
        let key_len = cur.get_u16() as usize;
        let sequence = cur.get_u32();
        let capture_timestamp_ms = cur.get_u64();

        if key_len == 0 || key_len > MAX_STREAM_KEY_LAENGE {
            return Err(ungueltig(format!(
                "Ungueltige Schluessel-Laenge: {}",
                key_len
            )));
        }
        if cur.remaining() < key_len {
            return Err(ungueltig(format!(
                "Schluessel abgeschnitten: {} von {} Bytes",
                cur.remaining(),
                key_len
            )));
        }

        let key = std::str::from_utf8(&cur[..key_len])
            .map_err(|e| ungueltig(format!("Schluessel ist kein UTF-8: {}", e)))?
            .to_string();
        cur.advance(key_len);

        nutzdaten_pruefen(cur.remaining())?;

        Ok(Self {
            stream_key: StreamKey::new(key),
            sequence,
            capture_timestamp_ms,
            flags,
            payload: Bytes::copy_from_slice(cur),
        })
    }

    /// Kodierter Frame fuer die Codec-Pipeline
    pub fn compressed(&self) -> CompressedFrame {
        CompressedFrame::new(self.sequence, self.capture_timestamp_ms, self.payload.clone())
    }

    /// Prueft ob ein Flag gesetzt ist
    pub fn hat_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }
}

// ---------------------------------------------------------------------------
// OutboundFrame
// ---------------------------------------------------------------------------

/// Ausgehender Frame des lokalen Mikrofons
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    /// Sequenznummer (nur fuer tatsaechlich gesendete Frames erhoeht)
    pub sequence: u32,
    /// Aufnahme-Zeitstempel in ms
    pub capture_timestamp_ms: u64,
    /// Flags-Bitmaske (siehe `FrameFlags`)
    pub flags: u8,
    /// Codec-Nutzdaten
    pub payload: Bytes,
}

impl OutboundFrame {
    /// Erstellt einen ausgehenden Frame aus einem kodierten Frame
    pub fn from_compressed(frame: CompressedFrame, flags: u8) -> Self {
        Self {
            sequence: frame.sequence,
            capture_timestamp_ms: frame.capture_timestamp_ms,
            flags,
            payload: frame.payload,
        }
    }

    /// Serialisiert den Frame (big-endian)
    pub fn encode(&self) -> io::Result<Bytes> {
        nutzdaten_pruefen(self.payload.len())?;
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        buf.put_u8(PROTOKOLL_VERSION);
        buf.put_u8(self.flags);
        buf.put_u16(0);
        buf.put_u32(self.sequence);
        buf.put_u64(self.capture_timestamp_ms);
        buf.put_slice(&self.payload);
        Ok(buf.freeze())
    }

    /// Deserialisiert und validiert einen Frame
    pub fn decode(buf: &[u8]) -> io::Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(ungueltig(format!(
                "Header zu kurz: {} Bytes (erwartet {})",
                buf.len(),
                HEADER_SIZE
            )));
        }
        let mut cur = buf;
        version_pruefen(cur.get_u8())?;
        let flags = cur.get_u8();
        let _reserviert = cur.get_u16();
        let sequence = cur.get_u32();
        let capture_timestamp_ms = cur.get_u64();
        nutzdaten_pruefen(cur.remaining())?;

        Ok(Self {
            sequence,
            capture_timestamp_ms,
            flags,
            payload: Bytes::copy_from_slice(cur),
        })
    }

    /// Wandelt einen gesendeten Frame in einen eingehenden Frame eines
    /// Streams um (Loopback, Server-Weiterleitung in Tests)
    pub fn als_eingehend(&self, stream_key: impl Into<StreamKey>) -> InboundFrame {
        InboundFrame {
            stream_key: stream_key.into(),
            sequence: self.sequence,
            capture_timestamp_ms: self.capture_timestamp_ms,
            flags: self.flags,
            payload: self.payload.clone(),
        }
    }

    /// Prueft ob ein Flag gesetzt ist
    pub fn hat_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
