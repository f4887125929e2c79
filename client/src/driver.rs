//! Tokio-Treiber fuer eine `VoiceSession`
//!
//! Die gesamte Sitzung laeuft in einem Task. `tokio::select!` wartet auf
//! eingehende Pakete, Aufnahme-Frames, Steuersignale, den Heartbeat und den
//! naechsten Re-Arm-Zeitpunkt. Ereignisse werden nach jedem Schritt an den
//! optionalen Ereigniskanal weitergereicht.

use std::time::Duration;

use bytes::Bytes;
use murmel_core::clock::AudioClock;
use murmel_core::event::AudioEvent;
use murmel_core::types::AudioFrame;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::session::VoiceSession;

/// Kuerzeste Wartezeit bis zum Re-Arm-Timer
const MIN_WECKABSTAND: Duration = Duration::from_millis(1);

/// Intervall fuer Telemetrie-Zusammenfassungen im Log
pub const TELEMETRIE_INTERVALL: Duration = Duration::from_secs(5);

/// Laengste Wartezeit bis zum Re-Arm-Timer (s)
const MAX_WECKABSTAND_SECS: f64 = 60.0;

/// Kanaele auf Seite der Sitzung
pub struct SessionKanaele {
    /// Rohe Netzwerknachrichten; Schliessen beendet die Sitzung
    pub inbound: mpsc::Receiver<Bytes>,
    /// Mikrofon-Frames
    pub capture: mpsc::Receiver<AudioFrame>,
    /// Steuersignale als JSON
    pub control: mpsc::Receiver<String>,
    /// Zu sendende Frames (bereits serialisiert)
    pub outbound: mpsc::Sender<Bytes>,
    pub ereignisse: Option<mpsc::UnboundedSender<AudioEvent>>,
}

/// Gegenstueck der Kanaele fuer Netzwerk, Mikrofon und Signaling
pub struct SessionGegenseite {
    pub inbound: mpsc::Sender<Bytes>,
    pub capture: mpsc::Sender<AudioFrame>,
    pub control: mpsc::Sender<String>,
    pub outbound: mpsc::Receiver<Bytes>,
    pub ereignisse: mpsc::UnboundedReceiver<AudioEvent>,
}

/// Erstellt beide Seiten mit der angegebenen Kanal-Kapazitaet
pub fn kanaele(kapazitaet: usize) -> (SessionKanaele, SessionGegenseite) {
    let (inbound_tx, inbound_rx) = mpsc::channel(kapazitaet);
    let (capture_tx, capture_rx) = mpsc::channel(kapazitaet);
    let (control_tx, control_rx) = mpsc::channel(kapazitaet);
    let (outbound_tx, outbound_rx) = mpsc::channel(kapazitaet);
    let (ereignis_tx, ereignis_rx) = mpsc::unbounded_channel();
    (
        SessionKanaele {
            inbound: inbound_rx,
            capture: capture_rx,
            control: control_rx,
            outbound: outbound_tx,
            ereignisse: Some(ereignis_tx),
        },
        SessionGegenseite {
            inbound: inbound_tx,
            capture: capture_tx,
            control: control_tx,
            outbound: outbound_rx,
            ereignisse: ereignis_rx,
        },
    )
}

/// Treibt die Sitzung, bis der Eingangskanal geschlossen wird
///
/// Am Ende werden alle Streams beendet; die Sitzung wird zurueckgegeben.
pub async fn run_session<C: AudioClock>(
    mut session: VoiceSession<C>,
    mut kanaele: SessionKanaele,
) -> anyhow::Result<VoiceSession<C>> {
    let start = Instant::now();
    let jetzt_ms = || start.elapsed().as_millis() as u64;

    let mut heartbeat = tokio::time::interval(session.heartbeat_intervall());
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut telemetrie = tokio::time::interval_at(start + TELEMETRIE_INTERVALL, TELEMETRIE_INTERVALL);

    let mut capture_offen = true;
    let mut control_offen = true;

    info!("Sitzungs-Treiber gestartet");
    loop {
        let weckzeit = session.next_wakeup().map(|t| {
            let rest = (t - session.clock().current_time()).clamp(0.0, MAX_WECKABSTAND_SECS);
            Instant::now() + Duration::from_secs_f64(rest).max(MIN_WECKABSTAND)
        });

        tokio::select! {
            paket = kanaele.inbound.recv() => match paket {
                Some(daten) => {
                    // Abgewiesene Pakete sind bereits als Ereignis gemeldet
                    let _ = session.handle_inbound(&daten, jetzt_ms());
                }
                None => {
                    info!("Eingangskanal geschlossen");
                    break;
                }
            },
            frame = kanaele.capture.recv(), if capture_offen => match frame {
                Some(frame) => {
                    if let Some(ausgehend) = session.handle_capture(&frame, jetzt_ms()) {
                        match ausgehend.encode() {
                            Ok(daten) => {
                                if kanaele.outbound.send(daten).await.is_err() {
                                    debug!("Ausgangskanal geschlossen, Frame verworfen");
                                }
                            }
                            Err(e) => warn!(fehler = %e, "Ausgehender Frame nicht serialisierbar"),
                        }
                    }
                }
                None => capture_offen = false,
            },
            signal = kanaele.control.recv(), if control_offen => match signal {
                Some(text) => {
                    let _ = session.handle_control_json(&text);
                }
                None => control_offen = false,
            },
            _ = heartbeat.tick() => session.heartbeat(jetzt_ms()),
            _ = telemetrie.tick() => telemetrie_loggen(&session),
            _ = async {
                match weckzeit {
                    Some(t) => tokio::time::sleep_until(t).await,
                    None => std::future::pending::<()>().await,
                }
            } => session.on_timer(jetzt_ms()),
        }

        ereignisse_weiterleiten(&mut session, &kanaele.ereignisse);
    }

    telemetrie_loggen(&session);
    session.beenden();
    ereignisse_weiterleiten(&mut session, &kanaele.ereignisse);
    info!("Sitzungs-Treiber beendet");
    Ok(session)
}

fn telemetrie_loggen<C: AudioClock>(session: &VoiceSession<C>) {
    for t in session.telemetrie() {
        info!(stream = %t.key, "{}", t.zusammenfassung());
    }
}

fn ereignisse_weiterleiten<C: AudioClock>(
    session: &mut VoiceSession<C>,
    ziel: &Option<mpsc::UnboundedSender<AudioEvent>>,
) {
    for ereignis in session.drain_events() {
        if let Some(tx) = ziel {
            // Empfaenger weg: Ereignisse werden nur noch verworfen
            let _ = tx.send(ereignis);
        }
    }
}
