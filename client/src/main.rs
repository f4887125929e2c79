//! murmel-loopback – Einstiegspunkt
//!
//! Synthetische Aufnahme -> Netzwerk mit Verlust und Umsortierung ->
//! Wiedergabe ueber eine `RenderQueue`, die ein eigener Render-Thread
//! leert. Am Ende werden Telemetrie und Metriken ausgegeben.
//!
//! Aufruf: `murmel-loopback [sekunden]`

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use murmel_audio::RenderQueue;
use murmel_client::{kanaele, run_session, ClientConfig, VoiceSession};
use murmel_core::event::AudioEvent;
use murmel_core::types::{AudioFrame, FrameFormat};
use murmel_observability::{logging_initialisieren, MurmelMetrics};
use murmel_protocol::voice::OutboundFrame;
use tokio::sync::mpsc;

/// Schluessel, unter dem der eigene Stream zurueckkommt
const LOOPBACK_KEY: &str = "loopback";

#[tokio::main]
async fn main() -> Result<()> {
    let config_pfad = ClientConfig::pfad_aus_env();
    let config = ClientConfig::laden(&config_pfad)?;

    logging_initialisieren(&config.logging.level, &config.logging.format);

    let sekunden: u64 = match std::env::args().nth(1) {
        Some(arg) => arg
            .parse()
            .map_err(|e| anyhow::anyhow!("Ungueltige Dauer '{arg}': {e}"))?,
        None => 5,
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        sekunden,
        "murmel-loopback wird initialisiert"
    );

    let format = config.frame_format();
    let render = RenderQueue::new(format.sample_rate);
    let metriken = MurmelMetrics::neu()?;
    let mut session = VoiceSession::neu(&config, render.clone())?.mit_metriken(metriken.clone());
    session.kalibrieren(&umgebung_simulieren(format))?;

    let laeuft = Arc::new(AtomicBool::new(true));
    let render_thread = render_thread_starten(render.clone(), format, Arc::clone(&laeuft));

    let (kanaele, gegenseite) = kanaele(256);
    let treiber = tokio::spawn(run_session(session, kanaele));
    let ereignisse = tokio::spawn(ereignisse_protokollieren(gegenseite.ereignisse));
    let netz = tokio::spawn(netzwerk_simulieren(gegenseite.outbound, gegenseite.inbound));

    mikrofon_simulieren(gegenseite.capture, format, Duration::from_secs(sekunden)).await;

    // Netz und Treiber laufen aus, sobald die Aufnahme endet
    netz.await?;
    treiber.await??;
    let (anzahl, hard_resets) = ereignisse.await?;

    laeuft.store(false, Ordering::Relaxed);
    if render_thread.join().is_err() {
        tracing::error!("Render-Thread abgestuerzt");
    }

    println!("{anzahl} Ereignisse, {hard_resets} harte Resets");
    println!("{} Frames verworfen (zu spaet)", render.verworfen());
    println!("{}", metriken.exportieren()?);
    Ok(())
}

/// Leert die Render-Queue im Takt der Frame-Dauer
fn render_thread_starten(
    render: RenderQueue,
    format: FrameFormat,
    laeuft: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let mut puffer = vec![0.0f32; format.samples_per_frame()];
        let takt = Duration::from_millis(u64::from(format.frame_duration_ms));
        while laeuft.load(Ordering::Relaxed) {
            render.render(&mut puffer);
            std::thread::sleep(takt);
        }
    })
}

/// Leises Umgebungsrauschen (0,5 s) fuer die Kalibrierung
fn umgebung_simulieren(format: FrameFormat) -> Vec<f32> {
    let n = format.sample_rate as usize / 2;
    let rate = format.sample_rate as f32;
    (0..n)
        .map(|k| (k as f32 / rate * 50.0 * std::f32::consts::TAU).sin() * 0.002)
        .collect()
}

/// Erzeugt abwechselnd Ton (1 s) und Stille (0,5 s)
async fn mikrofon_simulieren(capture: mpsc::Sender<AudioFrame>, format: FrameFormat, dauer: Duration) {
    let frame_ms = u64::from(format.frame_duration_ms);
    let anzahl = dauer.as_millis() as u64 / frame_ms;
    let mut takt = tokio::time::interval(Duration::from_millis(frame_ms));
    let n = format.samples_per_frame();
    let rate = format.sample_rate as f32;

    for i in 0..anzahl {
        takt.tick().await;
        let in_zyklus_ms = (i * frame_ms) % 1_500;
        let frame = if in_zyklus_ms < 1_000 {
            let offset = (i as usize * n) as f32;
            AudioFrame::new(
                (0..n)
                    .map(|k| ((offset + k as f32) / rate * 440.0 * std::f32::consts::TAU).sin() * 0.3)
                    .collect(),
            )
        } else {
            format.silence()
        };
        if capture.send(frame).await.is_err() {
            break;
        }
    }
}

/// Schickt gesendete Frames mit Verlust und Umsortierung zurueck
///
/// Jedes 23. Paket geht verloren, jedes 7. wird mit dem folgenden
/// vertauscht. Endet, wenn der Ausgangskanal geschlossen wird; dabei wird
/// auch der Eingangskanal geschlossen und die Sitzung beendet.
async fn netzwerk_simulieren(mut outbound: mpsc::Receiver<Bytes>, inbound: mpsc::Sender<Bytes>) {
    let mut zurueckgehalten: Option<Bytes> = None;
    let mut zaehler = 0u64;

    // Der Ausgangskanal schliesst erst mit der Sitzung; Ende ist daher das
    // Ausbleiben von Frames nach dem Ende der Aufnahme
    let leerlauf = Duration::from_secs(2);
    while let Ok(Some(daten)) = tokio::time::timeout(leerlauf, outbound.recv()).await {
        zaehler += 1;
        let Ok(frame) = OutboundFrame::decode(&daten) else {
            continue;
        };
        let Ok(eingehend) = frame.als_eingehend(LOOPBACK_KEY).encode() else {
            continue;
        };
        if zaehler % 23 == 0 {
            continue;
        }
        if zaehler % 7 == 0 && zurueckgehalten.is_none() {
            zurueckgehalten = Some(eingehend);
            continue;
        }
        if inbound.send(eingehend).await.is_err() {
            return;
        }
        if let Some(spaet) = zurueckgehalten.take() {
            if inbound.send(spaet).await.is_err() {
                return;
            }
        }
    }
}

async fn ereignisse_protokollieren(mut rx: mpsc::UnboundedReceiver<AudioEvent>) -> (u64, u64) {
    let mut anzahl = 0;
    let mut hard_resets = 0;
    while let Some(ereignis) = rx.recv().await {
        anzahl += 1;
        if matches!(ereignis, AudioEvent::HardReset { .. }) {
            hard_resets += 1;
        }
        tracing::debug!(?ereignis, "Audio-Ereignis");
    }
    (anzahl, hard_resets)
}
