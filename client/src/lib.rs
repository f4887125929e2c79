//! murmel-client – Audio-Sitzung eines Voice-Chat-Clients
//!
//! Stellt die Sitzung aus den Kern-Crates zusammen und treibt sie mit tokio.
//!
//! ## Module
//! - [`config`] – TOML-Konfiguration
//! - [`session`] – `VoiceSession` (Empfang, Aufnahme, Steuerung, Timer)
//! - [`driver`] – Tokio-Treiber ueber Kanaele

pub mod config;
pub mod driver;
pub mod session;

pub use config::ClientConfig;
pub use driver::{kanaele, run_session, SessionGegenseite, SessionKanaele};
pub use session::VoiceSession;
