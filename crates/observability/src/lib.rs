//! # murmel-observability
//!
//! Observability-Crate fuer Murmel:
//! - Prometheus-kompatible Metriken aus `AudioEvent`s
//! - Structured Logging (Text oder JSON) via tracing-subscriber

pub mod logging;
pub mod metrics;

pub use logging::{log_format_gueltig, log_level_gueltig, logging_initialisieren};
pub use metrics::MurmelMetrics;
