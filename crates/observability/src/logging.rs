//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable:
//! - `MURMEL_LOG_LEVEL`: Filter (trace/debug/info/warn/error oder
//!   EnvFilter-Direktiven wie `murmel_voice=trace`), Standard: info
//! - `MURMEL_LOG_FORMAT`: Format (text/json), Standard: text
//!
//! Stream-Schluessel und Sequenznummern werden als strukturierte Felder
//! geloggt (`stream = %key`, `sequence`, `lost`).

use tracing_subscriber::{EnvFilter, fmt};

pub const ENV_LOG_LEVEL: &str = "MURMEL_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "MURMEL_LOG_FORMAT";

/// Initialisiert das Logging-System.
///
/// Umgebungsvariablen haben Vorrang vor den uebergebenen Werten aus der
/// Konfiguration. Ein zweiter Aufruf (z.B. in Tests) wird ignoriert.
pub fn logging_initialisieren(level: &str, format: &str) {
    let filter = EnvFilter::try_from_env(ENV_LOG_LEVEL)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let format_env = std::env::var(ENV_LOG_FORMAT).unwrap_or_else(|_| format.to_string());

    let ergebnis = match format_env.as_str() {
        "json" => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_current_span(true)
            .try_init(),
        _ => fmt().with_env_filter(filter).with_target(true).try_init(),
    };

    if ergebnis.is_err() {
        tracing::debug!("Logging bereits initialisiert");
    }
}

/// Gibt den konfigurierten Log-Level aus der Umgebung zurueck.
/// Fallback: "info"
pub fn log_level_aus_env() -> String {
    std::env::var(ENV_LOG_LEVEL).unwrap_or_else(|_| "info".to_string())
}

/// Gibt das konfigurierte Log-Format aus der Umgebung zurueck.
/// Fallback: "text"
pub fn log_format_aus_env() -> String {
    std::env::var(ENV_LOG_FORMAT).unwrap_or_else(|_| "text".to_string())
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_gueltige_werte() {
        assert!(log_level_gueltig("trace"));
        assert!(log_level_gueltig("debug"));
        assert!(log_level_gueltig("info"));
        assert!(log_level_gueltig("warn"));
        assert!(log_level_gueltig("error"));
    }

    #[test]
    fn log_level_ungueltige_werte() {
        assert!(!log_level_gueltig("verbose"));
        assert!(!log_level_gueltig("INFO")); // Gross-/Kleinschreibung
        assert!(!log_level_gueltig(""));
        assert!(!log_level_gueltig("critical"));
    }

    #[test]
    fn log_format_gueltige_werte() {
        assert!(log_format_gueltig("text"));
        assert!(log_format_gueltig("json"));
    }

    #[test]
    fn log_format_ungueltige_werte() {
        assert!(!log_format_gueltig("xml"));
        assert!(!log_format_gueltig("JSON")); // Gross-/Kleinschreibung
        assert!(!log_format_gueltig(""));
    }

    #[test]
    fn doppelte_initialisierung_ist_harmlos() {
        logging_initialisieren("debug", "text");
        logging_initialisieren("info", "json");
    }

    // Setzen und Entfernen in einem Test, damit parallele Tests nicht kollidieren
    #[test]
    fn log_level_aus_env() {
        std::env::remove_var(ENV_LOG_LEVEL);
        assert_eq!(super::log_level_aus_env(), "info");
        std::env::set_var(ENV_LOG_LEVEL, "debug");
        assert_eq!(super::log_level_aus_env(), "debug");
        std::env::remove_var(ENV_LOG_LEVEL);
    }

    #[test]
    fn log_format_aus_env() {
        std::env::remove_var(ENV_LOG_FORMAT);
        assert_eq!(super::log_format_aus_env(), "text");
        std::env::set_var(ENV_LOG_FORMAT, "json");
        assert_eq!(super::log_format_aus_env(), "json");
        std::env::remove_var(ENV_LOG_FORMAT);
    }
}
