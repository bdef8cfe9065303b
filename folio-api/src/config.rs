//! Server configuration loaded from the environment

use std::time::Duration;

use axum::http::HeaderValue;
use folio_core::{FolioError, FolioResult};
use folio_services::websocket::DEFAULT_OUTBOUND_BUFFER;
use folio_services::DEFAULT_TICK_INTERVAL;

const DEFAULT_PORT: u16 = 5000;

/// Runtime configuration for the API server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP listen port
    pub port: u16,
    /// Time between market data broadcasts
    pub tick_interval: Duration,
    /// Outbound queue capacity per WebSocket connection
    pub outbound_buffer: usize,
    /// Exact origin allowed by CORS; any origin when unset
    pub cors_allow_origin: Option<HeaderValue>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            tick_interval: DEFAULT_TICK_INTERVAL,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            cors_allow_origin: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// - SERVER_PORT: HTTP port (default 5000)
    /// - MARKET_TICK_INTERVAL_MS: broadcast interval (default 5000)
    /// - WS_OUTBOUND_BUFFER: per-connection queue size (default 100)
    /// - CORS_ALLOW_ORIGIN: allowed origin (default any)
    pub fn from_env() -> FolioResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> FolioResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = parse_or("SERVER_PORT", &lookup, defaults.port)?;

        let tick_interval_ms: u64 = parse_or(
            "MARKET_TICK_INTERVAL_MS",
            &lookup,
            defaults.tick_interval.as_millis() as u64,
        )?;
        if tick_interval_ms == 0 {
            return Err(FolioError::config("MARKET_TICK_INTERVAL_MS must be greater than 0"));
        }

        let outbound_buffer = parse_or("WS_OUTBOUND_BUFFER", &lookup, defaults.outbound_buffer)?;
        if outbound_buffer == 0 {
            return Err(FolioError::config("WS_OUTBOUND_BUFFER must be greater than 0"));
        }

        let cors_allow_origin = match lookup("CORS_ALLOW_ORIGIN") {
            Some(origin) if !origin.trim().is_empty() => Some(
                HeaderValue::from_str(origin.trim()).map_err(|e| {
                    FolioError::config(format!("Invalid CORS_ALLOW_ORIGIN '{}': {}", origin, e))
                })?,
            ),
            _ => None,
        };

        Ok(Self {
            port,
            tick_interval: Duration::from_millis(tick_interval_ms),
            outbound_buffer,
            cors_allow_origin,
        })
    }
}

fn parse_or<T, F>(key: &str, lookup: &F, default: T) -> FolioResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| FolioError::config(format!("Invalid {} '{}': {}", key, raw, e))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.tick_interval, Duration::from_secs(5));
        assert_eq!(config.outbound_buffer, 100);
        assert!(config.cors_allow_origin.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("SERVER_PORT", "8080"),
            ("MARKET_TICK_INTERVAL_MS", "250"),
            ("WS_OUTBOUND_BUFFER", " 32 "),
            ("CORS_ALLOW_ORIGIN", "http://localhost:5173"),
        ]))
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.tick_interval, Duration::from_millis(250));
        assert_eq!(config.outbound_buffer, 32);
        assert_eq!(
            config.cors_allow_origin.unwrap(),
            HeaderValue::from_static("http://localhost:5173")
        );
    }

    #[test]
    fn test_invalid_port() {
        let err = ServerConfig::from_lookup(lookup(&[("SERVER_PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, FolioError::Config(_)));
        assert!(err.to_string().contains("SERVER_PORT"));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = ServerConfig::from_lookup(lookup(&[("MARKET_TICK_INTERVAL_MS", "0")])).unwrap_err();
        assert!(matches!(err, FolioError::Config(_)));
    }

    #[test]
    fn test_zero_buffer_rejected() {
        assert!(ServerConfig::from_lookup(lookup(&[("WS_OUTBOUND_BUFFER", "0")])).is_err());
    }

    #[test]
    fn test_blank_origin_means_any() {
        let config = ServerConfig::from_lookup(lookup(&[("CORS_ALLOW_ORIGIN", "  ")])).unwrap();
        assert!(config.cors_allow_origin.is_none());
    }
}
