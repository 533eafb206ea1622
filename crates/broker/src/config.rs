// Broker server configuration.
//
// Centralizes environment variable parsing with defaults for local
// development. Provider credentials are read separately by the provider
// registry — this module covers the core server settings.

use std::net::SocketAddr;

/// Core broker server configuration.
///
/// Constructed via [`BrokerConfig::from_env`] which reads environment
/// variables and falls back to sensible development defaults.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Listen address (host:port).
    pub listen_addr: SocketAddr,
    /// Domain suffixes the post-login redirect URI may point at.
    pub allowed_redirect_domains: Vec<String>,
    /// Comma-separated CORS origins (or `"*"` for any).
    pub cors_origins: Option<String>,
    /// Log filter directive (e.g. `info`, `attache_broker=debug`).
    pub log_filter: String,
}

impl BrokerConfig {
    /// Parse configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `ATTACHE_BROKER_HOST` | `0.0.0.0` |
    /// | `ATTACHE_BROKER_PORT` | `8080` |
    /// | `ATTACHE_BROKER_ALLOWED_REDIRECT_DOMAINS` | `localhost` |
    /// | `ATTACHE_BROKER_CORS_ORIGINS` | *(none — cors.rs uses dev defaults)* |
    /// | `ATTACHE_BROKER_LOG_FILTER` | `info` |
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key))
    }

    /// Testable constructor that accepts an environment lookup function.
    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let host = env("ATTACHE_BROKER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env("ATTACHE_BROKER_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080);
        let listen_addr = format!("{host}:{port}")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)));

        let allowed_redirect_domains = env("ATTACHE_BROKER_ALLOWED_REDIRECT_DOMAINS")
            .map(|raw| parse_domains(&raw))
            .ok()
            .filter(|domains| !domains.is_empty())
            .unwrap_or_else(|| vec!["localhost".to_string()]);

        let cors_origins = env("ATTACHE_BROKER_CORS_ORIGINS").ok();

        let log_filter = env("ATTACHE_BROKER_LOG_FILTER").unwrap_or_else(|_| "info".into());

        Self { listen_addr, allowed_redirect_domains, cors_origins, log_filter }
    }
}

fn parse_domains(comma_separated: &str) -> Vec<String> {
    comma_separated
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
