//! Server configuration.
//!
//! Defaults match the original deployment; every field can be overridden
//! from the environment via [`ServerConfig::from_env`]:
//!
//! | variable | field | default |
//! |---|---|---|
//! | `LIFEBOARD_BIND_ADDR` | `bind_addr` | `0.0.0.0:5000` |
//! | `LIFEBOARD_BROADCAST_CAPACITY` | `broadcast_capacity` | `64` |
//! | `LIFEBOARD_DEBUG` | `debug` | `false` |
//! | `LIFEBOARD_LOBBY_TTL_SECS` | `reaper.lobby_ttl` | `3600` |
//! | `LIFEBOARD_SWEEP_INTERVAL_SECS` | `reaper.sweep_interval` | `60` |
//! | `LIFEBOARD_NAMING_URL` | `naming.url` | Scryfall random card |
//! | `LIFEBOARD_NAMING_TIMEOUT_MS` | `naming.timeout` | `5000` |
//! | `LIFEBOARD_NAMING_MAX_ATTEMPTS` | `naming.max_attempts` | `5` |

use std::str::FromStr;
use std::time::Duration;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";
const DEFAULT_BROADCAST_CAPACITY: usize = 64;
const DEFAULT_LOBBY_TTL_SECS: u64 = 60 * 60;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_NAMING_URL: &str = "https://api.scryfall.com/cards/random";
const DEFAULT_NAMING_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_NAMING_MAX_ATTEMPTS: usize = 5;
const DEFAULT_USER_AGENT: &str = "Lifeboard/0.1";

/// Lobby expiry settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaperConfig {
    /// How often to sweep for idle lobbies
    pub sweep_interval: Duration,
    /// Idle time after which a lobby is evicted
    pub lobby_ttl: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            lobby_ttl: Duration::from_secs(DEFAULT_LOBBY_TTL_SECS),
        }
    }
}

/// External lobby-name source settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingConfig {
    pub url: String,
    /// Per-request timeout
    pub timeout: Duration,
    pub user_agent: String,
    /// Source fetches before falling back to local keys
    pub max_attempts: usize,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_NAMING_URL.to_string(),
            timeout: Duration::from_millis(DEFAULT_NAMING_TIMEOUT_MS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_attempts: DEFAULT_NAMING_MAX_ATTEMPTS,
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Broadcast channel capacity per lobby
    pub broadcast_capacity: usize,
    /// Send full error detail to clients
    pub debug: bool,
    pub reaper: ReaperConfig,
    pub naming: NamingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
            debug: false,
            reaper: ReaperConfig::default(),
            naming: NamingConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `LIFEBOARD_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns.
    ///
    /// Values that fail to parse are ignored with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: lookup("LIFEBOARD_BIND_ADDR").unwrap_or(defaults.bind_addr),
            broadcast_capacity: parse_or(
                &lookup,
                "LIFEBOARD_BROADCAST_CAPACITY",
                defaults.broadcast_capacity,
            ),
            debug: lookup("LIFEBOARD_DEBUG")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(defaults.debug),
            reaper: ReaperConfig {
                sweep_interval: Duration::from_secs(parse_or(
                    &lookup,
                    "LIFEBOARD_SWEEP_INTERVAL_SECS",
                    DEFAULT_SWEEP_INTERVAL_SECS,
                )),
                lobby_ttl: Duration::from_secs(parse_or(
                    &lookup,
                    "LIFEBOARD_LOBBY_TTL_SECS",
                    DEFAULT_LOBBY_TTL_SECS,
                )),
            },
            naming: NamingConfig {
                url: lookup("LIFEBOARD_NAMING_URL").unwrap_or(defaults.naming.url),
                timeout: Duration::from_millis(parse_or(
                    &lookup,
                    "LIFEBOARD_NAMING_TIMEOUT_MS",
                    DEFAULT_NAMING_TIMEOUT_MS,
                )),
                user_agent: defaults.naming.user_agent,
                max_attempts: parse_or(
                    &lookup,
                    "LIFEBOARD_NAMING_MAX_ATTEMPTS",
                    DEFAULT_NAMING_MAX_ATTEMPTS,
                ),
            },
        }
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("Ignoring unparseable {key}={raw:?}");
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "0.0.0.0:5000");
        assert_eq!(config.broadcast_capacity, 64);
        assert!(!config.debug);
        assert_eq!(config.reaper.lobby_ttl, Duration::from_secs(3600));
        assert_eq!(config.reaper.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.naming.url, "https://api.scryfall.com/cards/random");
        assert_eq!(config.naming.max_attempts, 5);
    }

    #[test]
    fn test_from_lookup_without_vars_is_default() {
        assert_eq!(ServerConfig::from_lookup(|_| None), ServerConfig::default());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = ServerConfig::from_lookup(lookup_from(&[
            ("LIFEBOARD_BIND_ADDR", "127.0.0.1:9000"),
            ("LIFEBOARD_BROADCAST_CAPACITY", "8"),
            ("LIFEBOARD_DEBUG", "TRUE"),
            ("LIFEBOARD_LOBBY_TTL_SECS", "120"),
            ("LIFEBOARD_SWEEP_INTERVAL_SECS", " 5 "),
            ("LIFEBOARD_NAMING_URL", "http://localhost:1/name"),
            ("LIFEBOARD_NAMING_TIMEOUT_MS", "250"),
            ("LIFEBOARD_NAMING_MAX_ATTEMPTS", "2"),
        ]));

        assert_eq!(config.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.broadcast_capacity, 8);
        assert!(config.debug);
        assert_eq!(config.reaper.lobby_ttl, Duration::from_secs(120));
        assert_eq!(config.reaper.sweep_interval, Duration::from_secs(5));
        assert_eq!(config.naming.url, "http://localhost:1/name");
        assert_eq!(config.naming.timeout, Duration::from_millis(250));
        assert_eq!(config.naming.max_attempts, 2);
    }

    #[test]
    fn test_from_lookup_ignores_garbage() {
        let config = ServerConfig::from_lookup(lookup_from(&[
            ("LIFEBOARD_LOBBY_TTL_SECS", "an hour"),
            ("LIFEBOARD_DEBUG", "maybe"),
        ]));
        assert_eq!(config.reaper.lobby_ttl, Duration::from_secs(3600));
        assert!(!config.debug);
    }
}
