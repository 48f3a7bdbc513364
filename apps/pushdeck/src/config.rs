use std::env;
use std::time::Duration;

use crate::session::DEFAULT_RECONNECT_DELAY;

const DEFAULT_SERVER: &str = "ws://127.0.0.1:8080/ws";

/// Application configuration. The endpoint is supplied externally; the grid
/// size is usually server-authoritative but can be pinned here.
#[derive(Debug, Clone)]
pub struct Config {
    pub server_url: String,
    /// Fixed (rows, cols) instead of asking the server with a size query.
    pub grid: Option<(u16, u16)>,
    pub reconnect_delay: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let server_url = env::var("PUSHDECK_SERVER")
            .map(|raw| normalize_endpoint(&raw))
            .unwrap_or_else(|_| DEFAULT_SERVER.to_string());
        let grid = env::var("PUSHDECK_GRID")
            .ok()
            .and_then(|raw| parse_grid(&raw));
        Self {
            server_url,
            grid,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER.to_string(),
            grid: None,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

/// Accept bare host:port endpoints: default to ws:// for localhost and
/// wss:// for anything else.
pub fn normalize_endpoint(raw: &str) -> String {
    if raw.starts_with("ws://") || raw.starts_with("wss://") {
        raw.to_string()
    } else if raw.contains("localhost") || raw.contains("127.0.0.1") {
        format!("ws://{raw}")
    } else {
        format!("wss://{raw}")
    }
}

/// Parse "ROWSxCOLS", e.g. "4x8".
pub fn parse_grid(raw: &str) -> Option<(u16, u16)> {
    let (rows, cols) = raw.split_once(['x', 'X'])?;
    let rows = rows.trim().parse().ok()?;
    let cols = cols.trim().parse().ok()?;
    if rows == 0 || cols == 0 {
        return None;
    }
    Some((rows, cols))
}

#[cfg(test)]
mod tests {
    use std::sync::{LazyLock, Mutex};

    use super::*;

    // Mutex to ensure environment variable tests don't run in parallel
    static ENV_MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.server_url, DEFAULT_SERVER);
        assert_eq!(config.grid, None);
    }

    #[test]
    fn from_env_default() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe {
            env::remove_var("PUSHDECK_SERVER");
            env::remove_var("PUSHDECK_GRID");
        }
        let config = Config::from_env();
        assert_eq!(config.server_url, DEFAULT_SERVER);
        assert_eq!(config.grid, None);
    }

    #[test]
    fn from_env_custom() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let original = env::var("PUSHDECK_SERVER").ok();

        unsafe {
            env::set_var("PUSHDECK_SERVER", "deck.example.com:9000");
        }
        let config = Config::from_env();
        assert_eq!(config.server_url, "wss://deck.example.com:9000");

        unsafe {
            if let Some(orig) = original {
                env::set_var("PUSHDECK_SERVER", orig);
            } else {
                env::remove_var("PUSHDECK_SERVER");
            }
        }
    }

    #[test]
    fn endpoint_normalization() {
        assert_eq!(normalize_endpoint("ws://host/ws"), "ws://host/ws");
        assert_eq!(normalize_endpoint("wss://host/ws"), "wss://host/ws");
        assert_eq!(
            normalize_endpoint("localhost:8080/ws"),
            "ws://localhost:8080/ws"
        );
        assert_eq!(
            normalize_endpoint("127.0.0.1:8080"),
            "ws://127.0.0.1:8080"
        );
        assert_eq!(normalize_endpoint("deck.example.com"), "wss://deck.example.com");
    }

    #[test]
    fn grid_parsing() {
        assert_eq!(parse_grid("4x8"), Some((4, 8)));
        assert_eq!(parse_grid("2X3"), Some((2, 3)));
        assert_eq!(parse_grid(" 4 x 8 "), Some((4, 8)));
        assert_eq!(parse_grid("0x8"), None);
        assert_eq!(parse_grid("4"), None);
        assert_eq!(parse_grid("axb"), None);
    }
}
