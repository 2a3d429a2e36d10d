//! Server configuration loaded from the environment

use std::path::PathBuf;

use crate::types::GameConfig;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DATA_FILE: &str = "data/game.json";
const DEFAULT_STATIC_DIR: &str = "static";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Snapshot file for the store (None = keep everything in memory)
    pub data_file: Option<PathBuf>,
    pub static_dir: PathBuf,
    pub game: GameConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            data_file: Some(PathBuf::from(DEFAULT_DATA_FILE)),
            static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
            game: GameConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Read PORT, DATA_FILE, STATIC_DIR, ROUND_SECONDS, REVEAL_SECONDS and
    /// REEL_TICK_SECONDS. Unparseable values keep their default.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = parse_env("PORT", defaults.port);

        let data_file = match std::env::var("DATA_FILE") {
            Ok(v) if v.trim().is_empty() => None,
            Ok(v) => Some(PathBuf::from(v.trim())),
            Err(_) => defaults.data_file,
        };

        let static_dir = std::env::var("STATIC_DIR")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.static_dir);

        let game = GameConfig {
            round_seconds: parse_env("ROUND_SECONDS", defaults.game.round_seconds),
            reveal_seconds: parse_env("REVEAL_SECONDS", defaults.game.reveal_seconds),
            reel_tick_seconds: parse_env("REEL_TICK_SECONDS", defaults.game.reel_tick_seconds),
        };

        tracing::info!(
            port,
            data_file = ?data_file,
            static_dir = %static_dir.display(),
            round_seconds = game.round_seconds,
            reveal_seconds = game.reveal_seconds,
            reel_tick_seconds = game.reel_tick_seconds,
            "Server config loaded"
        );

        Self {
            port,
            data_file,
            static_dir,
            game,
        }
    }
}

fn parse_env<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Invalid {}={:?}, using default {}", key, raw, default);
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEYS: &[&str] = &[
        "PORT",
        "DATA_FILE",
        "STATIC_DIR",
        "ROUND_SECONDS",
        "REVEAL_SECONDS",
        "REEL_TICK_SECONDS",
    ];

    fn clear_env() {
        for key in KEYS {
            std::env::remove_var(key);
        }
    }

    fn set(key: &str, value: &str) {
        std::env::set_var(key, value);
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let config = ServerConfig::from_env();
        assert_eq!(config.port, 3000);
        assert_eq!(config.data_file, Some(PathBuf::from("data/game.json")));
        assert_eq!(config.static_dir, PathBuf::from("static"));
        assert_eq!(config.game, GameConfig::default());
    }

    #[test]
    #[serial]
    fn test_overrides() {
        clear_env();
        set("PORT", "8080");
        set("ROUND_SECONDS", "30");
        set("REVEAL_SECONDS", "5");
        set("REEL_TICK_SECONDS", "3");
        set("STATIC_DIR", "public");

        let config = ServerConfig::from_env();
        assert_eq!(config.port, 8080);
        assert_eq!(config.game.round_seconds, 30);
        assert_eq!(config.game.reveal_seconds, 5);
        assert_eq!(config.game.reel_tick_seconds, 3);
        assert_eq!(config.static_dir, PathBuf::from("public"));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_empty_data_file_means_in_memory() {
        clear_env();
        set("DATA_FILE", "");
        assert!(ServerConfig::from_env().data_file.is_none());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_numbers_fall_back() {
        clear_env();
        set("PORT", "not-a-port");
        set("ROUND_SECONDS", "-4");

        let config = ServerConfig::from_env();
        assert_eq!(config.port, 3000);
        assert_eq!(config.game.round_seconds, 20);
        clear_env();
    }
}
