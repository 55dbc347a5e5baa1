use crate::error::AppError;
use crypto_core::{DEFAULT_KEY_BITS, MIN_KEY_BITS};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

const DEFAULT_OUTBOUND_CAPACITY: usize = 256;
const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// RSA modulus size for per-user key pairs
    pub key_bits: usize,
    /// Close sessions that send nothing for this long (None = never)
    pub idle_timeout: Option<Duration>,
    /// Wrap notices and sender names in ANSI color escapes
    pub ansi_colors: bool,
    /// Lines a session's outbound queue holds before fan-out skips it
    pub outbound_capacity: usize,
    /// Give up on a peer whose transport accepts no bytes for this long
    pub write_timeout: Option<Duration>,
}

impl Config {
    fn parse_bool(value: &str) -> Option<bool> {
        match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        }
    }

    /// Load configuration from the environment (and `.env` if present).
    ///
    /// The port always comes from the command line.
    pub fn from_env(port: u16) -> Result<Self, AppError> {
        dotenv().ok();
        Self::from_lookup(port, |key| env::var(key).ok())
    }

    fn parse_secs(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<u64>, AppError> {
        lookup(key)
            .map(|raw| {
                raw.trim()
                    .parse::<u64>()
                    .map_err(|e| AppError::Config(format!("{key} must be an integer: {e}")))
            })
            .transpose()
    }

    fn from_lookup<F>(port: u16, lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("RELAY_HOST")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "0.0.0.0".to_string());

        let key_bits = match lookup("RELAY_KEY_BITS") {
            Some(raw) => raw.trim().parse::<usize>().map_err(|e| {
                AppError::Config(format!("RELAY_KEY_BITS must be an integer: {e}"))
            })?,
            None => DEFAULT_KEY_BITS,
        };
        if key_bits < MIN_KEY_BITS || key_bits % 8 != 0 {
            return Err(AppError::Config(format!(
                "RELAY_KEY_BITS must be a multiple of 8 and at least {MIN_KEY_BITS}, got {key_bits}"
            )));
        }

        let idle_timeout = Self::parse_secs(&lookup, "RELAY_IDLE_TIMEOUT_SECS")?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let write_timeout = match Self::parse_secs(&lookup, "RELAY_WRITE_TIMEOUT_SECS")? {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => Some(Duration::from_secs(DEFAULT_WRITE_TIMEOUT_SECS)),
        };

        let outbound_capacity = match lookup("RELAY_OUTBOUND_CAPACITY") {
            Some(raw) => raw.trim().parse::<usize>().map_err(|e| {
                AppError::Config(format!("RELAY_OUTBOUND_CAPACITY must be an integer: {e}"))
            })?,
            None => DEFAULT_OUTBOUND_CAPACITY,
        };
        if outbound_capacity == 0 {
            return Err(AppError::Config(
                "RELAY_OUTBOUND_CAPACITY must be at least 1".to_string(),
            ));
        }

        let ansi_colors = match lookup("RELAY_ANSI_COLORS") {
            Some(raw) => Self::parse_bool(&raw).ok_or_else(|| {
                AppError::Config(format!("RELAY_ANSI_COLORS must be a boolean, got {raw:?}"))
            })?,
            None => true,
        };

        Ok(Self {
            host,
            port,
            key_bits,
            idle_timeout,
            ansi_colors,
            outbound_capacity,
            write_timeout,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Loopback on an ephemeral port with small keys, for tests
    pub fn test_defaults() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            key_bits: MIN_KEY_BITS,
            idle_timeout: None,
            ansi_colors: true,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            write_timeout: Some(Duration::from_secs(5)),
        }
    }
}
