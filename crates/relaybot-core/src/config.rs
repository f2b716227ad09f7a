use std::{env, path::PathBuf, str::FromStr, time::Duration};

use crate::{domain::UserId, errors::Error, Result};

/// Which persistence backend the bot opens at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    File,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(Self::File),
            "memory" => Ok(Self::Memory),
            other => Err(Error::Config(format!(
                "STORE_BACKEND must be `file` or `memory`, got `{other}`"
            ))),
        }
    }
}

/// Typed configuration, read from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub bot_token: String,
    pub owner_id: UserId,
    pub clone_tokens: Vec<String>,

    // Storage
    pub store_backend: StoreBackend,
    pub data_dir: PathBuf,

    // Liveness
    pub health_enabled: bool,
    pub port: u16,

    // Pacing / timeouts
    pub broadcast_throttle: Duration,
    pub delivery_timeout: Duration,
    pub ack_retract_delay: Duration,

    // Access policy on store lookup failure
    pub access_fail_open: bool,

    // Scheduled broadcast
    pub daily_broadcast_cron: Option<String>,
    pub quotes_file: Option<PathBuf>,
}

impl Config {
    /// Load from the process environment, after an optional `.env` file.
    ///
    /// Variables already set in the environment win over `.env` entries.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| var(key).and_then(non_empty);

        let bot_token = get("BOT_TOKEN")
            .or_else(|| get("TELEGRAM_BOT_TOKEN"))
            .ok_or_else(|| {
                Error::Config("BOT_TOKEN environment variable is required".to_string())
            })?;

        let owner_id = get("OWNER_ID")
            .ok_or_else(|| Error::Config("OWNER_ID environment variable is required".to_string()))
            .and_then(|s| parse_num::<i64>("OWNER_ID", &s))
            .map(UserId)?;

        let clone_tokens = parse_csv(get("CLONE_TOKENS"));

        let store_backend = match get("STORE_BACKEND") {
            Some(s) => s.parse()?,
            None => StoreBackend::File,
        };
        let data_dir = PathBuf::from(get("DATA_DIR").unwrap_or_else(|| "./data".to_string()));

        let health_enabled = parse_bool(get("HEALTH_ENABLED")).unwrap_or(true);
        let port = get("PORT")
            .map(|s| parse_num::<u16>("PORT", &s))
            .transpose()?
            .unwrap_or(8080);

        let broadcast_throttle = millis(&get, "BROADCAST_THROTTLE_MS", 50)?;
        let delivery_timeout = millis(&get, "DELIVERY_TIMEOUT_MS", 10_000)?;
        let ack_retract_delay = millis(&get, "ACK_RETRACT_DELAY_MS", 2_000)?;
        if delivery_timeout.is_zero() {
            return Err(Error::Config(
                "DELIVERY_TIMEOUT_MS must be greater than zero".to_string(),
            ));
        }

        let access_fail_open = parse_bool(get("ACCESS_FAIL_OPEN")).unwrap_or(false);

        let daily_broadcast_cron = get("DAILY_BROADCAST_CRON");
        if let Some(expr) = &daily_broadcast_cron {
            cron::Schedule::from_str(expr).map_err(|e| {
                Error::Config(format!("DAILY_BROADCAST_CRON `{expr}` is invalid: {e}"))
            })?;
        }
        let quotes_file = get("QUOTES_FILE").map(PathBuf::from);

        Ok(Self {
            bot_token,
            owner_id,
            clone_tokens,
            store_backend,
            data_dir,
            health_enabled,
            port,
            broadcast_throttle,
            delivery_timeout,
            ack_retract_delay,
            access_fail_open,
            daily_broadcast_cron,
            quotes_file,
        })
    }
}

fn millis(get: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<Duration> {
    let ms = match get(key) {
        Some(s) => parse_num::<u64>(key, &s)?,
        None => default,
    };
    Ok(Duration::from_millis(ms))
}

fn parse_num<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| Error::Config(format!("{key} must be a number, got `{raw}`")))
}

fn parse_bool(v: Option<String>) -> Option<bool> {
    v.map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn parse_csv(v: Option<String>) -> Vec<String> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
