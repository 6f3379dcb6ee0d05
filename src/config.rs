use anyhow::{anyhow, Result};
use chrono::{FixedOffset, NaiveDate, Offset, Utc};
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const GEMINI_MODEL: &str = "gemini-2.0-flash-lite";
pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Hard ceiling Telegram enforces on a single message.
pub const NOTIFICATION_MAX_CHARS: usize = 4096;

/// Values shipped in sample `.env` files that mean "not configured".
const PLACEHOLDER_SECRETS: &[&str] = &["YOUR_GEMINI_API_KEY", "YOUR_BOT_TOKEN", "YOUR_CHAT_ID"];

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub log_level: String,
    pub api_port: u16,

    pub gemini_api_key: Option<String>,
    pub gemini_api_url: String,
    pub gemini_model: String,
    /// Deep reasoning with search grounding is slow; a timeout counts as one failed attempt.
    pub ai_timeout: Duration,
    pub ai_connect_timeout: Duration,
    pub ai_max_attempts: u32,
    pub ai_retry_delay: Duration,

    /// Fixed pause after every processed message (WORKER_COOLDOWN_SECS).
    pub worker_cooldown: Duration,
    /// Upcoming-window width for the frequent sweep (UPCOMING_WINDOW_HOURS).
    pub upcoming_window: chrono::Duration,
    pub sweep_interval: Duration,

    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,

    /// Offset used for "today" and for rendering kick-off times (REPORT_UTC_OFFSET_HOURS).
    pub report_offset: FixedOffset,
    pub default_stake: f64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let offset_hours: i32 = parse_var("REPORT_UTC_OFFSET_HOURS", -3)?;
        let report_offset = FixedOffset::east_opt(offset_hours * 3600)
            .ok_or_else(|| anyhow!("REPORT_UTC_OFFSET_HOURS out of range: {}", offset_hours))?;

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:data/betforge.db".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            api_port: parse_var("API_PORT", 3000)?,

            gemini_api_key: secret_var("GEMINI_API_KEY"),
            gemini_api_url: env::var("GEMINI_API_URL").unwrap_or_else(|_| GEMINI_API_URL.to_string()),
            gemini_model: env::var("GEMINI_MODEL").unwrap_or_else(|_| GEMINI_MODEL.to_string()),
            ai_timeout: Duration::from_secs(parse_var("AI_TIMEOUT_SECS", 120)?),
            ai_connect_timeout: Duration::from_secs(parse_var("AI_CONNECT_TIMEOUT_SECS", 20)?),
            ai_max_attempts: parse_var("AI_MAX_ATTEMPTS", 3)?,
            ai_retry_delay: Duration::from_secs(parse_var("AI_RETRY_DELAY_SECS", 20)?),

            worker_cooldown: Duration::from_secs(parse_var("WORKER_COOLDOWN_SECS", 30)?),
            upcoming_window: chrono::Duration::hours(parse_var("UPCOMING_WINDOW_HOURS", 4)?),
            sweep_interval: Duration::from_secs(parse_var::<u64>("SWEEP_INTERVAL_MINUTES", 30)? * 60),

            telegram_bot_token: secret_var("TELEGRAM_BOT_TOKEN"),
            telegram_chat_id: secret_var("TELEGRAM_CHAT_ID"),

            report_offset,
            default_stake: parse_var("DEFAULT_STAKE", 5.0)?,
        })
    }

    /// Calendar date "now" in the report offset.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.report_offset).date_naive()
    }
}

impl Default for Config {
    /// Reference values with no secrets, used by tests and as the env fallback.
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            log_level: "info".to_string(),
            api_port: 3000,
            gemini_api_key: None,
            gemini_api_url: GEMINI_API_URL.to_string(),
            gemini_model: GEMINI_MODEL.to_string(),
            ai_timeout: Duration::from_secs(120),
            ai_connect_timeout: Duration::from_secs(20),
            ai_max_attempts: 3,
            ai_retry_delay: Duration::from_secs(20),
            worker_cooldown: Duration::from_secs(30),
            upcoming_window: chrono::Duration::hours(4),
            sweep_interval: Duration::from_secs(30 * 60),
            telegram_bot_token: None,
            telegram_chat_id: None,
            report_offset: FixedOffset::west_opt(3 * 3600).unwrap_or_else(|| Utc.fix()),
            default_stake: 5.0,
        }
    }
}

fn parse_var<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| anyhow!("{} has an invalid value: {:?}", key, raw)),
        _ => Ok(default),
    }
}

fn secret_var(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|v| normalize_secret(&v))
}

fn normalize_secret(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || PLACEHOLDER_SECRETS.contains(&value) {
        None
    } else {
        Some(value.to_string())
    }
}
