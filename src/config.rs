use std::collections::HashMap;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate};

use crate::error::ConfigError;
use crate::models::window::WorkingWindow;

pub const DEFAULT_RUN_MODE: &str = "cli";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_GOOGLE_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
pub const DEFAULT_CALENDAR_ID: &str = "primary";
pub const DEFAULT_TIMEZONE_OFFSET: &str = "+03:00";
pub const DEFAULT_EVENT_SUMMARY: &str = "Meeting with lead";

/// Raw `KEY=value` pairs read from an env-style file.
#[derive(Debug, Default, Clone)]
pub struct AppConfig {
    values: HashMap<String, String>,
}

impl AppConfig {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut values = HashMap::new();
        for (idx, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(ConfigError::InvalidLine {
                    line: idx + 1,
                    content: line.to_string(),
                });
            };
            let key = key.trim();
            let mut value = value.trim().to_string();
            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = value[1..value.len() - 1].to_string();
            }
            values.insert(key.to_string(), value);
        }
        Ok(Self { values })
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    /// File value first, then the process environment.
    pub fn lookup(&self, key: &str) -> Option<String> {
        self.get(key).or_else(|| env::var(key).ok())
    }
}

/// Scheduling policy applied to every free-slot request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulingPolicy {
    pub offset: FixedOffset,
    pub start_hour: u32,
    pub end_hour: u32,
    pub slot_minutes: u32,
}

impl SchedulingPolicy {
    /// Hours and slot length must form a valid working window on any day.
    pub fn validate(&self) -> Result<(), ConfigError> {
        WorkingWindow::new(
            NaiveDate::default(),
            self.start_hour,
            self.end_hour,
            self.slot_minutes,
            self.offset,
        )
        .map(|_| ())
        .map_err(|err| ConfigError::InvalidValue {
            key: "WORK_START_HOUR/WORK_END_HOUR/SLOT_MINUTES".to_string(),
            value: format!(
                "{}..{} in {} minute slots ({})",
                self.start_hour, self.end_hour, self.slot_minutes, err
            ),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleSettings {
    pub api_base: String,
    pub calendar_id: String,
    pub event_summary: String,
    pub credentials_file: PathBuf,
    pub token_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAISettings {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

impl OpenAISettings {
    pub fn require_api_key(&self) -> Result<String, ConfigError> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::Missing("OPENAI_API_KEY".to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub run_mode: String,
    pub bind_addr: SocketAddr,
    pub scheduling: SchedulingPolicy,
    pub google: GoogleSettings,
    pub openai: OpenAISettings,
    pub history_limit: usize,
    pub max_sessions: usize,
}

impl Settings {
    pub fn load(config: &AppConfig) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| config.lookup(key))
    }

    pub fn from_lookup<F>(get_prop: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| get_prop(key).unwrap_or_else(|| default.to_string());

        let offset_raw = text("TIMEZONE_OFFSET", DEFAULT_TIMEZONE_OFFSET);
        let offset = parse_offset(&offset_raw).ok_or_else(|| ConfigError::InvalidValue {
            key: "TIMEZONE_OFFSET".to_string(),
            value: offset_raw.clone(),
        })?;

        let scheduling = SchedulingPolicy {
            offset,
            start_hour: parse_or(&get_prop, "WORK_START_HOUR", 9)?,
            end_hour: parse_or(&get_prop, "WORK_END_HOUR", 18)?,
            slot_minutes: parse_or(&get_prop, "SLOT_MINUTES", 30)?,
        };
        scheduling.validate()?;

        Ok(Self {
            run_mode: text("RUN_MODE", DEFAULT_RUN_MODE),
            bind_addr: parse_or(
                &get_prop,
                "BIND_ADDR",
                SocketAddr::from(([127, 0, 0, 1], 8000)),
            )?,
            scheduling,
            google: GoogleSettings {
                api_base: text("GOOGLE_API_BASE", DEFAULT_GOOGLE_API_BASE)
                    .trim_end_matches('/')
                    .to_string(),
                calendar_id: text("CALENDAR_ID", DEFAULT_CALENDAR_ID),
                event_summary: text("EVENT_SUMMARY", DEFAULT_EVENT_SUMMARY),
                credentials_file: PathBuf::from(text("GOOGLE_CREDENTIALS_FILE", "credentials.json")),
                token_file: PathBuf::from(text("GOOGLE_TOKEN_FILE", "token.json")),
            },
            openai: OpenAISettings {
                api_key: get_prop("OPENAI_API_KEY"),
                model: text("OPENAI_MODEL", DEFAULT_OPENAI_MODEL),
                base_url: text("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL)
                    .trim_end_matches('/')
                    .to_string(),
            },
            history_limit: parse_or(&get_prop, "HISTORY_LIMIT", 20)?,
            max_sessions: parse_or(&get_prop, "MAX_SESSIONS", 256)?,
        })
    }
}

fn parse_or<F, T>(get_prop: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match get_prop(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw,
        }),
    }
}

/// Parses `+03:00`, `-05:30` or `Z`.
pub fn parse_offset(raw: &str) -> Option<FixedOffset> {
    let stamp = format!("2000-01-01T00:00:00{}", raw.trim());
    DateTime::parse_from_rfc3339(&stamp).ok().map(|dt| *dt.offset())
}
