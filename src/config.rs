//! Application configuration, read from environment variables.
//!
//! Everything goes through [`AppConfig::from_lookup`] so tests can feed a
//! map instead of mutating the process environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::channels::email::EmailConfig;
use crate::channels::telegram::TelegramConfig;
use crate::error::ConfigError;
use crate::llm::LlmConfig;

/// Key/value source for configuration.
pub type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Top-level runtime configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Use the canned keyword responder instead of the generation endpoint.
    pub ai_mock: bool,
    /// Generation endpoint. Required when `ai_mock` is off.
    pub llm: Option<LlmConfig>,
    pub poll_interval: Duration,
    /// Messages shorter than this (in characters) with no contact entities are irrelevant.
    pub relevance_min_length: usize,
    pub telegram: Option<TelegramConfig>,
    /// Chat topics tickets rotate through.
    pub topic_ids: Vec<i64>,
    /// Base URL used for the "open ticket" link in chat cards.
    pub frontend_url: String,
    pub pubsub_topic: String,
    pub db_path: PathBuf,
    pub http_port: u16,
    pub knowledge_dir: Option<PathBuf>,
    /// Zero keeps drafting inline; anything else enables deferred drafting.
    pub draft_concurrency: usize,
    pub log_dir: Option<PathBuf>,
    pub email: Option<EmailConfig>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|key: &str| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        let ai_mock = parse_bool(lookup, "AI_MOCK", true)?;

        let llm = match lookup("LLM_API_URL").filter(|s| !s.trim().is_empty()) {
            Some(api_url) => Some(LlmConfig {
                api_url,
                api_token: lookup("LLM_API_TOKEN").map(SecretString::from),
                timeout: Duration::from_secs(parse_or(lookup, "LLM_TIMEOUT_SECS", 30u64)?),
            }),
            None => None,
        };
        if !ai_mock && llm.is_none() {
            return Err(ConfigError::MissingRequired {
                key: "LLM_API_URL".into(),
                hint: "Set it or enable AI_MOCK=true".into(),
            });
        }

        let poll_secs: u64 = parse_or(lookup, "POLL_INTERVAL_SECS", 60)?;
        if poll_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "POLL_INTERVAL_SECS".into(),
                message: "must be greater than zero".into(),
            });
        }

        Ok(Self {
            ai_mock,
            llm,
            poll_interval: Duration::from_secs(poll_secs),
            relevance_min_length: parse_or(lookup, "RELEVANCE_MIN_LENGTH", 50)?,
            telegram: TelegramConfig::from_lookup(lookup)?,
            topic_ids: parse_list(lookup, "TELEGRAM_TOPIC_IDS")?,
            frontend_url: lookup("FRONTEND_URL")
                .unwrap_or_else(|| "http://localhost:5173".to_string())
                .trim_end_matches('/')
                .to_string(),
            pubsub_topic: lookup("PUBSUB_TOPIC").unwrap_or_else(|| "tickets".to_string()),
            db_path: lookup("DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/support-triage.db")),
            http_port: parse_or(lookup, "HTTP_PORT", 8080)?,
            knowledge_dir: lookup("KNOWLEDGE_DIR").map(PathBuf::from),
            draft_concurrency: parse_or(lookup, "DRAFT_CONCURRENCY", 0)?,
            log_dir: lookup("LOG_DIR").map(PathBuf::from),
            email: EmailConfig::from_lookup(lookup)?,
        })
    }
}

/// Parse `key` if present, otherwise return `default`.
pub(crate) fn parse_or<T>(lookup: Lookup<'_>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: e.to_string(),
                })
        }
        _ => Ok(default),
    }
}

pub(crate) fn parse_bool(lookup: Lookup<'_>, key: &str, default: bool) -> Result<bool, ConfigError> {
    match lookup(key).map(|s| s.trim().to_lowercase()) {
        None => Ok(default),
        Some(s) if s.is_empty() => Ok(default),
        Some(s) => match s.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected a boolean, got '{other}'"),
            }),
        },
    }
}

/// Comma-separated list; blank entries are skipped.
pub(crate) fn parse_list<T>(lookup: Lookup<'_>, key: &str) -> Result<Vec<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{s}': {e}"),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(&move |key: &str| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = config_from(&[]).unwrap();
        assert!(config.ai_mock);
        assert!(config.llm.is_none());
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert_eq!(config.relevance_min_length, 50);
        assert!(config.topic_ids.is_empty());
        assert_eq!(config.pubsub_topic, "tickets");
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.draft_concurrency, 0);
        assert!(config.email.is_none());
        assert!(config.telegram.is_none());
    }

    #[test]
    fn topic_list_is_parsed_in_order() {
        let config = config_from(&[("TELEGRAM_TOPIC_IDS", "10, 20,,30")]).unwrap();
        assert_eq!(config.topic_ids, vec![10, 20, 30]);
    }

    #[test]
    fn bad_topic_id_is_rejected() {
        let err = config_from(&[("TELEGRAM_TOPIC_IDS", "10,abc")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "TELEGRAM_TOPIC_IDS"));
    }

    #[test]
    fn live_mode_requires_endpoint() {
        let err = config_from(&[("AI_MOCK", "false")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { .. }));

        let config = config_from(&[
            ("AI_MOCK", "false"),
            ("LLM_API_URL", "https://example.test/models/x"),
            ("LLM_API_TOKEN", "hf_secret"),
        ])
        .unwrap();
        assert!(!config.ai_mock);
        let llm = config.llm.unwrap();
        assert_eq!(llm.api_url, "https://example.test/models/x");
        assert_eq!(llm.timeout, Duration::from_secs(30));
    }

    #[test]
    fn invalid_numbers_and_booleans_fail() {
        assert!(config_from(&[("POLL_INTERVAL_SECS", "soon")]).is_err());
        assert!(config_from(&[("POLL_INTERVAL_SECS", "0")]).is_err());
        assert!(config_from(&[("AI_MOCK", "maybe")]).is_err());
    }

    #[test]
    fn frontend_url_trailing_slash_is_trimmed() {
        let config = config_from(&[("FRONTEND_URL", "https://support.example.com/")]).unwrap();
        assert_eq!(config.frontend_url, "https://support.example.com");
    }
}
