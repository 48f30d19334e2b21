//! Runtime settings read from the environment (after `.env` is loaded).

use crate::error::RaterError;
use std::str::FromStr;

pub const DEFAULT_BASE_URL: &str = "https://api.prizepicks.com";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub bankroll: f64,
    pub minimum_slips: usize,
    pub confidence_threshold: f64,
    pub request_delay_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            bankroll: 1000.0,
            minimum_slips: 5,
            confidence_threshold: 0.75,
            request_delay_ms: 1000,
        }
    }
}

impl Settings {
    /// Reads settings from process environment variables.
    pub fn from_env() -> Result<Self, RaterError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup, falling back to defaults
    /// for absent keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RaterError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Settings::default();

        let api_key = lookup("PRIZEPICKS_API_KEY").filter(|k| !k.trim().is_empty());
        let base_url = lookup("PROJECTIONS_BASE_URL").unwrap_or(defaults.base_url);
        let bankroll = parse_or(&lookup, "BANKROLL", defaults.bankroll)?;
        let minimum_slips = parse_or(&lookup, "MINIMUM_SLIPS_PER_DAY", defaults.minimum_slips)?;
        let confidence_threshold = parse_or(
            &lookup,
            "SLIP_CONFIDENCE_THRESHOLD",
            defaults.confidence_threshold,
        )?;
        let request_delay_ms = parse_or(&lookup, "REQUEST_DELAY_MS", defaults.request_delay_ms)?;

        let settings = Settings {
            api_key,
            base_url,
            bankroll,
            minimum_slips,
            confidence_threshold,
            request_delay_ms,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), RaterError> {
        if !(self.bankroll > 0.0) {
            return Err(RaterError::InvalidConfig(format!(
                "BANKROLL must be positive, got {}",
                self.bankroll
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(RaterError::InvalidConfig(format!(
                "SLIP_CONFIDENCE_THRESHOLD must be within 0.0..=1.0, got {}",
                self.confidence_threshold
            )));
        }
        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, RaterError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| RaterError::InvalidConfig(format!("{key}: cannot parse '{raw}'"))),
    }
}
