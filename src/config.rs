use std::time::Duration;

use anyhow::{anyhow, Context as _};
use chrono_tz::Tz;

use crate::BotError;

const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;
const DEFAULT_HEALTH_PORT: u16 = 8080;
const DEFAULT_TIMEZONE: Tz = chrono_tz::Europe::Paris;

/// Process-wide settings read from the environment at startup.
#[derive(Clone)]
pub struct BotConfig {
    pub discord_token: String,
    pub database_url: String,
    /// Period of the reconciliation loop.
    pub tick_interval: Duration,
    pub health_port: u16,
    /// Timezone the times typed into commands are interpreted in.
    pub timezone: Tz,
}

impl std::fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfig")
            .field("discord_token", &"<redacted>")
            .field("database_url", &"<redacted>")
            .field("tick_interval", &self.tick_interval)
            .field("health_port", &self.health_port)
            .field("timezone", &self.timezone)
            .finish()
    }
}

impl BotConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, BotError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which returns the value of a variable if set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BotError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| anyhow!("Expected {} as an environment variable", key))
        };

        let tick_interval = match lookup("TICK_INTERVAL_MS") {
            Some(raw) => {
                let millis: u64 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid TICK_INTERVAL_MS: {}", raw))?;
                if millis == 0 {
                    return Err(anyhow!("TICK_INTERVAL_MS must be positive"));
                }
                Duration::from_millis(millis)
            }
            None => Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
        };

        let health_port = match lookup("HEALTH_PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid HEALTH_PORT: {}", raw))?,
            None => DEFAULT_HEALTH_PORT,
        };

        let timezone = match lookup("EVENT_TIMEZONE") {
            Some(raw) => raw
                .trim()
                .parse::<Tz>()
                .map_err(|e| anyhow!("Invalid EVENT_TIMEZONE {}: {}", raw, e))?,
            None => DEFAULT_TIMEZONE,
        };

        Ok(Self {
            discord_token: required("DISCORD_TOKEN")?,
            database_url: required("DATABASE_URL")?,
            tick_interval,
            health_port,
            timezone,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 2] = [
        ("DISCORD_TOKEN", "token"),
        ("DATABASE_URL", "postgres://localhost/events"),
    ];

    #[test]
    fn defaults_apply() {
        let config = BotConfig::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(config.tick_interval, Duration::from_secs(1));
        assert_eq!(config.health_port, 8080);
        assert_eq!(config.timezone, chrono_tz::Europe::Paris);
    }

    #[test]
    fn overrides_are_parsed() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("TICK_INTERVAL_MS", "250"),
            ("HEALTH_PORT", "9000"),
            ("EVENT_TIMEZONE", "America/New_York"),
        ]);
        let config = BotConfig::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.tick_interval, Duration::from_millis(250));
        assert_eq!(config.health_port, 9000);
        assert_eq!(config.timezone, chrono_tz::America::New_York);
    }

    #[test]
    fn missing_token_is_an_error() {
        let err = BotConfig::from_lookup(lookup(&REQUIRED[1..])).unwrap_err();
        assert!(err.to_string().contains("DISCORD_TOKEN"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        for (key, value) in [
            ("TICK_INTERVAL_MS", "0"),
            ("TICK_INTERVAL_MS", "soon"),
            ("HEALTH_PORT", "70000"),
            ("EVENT_TIMEZONE", "Mars/Olympus"),
        ] {
            let mut vars = REQUIRED.to_vec();
            vars.push((key, value));
            assert!(
                BotConfig::from_lookup(lookup(&vars)).is_err(),
                "{key}={value} should be rejected"
            );
        }
    }

    #[test]
    fn secrets_are_not_printed() {
        let config = BotConfig::from_lookup(lookup(&REQUIRED)).unwrap();
        let printed = format!("{:?}", config);
        assert!(!printed.contains("\"token\""));
        assert!(!printed.contains("postgres://"));
    }
}
