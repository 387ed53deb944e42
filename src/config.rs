use anyhow::{bail, Context, Result};
use std::env;
use std::time::Duration;

use crate::models::AuthMode;
use crate::portal::KNOWN_BROKERS;

/// Process-wide settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub defaults: CredentialDefaults,
    pub auth_mode: AuthMode,
    pub brokers: Vec<String>,
    pub direct_first: bool,
    pub default_days: u32,
    pub max_days: u32,
    pub portal_timeout: Duration,
}

/// Fallbacks for values a request leaves out.
#[derive(Clone, Default)]
pub struct CredentialDefaults {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ent: Option<String>,
}

impl std::fmt::Debug for CredentialDefaults {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialDefaults")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("ent", &self.ent)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5000,
            defaults: CredentialDefaults::default(),
            auth_mode: AuthMode::Direct,
            brokers: KNOWN_BROKERS.iter().map(|s| s.to_string()).collect(),
            direct_first: true,
            default_days: 7,
            max_days: 60,
            portal_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut cfg = Config::default();

        if let Some(v) = get("PORT") {
            cfg.port = v.parse().with_context(|| format!("PORT is not a port number: {v}"))?;
        }
        cfg.defaults = CredentialDefaults {
            url: get("PRONOTE_URL"),
            username: get("PRONOTE_USERNAME"),
            password: lookup("PRONOTE_PASSWORD").filter(|v| !v.is_empty()),
            ent: get("PRONOTE_ENT"),
        };
        if let Some(v) = get("PRONOTE_AUTH_MODE") {
            cfg.auth_mode = match AuthMode::parse(&v) {
                Some(mode) => mode,
                None => bail!("PRONOTE_AUTH_MODE must be direct, ent or qrcode, got {v}"),
            };
        }
        if let Some(v) = get("PRONOTE_ENT_BROKERS") {
            cfg.brokers = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(v) = get("PRONOTE_DIRECT_FIRST") {
            cfg.direct_first = parse_bool(&v)
                .with_context(|| format!("PRONOTE_DIRECT_FIRST is not a boolean: {v}"))?;
        }
        if let Some(v) = get("HOMEWORK_DEFAULT_DAYS") {
            cfg.default_days = v
                .parse()
                .with_context(|| format!("HOMEWORK_DEFAULT_DAYS is not a number: {v}"))?;
        }
        if let Some(v) = get("HOMEWORK_MAX_DAYS") {
            cfg.max_days = v
                .parse()
                .with_context(|| format!("HOMEWORK_MAX_DAYS is not a number: {v}"))?;
        }
        if let Some(v) = get("PORTAL_TIMEOUT_SECS") {
            let secs: u64 = v
                .parse()
                .with_context(|| format!("PORTAL_TIMEOUT_SECS is not a number: {v}"))?;
            cfg.portal_timeout = Duration::from_secs(secs);
        }

        if cfg.default_days == 0 || cfg.max_days == 0 {
            bail!("day window settings must be at least 1");
        }
        if cfg.default_days > cfg.max_days {
            bail!(
                "HOMEWORK_DEFAULT_DAYS ({}) exceeds HOMEWORK_MAX_DAYS ({})",
                cfg.default_days,
                cfg.max_days
            );
        }
        Ok(cfg)
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let cfg = from(&[]).unwrap();
        assert_eq!(cfg.port, 5000);
        assert_eq!(cfg.default_days, 7);
        assert!(cfg.direct_first);
        assert_eq!(cfg.auth_mode, AuthMode::Direct);
        assert_eq!(cfg.brokers.len(), KNOWN_BROKERS.len());
        assert!(cfg.defaults.url.is_none());
    }

    #[test]
    fn reads_overrides() {
        let cfg = from(&[
            ("PORT", "8080"),
            ("PRONOTE_URL", " https://demo.index-education.net/pronote "),
            ("PRONOTE_PASSWORD", " spaced "),
            ("PRONOTE_AUTH_MODE", "ent"),
            ("PRONOTE_ENT_BROKERS", "monlycee, ac_lyon,,"),
            ("PRONOTE_DIRECT_FIRST", "no"),
            ("HOMEWORK_MAX_DAYS", "14"),
        ])
        .unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.defaults.url.as_deref(), Some("https://demo.index-education.net/pronote"));
        assert_eq!(cfg.defaults.password.as_deref(), Some(" spaced "));
        assert_eq!(cfg.auth_mode, AuthMode::Ent);
        assert_eq!(cfg.brokers, vec!["monlycee", "ac_lyon"]);
        assert!(!cfg.direct_first);
        assert_eq!(cfg.max_days, 14);
    }

    #[test]
    fn rejects_garbage() {
        assert!(from(&[("PORT", "eighty")]).is_err());
        assert!(from(&[("PRONOTE_DIRECT_FIRST", "maybe")]).is_err());
        assert!(from(&[("PRONOTE_AUTH_MODE", "sso")]).is_err());
        assert!(from(&[("HOMEWORK_DEFAULT_DAYS", "0")]).is_err());
    }

    #[test]
    fn default_window_must_fit_under_max() {
        let err = from(&[("HOMEWORK_DEFAULT_DAYS", "30"), ("HOMEWORK_MAX_DAYS", "14")]).unwrap_err();
        assert!(err.to_string().contains("exceeds HOMEWORK_MAX_DAYS"));
        assert!(from(&[("HOMEWORK_DEFAULT_DAYS", "14"), ("HOMEWORK_MAX_DAYS", "14")]).is_ok());
        assert!(from(&[("HOMEWORK_MAX_DAYS", "5")]).is_err());
    }

    #[test]
    fn debug_masks_password() {
        let cfg = from(&[("PRONOTE_PASSWORD", "hunter2")]).unwrap();
        assert!(!format!("{:?}", cfg).contains("hunter2"));
    }
}
