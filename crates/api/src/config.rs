//! Process configuration, read from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};

use portico_observability::LogFormat;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// `PORTICO_BIND_ADDR`
    pub bind_addr: SocketAddr,
    /// `PORTICO_OPEN_REGISTRATION`: add the public `POST user/register` rule.
    pub open_registration: bool,
    /// `PORTICO_SERVICES_FILE`: JSON array of service descriptors.
    pub services_file: Option<PathBuf>,
    /// `PORTICO_DATABASE_URL`: read descriptors from Postgres instead.
    pub database_url: Option<String>,
    /// `PORTICO_ROLES_FILE`: roles, API keys and sessions for the static
    /// session resolver.
    pub roles_file: Option<PathBuf>,
    /// `PORTICO_REDIS_URL`: shared cache (requires the `redis` feature).
    pub redis_url: Option<String>,
    /// `PORTICO_LOG_FORMAT`
    pub log_format: LogFormat,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            open_registration: false,
            services_file: None,
            database_url: None,
            roles_file: None,
            redis_url: None,
            log_format: LogFormat::Json,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = var("PORTICO_BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .context("PORTICO_BIND_ADDR must be a socket address such as 0.0.0.0:8080")?;

        let open_registration = match var("PORTICO_OPEN_REGISTRATION") {
            Some(raw) => parse_bool(&raw).context("PORTICO_OPEN_REGISTRATION")?,
            None => false,
        };

        let log_format = match var("PORTICO_LOG_FORMAT") {
            Some(raw) => raw.parse::<LogFormat>().context("PORTICO_LOG_FORMAT")?,
            None => LogFormat::Json,
        };

        Ok(Self {
            bind_addr,
            open_registration,
            services_file: var("PORTICO_SERVICES_FILE").map(PathBuf::from),
            database_url: var("PORTICO_DATABASE_URL"),
            roles_file: var("PORTICO_ROLES_FILE").map(PathBuf::from),
            redis_url: var("PORTICO_REDIS_URL"),
            log_format,
        })
    }
}

fn parse_bool(raw: &str) -> anyhow::Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("'{other}' is not a boolean"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = GatewayConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, GatewayConfig::default());
    }

    #[test]
    fn reads_every_variable() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("PORTICO_BIND_ADDR", "127.0.0.1:9000"),
            ("PORTICO_OPEN_REGISTRATION", "Yes"),
            ("PORTICO_SERVICES_FILE", "/etc/portico/services.json"),
            ("PORTICO_DATABASE_URL", "postgres://localhost/portico"),
            ("PORTICO_ROLES_FILE", "/etc/portico/roles.json"),
            ("PORTICO_REDIS_URL", "redis://localhost"),
            ("PORTICO_LOG_FORMAT", "pretty"),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:9000".parse().unwrap());
        assert!(config.open_registration);
        assert_eq!(config.services_file, Some(PathBuf::from("/etc/portico/services.json")));
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/portico"));
        assert_eq!(config.roles_file, Some(PathBuf::from("/etc/portico/roles.json")));
        assert_eq!(config.redis_url.as_deref(), Some("redis://localhost"));
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn empty_values_count_as_unset() {
        let config =
            GatewayConfig::from_lookup(lookup(&[("PORTICO_REDIS_URL", "  "), ("PORTICO_OPEN_REGISTRATION", "")]))
                .unwrap();
        assert_eq!(config.redis_url, None);
        assert!(!config.open_registration);
    }

    #[test]
    fn invalid_values_are_errors() {
        assert!(GatewayConfig::from_lookup(lookup(&[("PORTICO_OPEN_REGISTRATION", "maybe")])).is_err());
        assert!(GatewayConfig::from_lookup(lookup(&[("PORTICO_BIND_ADDR", "nowhere")])).is_err());
        assert!(GatewayConfig::from_lookup(lookup(&[("PORTICO_LOG_FORMAT", "xml")])).is_err());
    }
}
