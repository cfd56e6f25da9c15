//! Service configuration (spec §3 ambient, §6): YAML-loaded, validated at
//! boot exactly the way the teacher's `main.rs` treats kubeconfig load
//! failures as fatal.

use crate::error::Error;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub port: u16,
    #[serde(default)]
    pub ssl: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SslConfig {
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
    pub ca_cert: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NamedComponentConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

fn default_request_history_size() -> usize {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub http: HttpConfig,
    #[serde(default)]
    pub ssl: SslConfig,
    #[serde(with = "duration_serde", rename = "request_aggregation_delay")]
    pub request_aggregation_delay: Duration,
    #[serde(default)]
    pub provider: NamedComponentConfig,
    #[serde(default)]
    pub engine: NamedComponentConfig,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub credentials_path: Option<PathBuf>,
    #[serde(default)]
    pub forward_service_url: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default = "default_request_history_size")]
    pub request_history_size: usize,
}

/// `humantime`-free duration (de)serialization module, since the corpus
/// doesn't carry the `humantime` crate: accepts either a plain integer
/// number of seconds or a `"30s"`/`"5m"` style string.
mod duration_serde {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Seconds(u64),
            Text(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
        }
    }

    fn parse_duration(text: &str) -> Result<Duration, String> {
        let text = text.trim();
        let (digits, unit) = text
            .find(|c: char| !c.is_ascii_digit())
            .map(|idx| text.split_at(idx))
            .unwrap_or((text, "s"));
        let value: u64 = digits.parse().map_err(|_| format!("invalid duration: {text}"))?;
        let multiplier = match unit {
            "" | "s" => 1,
            "m" => 60,
            "h" => 3600,
            other => return Err(format!("unknown duration unit: {other}")),
        };
        Ok(Duration::from_secs(value * multiplier))
    }
}

impl ServiceConfig {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::fatal(format!("reading config {}: {e}", path.display())))?;
        let config: ServiceConfig = serde_yaml::from_str(&text).map_err(Error::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Boot-time validation (spec §6): port and aggregation delay must be
    /// non-zero; SSL, if enabled, needs all three files present.
    pub fn validate(&self) -> Result<(), Error> {
        if self.http.port == 0 {
            return Err(Error::fatal("http.port must not be 0"));
        }
        if self.request_aggregation_delay.is_zero() {
            return Err(Error::fatal("request_aggregation_delay must not be 0"));
        }
        if self.http.ssl {
            let complete = self.ssl.cert.is_some() && self.ssl.key.is_some() && self.ssl.ca_cert.is_some();
            if !complete {
                return Err(Error::fatal(
                    "http.ssl is enabled but ssl.{cert,key,ca_cert} is not a complete triple",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_yaml() -> String {
        r#"
http:
  port: 8080
request_aggregation_delay: 5s
provider:
  name: test
engine:
  name: batch-scheduler
"#
        .to_string()
    }

    #[test]
    fn parses_valid_config() {
        let config: ServiceConfig = serde_yaml::from_str(&base_yaml()).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.request_aggregation_delay, Duration::from_secs(5));
        assert_eq!(config.request_history_size, 100);
    }

    #[test]
    fn rejects_zero_port() {
        let yaml = base_yaml().replace("port: 8080", "port: 0");
        let config: ServiceConfig = serde_yaml::from_str(&yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_aggregation_delay() {
        let yaml = base_yaml().replace("request_aggregation_delay: 5s", "request_aggregation_delay: 0s");
        let config: ServiceConfig = serde_yaml::from_str(&yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_incomplete_ssl_triple() {
        let yaml = base_yaml().replace("http:\n  port: 8080", "http:\n  port: 8080\n  ssl: true");
        let config: ServiceConfig = serde_yaml::from_str(&yaml).unwrap();
        assert!(config.validate().is_err());
    }
}
