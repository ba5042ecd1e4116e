use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Port the web helper binds to when nobody tells us otherwise.
pub const DEFAULT_PORT: u16 = 4370;

const SUBDOMAIN_LEN: usize = 10;

/// Where and how to reach the token issuer and the local service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub port: u16,
    pub token_url: String,
    /// Value of the `Origin` header the local service insists on.
    pub origin: String,
    pub scheme: String,
    pub host_suffix: String,
    /// Use this host verbatim instead of a random subdomain of `host_suffix`.
    pub fixed_host: Option<String>,
    pub request_timeout_ms: u64,
    pub accept_invalid_certs: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            token_url: "https://open.spotify.com/token".into(),
            origin: "https://open.spotify.com".into(),
            scheme: "https".into(),
            host_suffix: "spotilocal.com".into(),
            fixed_host: None,
            request_timeout_ms: 10_000,
            accept_invalid_certs: true,
        }
    }
}

impl ClientConfig {
    /// Load a JSON config file. Missing fields keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("invalid config file: {}", path.display()))
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// A host name resolving to the local service. Random per call unless
    /// `fixed_host` is set.
    pub fn local_hostname(&self) -> String {
        match &self.fixed_host {
            Some(host) => host.clone(),
            None => format!("{}.{}", random_label(SUBDOMAIN_LEN), self.host_suffix),
        }
    }

    /// Absolute URL of `path` on the local service at `port`.
    pub fn local_url(&self, port: u16, path: &str) -> String {
        self.url_on(&self.local_hostname(), port, path)
    }

    /// Absolute URL of `path` on `host:port`.
    pub fn url_on(&self, host: &str, port: u16, path: &str) -> String {
        format!("{}://{}:{}{}", self.scheme, host, port, path)
    }
}

fn random_label(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| rng.gen_range(b'a'..=b'z') as char)
        .collect()
}

/// Which port range to probe and how to report the outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub low_port: u16,
    pub high_port: u16,
    /// Per-socket connect timeout.
    #[serde(with = "millis")]
    pub timeout: Duration,
    /// Keep ports that failed validation in the returned list.
    pub include_errors: bool,
    /// Host to probe. A fresh local host name is generated when absent.
    pub host: Option<String>,
    pub concurrency: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            low_port: 3000,
            high_port: 5000,
            timeout: Duration::from_millis(300),
            include_errors: false,
            host: None,
            concurrency: 256,
        }
    }
}

impl ScanConfig {
    pub fn range(low_port: u16, high_port: u16) -> Self {
        Self {
            low_port,
            high_port,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn include_errors(mut self, include: bool) -> Self {
        self.include_errors = include;
        self
    }

    /// Only return ports that answered as the web helper. This is the
    /// default; `open_only(false)` is the same as `include_errors(true)`.
    pub fn open_only(self, open: bool) -> Self {
        self.include_errors(!open)
    }

    pub fn validate(&self) -> Result<()> {
        if self.low_port == 0 {
            return Err(Error::InvalidConfig("port 0 is not probeable".into()));
        }
        if self.low_port > self.high_port {
            return Err(Error::InvalidConfig(format!(
                "low port {} is above high port {}",
                self.low_port, self.high_port
            )));
        }
        if self.timeout.is_zero() {
            return Err(Error::InvalidConfig("timeout must be positive".into()));
        }
        Ok(())
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_hostname_has_ten_lowercase_letters() {
        let cfg = ClientConfig::default();
        let host = cfg.local_hostname();
        let (label, suffix) = host.split_once('.').unwrap();
        assert_eq!(suffix, "spotilocal.com");
        assert_eq!(label.len(), 10);
        assert!(label.chars().all(|c| c.is_ascii_lowercase()));
    }

    #[test]
    fn fixed_host_overrides_random_one() {
        let cfg = ClientConfig {
            scheme: "http".into(),
            fixed_host: Some("127.0.0.1".into()),
            ..ClientConfig::default()
        };
        assert_eq!(
            cfg.local_url(4370, "/service/version.json"),
            "http://127.0.0.1:4370/service/version.json"
        );
    }

    #[test]
    fn scan_defaults_filter_errors() {
        let cfg = ScanConfig::default();
        assert_eq!((cfg.low_port, cfg.high_port), (3000, 5000));
        assert_eq!(cfg.timeout, Duration::from_millis(300));
        assert!(!cfg.include_errors);
        assert!(ScanConfig::default().open_only(false).include_errors);
    }

    #[test]
    fn inverted_range_is_rejected() {
        let err = ScanConfig::range(4372, 4370).validate().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert!(ScanConfig::range(4370, 4370).validate().is_ok());
        assert!(ScanConfig::range(4370, 4372)
            .with_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn partial_scan_config_from_json() {
        let cfg: ScanConfig =
            serde_json::from_str(r#"{"low_port": 4370, "high_port": 4380, "timeout": 50}"#).unwrap();
        assert_eq!(cfg.low_port, 4370);
        assert_eq!(cfg.timeout, Duration::from_millis(50));
        assert_eq!(cfg.concurrency, 256);
    }
}
