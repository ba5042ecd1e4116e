use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::{Error, Result};

/// One GET request: URL, query pairs, extra headers and an optional timeout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// The HTTP collaborator. Returns the raw response body so that parsing
/// failures can be told apart from transport failures.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, request: &HttpRequest) -> Result<String>;
}

/// Send `request` and parse the body as JSON.
pub async fn get_json(transport: &dyn Transport, request: &HttpRequest) -> Result<Value> {
    let body = transport.get(request).await?;
    serde_json::from_str(&body).map_err(|e| Error::json(&request.url, e))
}

/// `reqwest`-backed transport. The local service uses a certificate for a
/// wildcard domain pointed at loopback, so invalid certificates are accepted
/// unless the config says otherwise.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    default_timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .use_native_tls()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| Error::transport("<client>", e))?;
        Ok(Self {
            client,
            default_timeout: config.request_timeout(),
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, request: &HttpRequest) -> Result<String> {
        let mut builder = self
            .client
            .get(&request.url)
            .query(&request.query)
            .timeout(request.timeout.unwrap_or(self.default_timeout));
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        // Status codes are not inspected: the body decides what happened.
        let response = builder
            .send()
            .await
            .map_err(|e| Error::transport(&request.url, e))?;
        response
            .text()
            .await
            .map_err(|e| Error::transport(&request.url, e))
    }
}
