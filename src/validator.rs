use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::Error;
use crate::transport::{get_json, HttpRequest, Transport};
use crate::types::{PortError, PortResult};

pub(crate) const VERSION_PATH: &str = "/service/version.json";

/// Fields that only the web helper's version endpoint returns together.
const FINGERPRINT: [&str; 2] = ["client_version", "version"];

/// Tells the web helper apart from whatever else is listening on a port.
#[derive(Clone)]
pub struct ProtocolValidator {
    config: Arc<ClientConfig>,
    transport: Arc<dyn Transport>,
}

impl ProtocolValidator {
    pub fn new(config: Arc<ClientConfig>, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }

    /// Build the identity request for `host:port`.
    pub fn version_request(&self, host: &str, port: u16) -> HttpRequest {
        HttpRequest::get(self.config.url_on(host, port, VERSION_PATH))
            .query("service", "remote")
            .header("Origin", self.config.origin.as_str())
    }

    /// Classify `port` on `host`, the same host the prober connected to.
    /// Never fails: every outcome is a `PortResult`.
    pub async fn validate(&self, host: &str, port: u16) -> PortResult {
        let request = self.version_request(host, port);
        let result = match get_json(self.transport.as_ref(), &request).await {
            Ok(body) if has_fingerprint(&body) => PortResult::valid(port),
            Ok(_) => PortResult::failed(port, PortError::BadProtocolResponse),
            Err(Error::Transport { reason, .. }) => {
                debug!(port, %reason, "identity request failed");
                PortResult::failed(port, PortError::Unreachable)
            }
            Err(_) => PortResult::failed(port, PortError::BadProtocolResponse),
        };
        debug!(port, valid = result.is_valid(), "validated port");
        result
    }
}

fn has_fingerprint(body: &Value) -> bool {
    FINGERPRINT
        .iter()
        .all(|field| body.get(field).is_some_and(is_truthy))
}

/// Empty strings, zero, `false` and `null` do not count as present.
fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
