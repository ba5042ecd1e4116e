use std::fmt;

use serde::{Deserialize, Serialize};

/// Why a probed port was not accepted as the web helper.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PortError {
    /// Nothing answered the identity request.
    Unreachable,
    /// Something answered, but not with the web helper's identity.
    BadProtocolResponse,
}

impl fmt::Display for PortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortError::Unreachable => f.write_str("unreachable"),
            PortError::BadProtocolResponse => f.write_str("bad protocol response"),
        }
    }
}

/// One classified entry per port the prober reported as in use.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortResult {
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<PortError>,
}

impl PortResult {
    pub fn valid(port: u16) -> Self {
        Self { port, error: None }
    }

    pub fn failed(port: u16, error: PortError) -> Self {
        Self {
            port,
            error: Some(error),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }
}

/// What the CLI writes out after a scan.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ScanReport {
    pub host: String,
    pub low_port: u16,
    pub high_port: u16,
    pub started_at: String,
    pub results: Vec<PortResult>,
}
