use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{ClientConfig, ScanConfig};
use crate::error::{Error, Result};
use crate::fanout::fan_out;
use crate::scanner::{ConnectOptions, PortProber, TcpProber};
use crate::transport::{ReqwestTransport, Transport};
use crate::types::PortResult;
use crate::validator::ProtocolValidator;

/// Finds ports on which the web helper is answering.
#[derive(Clone)]
pub struct PortScanner {
    config: Arc<ClientConfig>,
    prober: Arc<dyn PortProber>,
    validator: ProtocolValidator,
}

impl PortScanner {
    /// Scanner with the TCP connect prober and the `reqwest` transport.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new(&config)?);
        Ok(Self::with_collaborators(
            config,
            transport,
            Arc::new(TcpProber),
        ))
    }

    pub fn with_collaborators(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        prober: Arc<dyn PortProber>,
    ) -> Self {
        let config = Arc::new(config);
        let validator = ProtocolValidator::new(config.clone(), transport);
        Self {
            config,
            prober,
            validator,
        }
    }

    /// Probe the configured range, validate every port that is in use, and
    /// return one entry per such port (errors dropped unless
    /// `include_errors` is set), in the order the prober reported them.
    pub async fn scan_ports(&self, scan: &ScanConfig) -> Result<Vec<PortResult>> {
        scan.validate()?;
        let host = scan
            .host
            .clone()
            .unwrap_or_else(|| self.config.local_hostname());

        let options = ConnectOptions {
            timeout: scan.timeout,
            concurrency: scan.concurrency,
        };
        let in_use = self
            .prober
            .probe(&host, scan.low_port, scan.high_port, options)
            .await?;
        debug!(%host, candidates = in_use.len(), "probe finished");

        // Validate against the host the prober connected to.
        let host: Arc<str> = host.into();
        let validator = self.validator.clone();
        let results = fan_out(in_use, Some(scan.concurrency), move |port| {
            let validator = validator.clone();
            let host = host.clone();
            async move { Ok::<_, Error>(validator.validate(&host, port).await) }
        })
        .await?;

        let valid = results.iter().filter(|r| r.is_valid()).count();
        info!(
            low = scan.low_port,
            high = scan.high_port,
            probed = results.len(),
            valid,
            "port scan complete"
        );

        Ok(filter_results(results, scan.include_errors))
    }
}

fn filter_results(results: Vec<PortResult>, include_errors: bool) -> Vec<PortResult> {
    if include_errors {
        results
    } else {
        results.into_iter().filter(PortResult::is_valid).collect()
    }
}
