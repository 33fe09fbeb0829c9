use std::net::SocketAddr;
use std::time::Duration;

use url::Url;

use crate::client::{DEFAULT_TIMEOUT, DRIVE_API_BASE};

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    // Listen address
    pub listen_addr: SocketAddr,
    // Drive API base; the generic relay only forwards to this origin
    pub drive_api_base: String,
    // Bound on every outbound Drive request
    pub upstream_timeout: Duration,
    // Public cache lifetime for relayed file content
    pub cache_max_age: Duration,
    // How many parent hops a sub-folder may be below a shared folder
    pub max_scope_depth: usize,
    // log level for http tracing
    pub log_level: tracing::Level,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            drive_api_base: DRIVE_API_BASE.to_string(),
            upstream_timeout: DEFAULT_TIMEOUT,
            cache_max_age: Duration::from_secs(300),
            max_scope_depth: 32,
            log_level: tracing::Level::INFO,
        }
    }
}

impl GatewayConfig {
    pub fn new(listen_addr: SocketAddr, drive_api_base: impl Into<String>) -> Result<Self, ConfigError> {
        let drive_api_base = drive_api_base.into();
        Url::parse(&drive_api_base)?;
        tracing::info!(
            "Creating gateway Config: listen_addr={}, drive_api_base={}",
            listen_addr,
            drive_api_base
        );
        Ok(Self {
            listen_addr,
            drive_api_base,
            ..Default::default()
        })
    }

    /// Whether `target` shares the Drive API base's scheme, host and port.
    pub fn is_drive_url(&self, target: &Url) -> bool {
        Url::parse(&self.drive_api_base)
            .map(|base| base.origin() == target.origin())
            .unwrap_or(false)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}
