//! Wallex connection settings

use std::fmt;
use std::time::Duration;
use url::Url;

/// Production REST and socket host
pub const DEFAULT_BASE_URL: &str = "https://api.wallex.ir";

/// Settings shared by the REST gateway and the socket stream
#[derive(Clone)]
pub struct WallexConfig {
    /// REST base URL; the socket endpoint lives on the same host
    pub base_url: String,
    /// API key for private endpoints; empty means public access only
    pub api_key: String,
    /// Per-request timeout for REST calls
    pub request_timeout: Duration,
    /// Upper bound on the socket handshake
    pub handshake_timeout: Duration,
}

impl WallexConfig {
    /// Settings for `base_url` with default timeouts
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        use common::constants::network::{HTTP_REQUEST_TIMEOUT_SECS, SOCKET_HANDSHAKE_TIMEOUT_SECS};
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            request_timeout: Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS),
            handshake_timeout: Duration::from_secs(SOCKET_HANDSHAKE_TIMEOUT_SECS),
        }
    }

    /// Whether private endpoints can be called
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Socket.IO websocket URL on the REST host
    pub fn socket_url(&self) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&self.base_url)?;
        let scheme = match url.scheme() {
            "https" => "wss",
            "http" => "ws",
            other => other,
        }
        .to_string();
        // Only fails between special and non-special schemes
        let _ = url.set_scheme(&scheme);
        url.set_path("/socket.io/");
        url.set_query(Some("EIO=4&transport=websocket"));
        Ok(url)
    }
}

impl fmt::Debug for WallexConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WallexConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &if self.has_credentials() { "<set>" } else { "<unset>" })
            .field("request_timeout", &self.request_timeout)
            .field("handshake_timeout", &self.handshake_timeout)
            .finish()
    }
}

impl Default for WallexConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL, "")
    }
}
