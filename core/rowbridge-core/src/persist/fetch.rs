//! Remote transport capability.
//!
//! The engine never speaks a network protocol itself: remote locations are
//! read (and, where allowed, written) through an injected [`Fetch`]. The
//! bundled [`HttpFetcher`] covers `http`/`https`; other schemes such as
//! `ftp` are served by a caller-supplied implementation.

use crate::error::{BridgeError, BridgeResult};
use crate::persist::Location;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::io::Read;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Default request timeout of [`HttpFetcher`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Blocking transport for remote locations.
pub trait Fetch: Send + Sync {
    /// Full content at `url`, or a storage error.
    fn fetch(&self, url: &Url) -> BridgeResult<Vec<u8>>;

    /// Whether [`store`](Self::store) may be called for `url`.
    fn supports_write(&self, _url: &Url) -> bool {
        false
    }

    /// Replace the content at `url` in full.
    fn store(&self, url: &Url, _bytes: &[u8]) -> BridgeResult<()> {
        Err(BridgeError::Configuration(format!(
            "transport cannot write '{}'",
            Location::Remote(url.clone())
        )))
    }
}

/// HTTP(S) transport on `ureq`. Credentials embedded in the URL are sent as
/// Basic auth; writes use `PUT` and are off unless enabled.
pub struct HttpFetcher {
    agent: ureq::Agent,
    allow_put: bool,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::with_agent(ureq::AgentBuilder::new().timeout(DEFAULT_TIMEOUT).build())
    }

    pub fn with_agent(agent: ureq::Agent) -> Self {
        Self {
            agent,
            allow_put: false,
        }
    }

    /// Allow continuous-mode writes through `PUT`.
    pub fn with_put(mut self, allow: bool) -> Self {
        self.allow_put = allow;
        self
    }

    fn request(&self, method: &str, url: &Url) -> BridgeResult<ureq::Request> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(BridgeError::Configuration(format!(
                "no transport for scheme '{}'; open the session with Session::with_fetcher and a Fetch that serves it",
                url.scheme()
            )));
        }

        let mut bare = url.clone();
        let _ = bare.set_username("");
        let _ = bare.set_password(None);
        let mut request = self.agent.request(method, bare.as_str());

        if !url.username().is_empty() {
            let credentials = format!("{}:{}", url.username(), url.password().unwrap_or(""));
            request = request.set(
                "Authorization",
                &format!("Basic {}", STANDARD.encode(credentials)),
            );
        }
        Ok(request)
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

fn transport_error(url: &Url, err: ureq::Error) -> BridgeError {
    let location = Location::Remote(url.clone()).to_string();
    match err {
        ureq::Error::Status(code, _) => BridgeError::storage(location, format!("HTTP status {code}")),
        ureq::Error::Transport(err) => BridgeError::storage(location, err),
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &Url) -> BridgeResult<Vec<u8>> {
        let response = self
            .request("GET", url)?
            .call()
            .map_err(|err| transport_error(url, err))?;

        let mut bytes = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|err| BridgeError::storage(Location::Remote(url.clone()).to_string(), err))?;
        debug!(bytes = bytes.len(), "http fetch complete");
        Ok(bytes)
    }

    fn supports_write(&self, url: &Url) -> bool {
        self.allow_put && matches!(url.scheme(), "http" | "https")
    }

    fn store(&self, url: &Url, bytes: &[u8]) -> BridgeResult<()> {
        if !self.supports_write(url) {
            warn!(url = %Location::Remote(url.clone()), "write refused: PUT not enabled");
            return Err(BridgeError::Configuration(format!(
                "writes to '{}' are not enabled",
                Location::Remote(url.clone())
            )));
        }
        self.request("PUT", url)?
            .send_bytes(bytes)
            .map_err(|err| transport_error(url, err))?;
        Ok(())
    }
}
