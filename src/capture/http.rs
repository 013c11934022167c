//! Network byte streams for `http(s)` locators.

use std::io::Read;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use once_cell::sync::OnceCell;
use tracing::debug;

/// Default bound on connecting and on each wait for response bytes.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(15);

/// Opens a locator as a readable byte stream.
pub trait ByteStreamOpener: Send + Sync {
    fn open(&self, locator: &str) -> Result<Box<dyn Read + Send>>;
}

/// Blocking HTTP GET whose response body is streamed to the decoder.
///
/// The blocking client runs its own runtime, so it is created on the first
/// `open` (the worker thread) rather than where the opener is built. An opener
/// that never connected can be created and dropped inside an async context.
#[derive(Debug)]
pub struct HttpStreamOpener {
    connect_timeout: Duration,
    read_timeout: Duration,
    client: OnceCell<reqwest::blocking::Client>,
}

impl Default for HttpStreamOpener {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpStreamOpener {
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            client: OnceCell::new(),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Bounds the wait for the response headers and every single body read.
    /// A live stream runs for as long as bytes keep arriving; a stalled one
    /// fails its next read and unblocks the decoder's feeder.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    fn client(&self) -> Result<&reqwest::blocking::Client> {
        self.client.get_or_try_init(|| {
            reqwest::blocking::Client::builder()
                .connect_timeout(self.connect_timeout)
                .timeout(self.read_timeout)
                .build()
                .context("Failed to build HTTP client")
        })
    }
}

impl ByteStreamOpener for HttpStreamOpener {
    fn open(&self, locator: &str) -> Result<Box<dyn Read + Send>> {
        let response = self
            .client()?
            .get(locator)
            .send()
            .with_context(|| format!("Failed to connect to {locator}"))?;
        let status = response.status();
        if !status.is_success() {
            bail!("{locator} answered with HTTP {status}");
        }
        debug!(
            locator,
            content_type = ?response.headers().get(reqwest::header::CONTENT_TYPE),
            "HTTP stream opened"
        );
        Ok(Box::new(response))
    }
}
