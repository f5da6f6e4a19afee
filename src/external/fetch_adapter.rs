//! Reference [`super::Fetcher`] using `reqwest`'s blocking client.
//!
//! Spec §6 defines fetch as a synchronous GET; this crate's background
//! pipeline already runs on a dedicated OS thread per stem (spec §4.3.4),
//! so a blocking client is the natural fit, matching the retry loop the
//! original `stem-manager.cpp` drives around `emscripten_fetch`.

use super::{FetchResponse, Fetcher};
use tracing::debug;

pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, path: &str) -> Result<FetchResponse, String> {
        debug!("fetching stem payload from {}", path);
        let response = self.client.get(path).send().map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let bytes = response.bytes().map_err(|e| e.to_string())?.to_vec();
        Ok(FetchResponse { status, bytes })
    }
}
