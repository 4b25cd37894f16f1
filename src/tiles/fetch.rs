//! Network access for tiles.

use crate::error::FetchError;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, trace, warn};

/// Boxed download future returned by [`TileFetcher::fetch`]
pub type FetchFuture = Pin<Box<dyn Future<Output = Result<Vec<u8>, FetchError>> + Send>>;

/// Source of raw tile bytes.
///
/// Object safe so the cache can hold any implementation, including test
/// doubles that never touch the network.
pub trait TileFetcher: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> FetchFuture;
}

/// HTTP fetcher on reqwest.
///
/// No request timeout is set; failures come from the transport itself.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .pool_max_idle_per_host(16)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

impl TileFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> FetchFuture {
        let client = self.client.clone();
        let url = url.to_string();

        Box::pin(async move {
            trace!(url = %url, "Tile request starting");

            let response = client.get(&url).send().await.map_err(|e| {
                warn!(url = %url, error = %e, is_connect = e.is_connect(), "Tile request failed");
                FetchError::Http {
                    url: url.clone(),
                    message: e.to_string(),
                }
            })?;

            let status = response.status();
            if !status.is_success() {
                warn!(url = %url, status = status.as_u16(), "Tile server returned error status");
                return Err(FetchError::Status {
                    url,
                    status: status.as_u16(),
                });
            }

            let bytes = response.bytes().await.map_err(|e| FetchError::Http {
                url: url.clone(),
                message: e.to_string(),
            })?;
            debug!(url = %url, bytes = bytes.len(), "Tile downloaded");
            Ok(bytes.to_vec())
        })
    }
}
