//! Network access to the origin

use async_trait::async_trait;

use crate::error::FetchError;
use crate::http::{Request, Response};

pub mod client;
#[cfg(test)]
pub mod mock;

pub use client::HttpNetwork;
#[cfg(test)]
pub use mock::MockNetwork;

/// A single attempt against the origin.
///
/// Implementations return `Ok` for any completed exchange, whatever its
/// status; deciding whether a non-2xx counts as a failure is left to callers.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}

/// One attempt where a non-2xx answer counts as a failure, same as a
/// transport error.
pub async fn fetch_ok(network: &dyn Network, request: &Request) -> Result<Response, FetchError> {
    let response = network.fetch(request).await?;
    if response.is_success() {
        Ok(response)
    } else {
        Err(FetchError::Http(response.status))
    }
}
