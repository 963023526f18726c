//! reqwest-backed network implementation

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;

use super::Network;
use crate::error::FetchError;
use crate::http::{Request, Response};

/// Headers that describe the connection rather than the payload; never stored
const HOP_BY_HOP: [&str; 5] = [
    "connection",
    "keep-alive",
    "transfer-encoding",
    "upgrade",
    "proxy-connection",
];

/// Network implementation over a shared reqwest client
pub struct HttpNetwork {
    http: HttpClient,
}

impl HttpNetwork {
    /// Create a client. Without a timeout a stalled origin blocks only the
    /// request waiting on it.
    pub fn new(timeout: Option<Duration>) -> Result<Self, FetchError> {
        let mut builder = HttpClient::builder()
            .user_agent(concat!("edgecache/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let http = builder
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self { http })
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let mut builder = self
            .http
            .request(request.method.clone(), request.url.clone());

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(ref body) = request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(FetchError::from)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter(|(name, _)| !HOP_BY_HOP.contains(&name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = response.bytes().await.map_err(FetchError::from)?.to_vec();

        log::debug!("{} {} -> {}", request.method, request.url, status);

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}
