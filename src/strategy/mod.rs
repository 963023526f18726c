//! Per-class caching strategies

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::classify::RequestClass;
use crate::http::Response;

pub mod engine;

pub use engine::StrategyEngine;

/// Where the returned response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseSource {
    /// Fresh from the origin
    Network,
    /// Read from the current namespace
    Cache,
    /// Synthesized offline response
    Fallback,
    /// Not intercepted: non-GET, or no version controls the worker yet
    PassThrough,
}

/// A response together with how it was obtained
#[derive(Debug, Clone)]
pub struct Served {
    pub response: Response,
    pub source: ResponseSource,
    /// `None` for pass-through requests, which are never classified
    pub class: Option<RequestClass>,
    /// When the cached copy was stored, for cache hits
    pub stored_at: Option<DateTime<Utc>>,
}

impl Served {
    pub fn network(class: RequestClass, response: Response) -> Self {
        Self {
            response,
            source: ResponseSource::Network,
            class: Some(class),
            stored_at: None,
        }
    }

    pub fn cache(class: RequestClass, response: Response, stored_at: DateTime<Utc>) -> Self {
        Self {
            response,
            source: ResponseSource::Cache,
            class: Some(class),
            stored_at: Some(stored_at),
        }
    }

    pub fn fallback(class: RequestClass, response: Response) -> Self {
        Self {
            response,
            source: ResponseSource::Fallback,
            class: Some(class),
            stored_at: None,
        }
    }

    pub fn pass_through(response: Response) -> Self {
        Self {
            response,
            source: ResponseSource::PassThrough,
            class: None,
            stored_at: None,
        }
    }
}
