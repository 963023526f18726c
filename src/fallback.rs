//! Offline responses for requests neither the network nor the cache can satisfy

use crate::classify::RequestClass;
use crate::http::{Request, Response};

/// Status used for every synthesized response
pub const OFFLINE_STATUS: u16 = 503;

/// Header present on every synthesized response
pub const OFFLINE_HEADER: &str = "x-edgecache-offline";

/// Builds the terminal response once network and cache are exhausted.
#[derive(Debug, Clone)]
pub struct OfflineFallback {
    title: String,
}

impl Default for OfflineFallback {
    fn default() -> Self {
        Self::new("You are offline")
    }
}

impl OfflineFallback {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }

    pub fn respond(&self, request: &Request, class: RequestClass) -> Response {
        let response = Response::new(OFFLINE_STATUS).with_header(OFFLINE_HEADER, "1");

        if class == RequestClass::Api {
            let payload = serde_json::json!({
                "error": "offline",
                "offline": true,
                "message": "Network unavailable and no cached data for this request",
                "url": request.url.as_str(),
            });
            return response
                .with_header("content-type", "application/json")
                .with_body(payload.to_string());
        }

        if request.accepts_html() {
            return response
                .with_header("content-type", "text/html; charset=utf-8")
                .with_body(self.document());
        }

        response
    }

    /// Minimal self-contained page: inline styles, no external assets
    fn document(&self) -> String {
        let title = escape_html(&self.title);
        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<style>
body {{ font-family: system-ui, sans-serif; display: flex; align-items: center;
       justify-content: center; min-height: 100vh; margin: 0; background: #f4f6f8; color: #222; }}
main {{ text-align: center; padding: 2rem; }}
button {{ margin-top: 1rem; padding: 0.5rem 1.5rem; }}
</style>
</head>
<body>
<main>
<h1>{title}</h1>
<p>This page is not available without a connection. Cached data will be shown once you reconnect.</p>
<button onclick="location.reload()">Retry</button>
</main>
</body>
</html>
"#
        )
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
