//! Fetch command: send one request through the worker

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use colored::Colorize;
use reqwest::Method;
use serde::Serialize;
use tabled::Tabled;
use url::Url;

use crate::classify::RequestClass;
use crate::cli::{CommandContext, GlobalOptions, OutputFormat};
use crate::error::{Error, Result};
use crate::http::Request;
use crate::output::{
    self, Formattable, format_size, format_timestamp, json::format_json, table::format_table,
};
use crate::strategy::{ResponseSource, Served};

/// Served response as shown to the user
#[derive(Debug, Serialize)]
pub struct FetchResult {
    pub method: String,
    pub url: String,
    pub status: u16,
    pub source: ResponseSource,
    pub class: Option<RequestClass>,
    pub stored_at: Option<DateTime<Utc>>,
    pub headers: Vec<(String, String)>,
    /// `utf8` or `base64`
    pub body_encoding: &'static str,
    pub body: String,
    pub size_bytes: usize,
}

#[derive(Tabled)]
struct FetchRow {
    #[tabled(rename = "STATUS")]
    status: u16,
    #[tabled(rename = "SOURCE")]
    source: String,
    #[tabled(rename = "CLASS")]
    class: String,
    #[tabled(rename = "SIZE")]
    size: String,
    #[tabled(rename = "URL")]
    url: String,
}

impl FetchResult {
    pub fn new(request: &Request, served: Served) -> Self {
        let size_bytes = served.response.body.len();
        let (body_encoding, body) = match String::from_utf8(served.response.body) {
            Ok(text) => ("utf8", text),
            Err(e) => ("base64", BASE64.encode(e.into_bytes())),
        };

        Self {
            method: request.method.to_string(),
            url: request.url.to_string(),
            status: served.response.status,
            source: served.source,
            class: served.class,
            stored_at: served.stored_at,
            headers: served.response.headers,
            body_encoding,
            body,
            size_bytes,
        }
    }

    fn source_label(&self) -> &'static str {
        match self.source {
            ResponseSource::Network => "network",
            ResponseSource::Cache => "cache",
            ResponseSource::Fallback => "offline fallback",
            ResponseSource::PassThrough => "pass-through",
        }
    }

    fn pretty(&self) -> String {
        let status = if (200..300).contains(&self.status) {
            self.status.to_string().green()
        } else {
            self.status.to_string().red()
        };

        let mut summary = format!("{} {} {}", status, self.method, self.url.bold());
        summary.push_str(&format!("\n  Source: {}", self.source_label().cyan()));
        if let Some(class) = self.class {
            summary.push_str(&format!(" ({})", class));
        }
        if let Some(at) = self.stored_at {
            summary.push_str(&format!("\n  Stored: {}", format_timestamp(at)));
        }
        summary.push_str(&format!("\n  Size:   {}", format_size(self.size_bytes)));

        if self.body_encoding == "utf8" {
            if !self.body.is_empty() {
                summary.push_str("\n\n");
                summary.push_str(&self.body);
            }
        } else {
            summary.push_str(&format!(
                "\n\n{}",
                format!("<{} bytes of binary data>", self.size_bytes).dimmed()
            ));
        }
        summary
    }
}

impl Formattable for FetchResult {
    fn format(&self, format: OutputFormat) -> Result<String> {
        Ok(match format {
            OutputFormat::Json => format_json(self)?,
            OutputFormat::Table => format_table(&[FetchRow {
                status: self.status,
                source: self.source_label().to_string(),
                class: self
                    .class
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                size: format_size(self.size_bytes),
                url: self.url.clone(),
            }]),
            OutputFormat::Pretty => self.pretty(),
        })
    }
}

/// Build the request from CLI arguments
pub fn build_request(
    url: &str,
    method: &str,
    accept: Option<&str>,
    data: Option<String>,
) -> Result<Request> {
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|_| Error::InvalidRequest(format!("Unknown HTTP method '{}'", method)))?;
    let url = Url::parse(url).map_err(|e| Error::InvalidRequest(format!("{}: {}", url, e)))?;

    let mut request = Request::new(method, url);
    if let Some(accept) = accept {
        request = request.with_header("accept", accept);
    }
    if let Some(data) = data {
        request = request.with_body(data);
    }
    Ok(request)
}

/// Run one request through the active version, then wait for background refreshes
pub async fn run(
    opts: &GlobalOptions,
    url: &str,
    method: &str,
    accept: Option<&str>,
    data: Option<String>,
) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let worker = ctx.worker()?;
    if worker.resume()?.is_none() {
        log::info!("No active version; requests pass through uncached");
    }

    let request = build_request(url, method, accept, data)?;
    let served = worker.fetch(&request).await?;
    worker.settle().await;

    output::print(&FetchResult::new(&request, served), ctx.format)
}
