//! Classify command: show which strategy a URL would get

use colored::Colorize;
use serde::Serialize;
use tabled::Tabled;

use crate::cache::Namespace;
use crate::classify::{RequestClass, RequestClassifier};
use crate::cli::{GlobalOptions, OutputFormat};
use crate::config::Config;
use crate::error::Result;
use crate::http::Request;
use crate::output::{self, Formattable, json::format_json, table::format_table};

#[derive(Debug, Serialize)]
pub struct Classification {
    pub url: String,
    pub class: RequestClass,
    pub strategy: &'static str,
    /// Freshness window in seconds; absent for classes that never expire
    pub ttl_secs: Option<u64>,
    pub namespace: String,
}

#[derive(Tabled)]
struct ClassificationRow {
    #[tabled(rename = "URL")]
    url: String,
    #[tabled(rename = "CLASS")]
    class: String,
    #[tabled(rename = "STRATEGY")]
    strategy: String,
    #[tabled(rename = "TTL")]
    ttl: String,
    #[tabled(rename = "NAMESPACE")]
    namespace: String,
}

pub fn strategy_name(class: RequestClass) -> &'static str {
    match class {
        RequestClass::Api => "network-first",
        RequestClass::Static => "cache-first, refresh in background",
        RequestClass::Dynamic => "network-first, any age offline",
    }
}

impl Classification {
    pub fn new(config: &Config, request: &Request) -> Result<Self> {
        let manifest = config.manifest_urls()?;
        let classifier =
            RequestClassifier::new(config.api_hosts.iter().map(String::as_str), &manifest);
        let class = classifier.classify(request);

        Ok(Self {
            url: request.url.to_string(),
            class,
            strategy: strategy_name(class),
            ttl_secs: class.ttl().map(|ttl| ttl.as_secs()),
            namespace: Namespace::new(class.namespace(), config.version.as_str()).to_string(),
        })
    }

    fn ttl_label(&self) -> String {
        match self.ttl_secs {
            Some(secs) if secs >= 3600 => format!("{}h", secs / 3600),
            Some(secs) => format!("{}m", secs / 60),
            None => "none".to_string(),
        }
    }
}

impl Formattable for Classification {
    fn format(&self, format: OutputFormat) -> Result<String> {
        Ok(match format {
            OutputFormat::Json => format_json(self)?,
            OutputFormat::Table => format_table(&[ClassificationRow {
                url: self.url.clone(),
                class: self.class.to_string(),
                strategy: self.strategy.to_string(),
                ttl: self.ttl_label(),
                namespace: self.namespace.clone(),
            }]),
            OutputFormat::Pretty => format!(
                "{}\n  Class:     {}\n  Strategy:  {}\n  TTL:       {}\n  Namespace: {}",
                self.url.bold(),
                self.class.to_string().cyan(),
                self.strategy,
                self.ttl_label(),
                self.namespace.dimmed()
            ),
        })
    }
}

/// Classify a URL against the configured host allow-list and manifest
pub fn run(opts: &GlobalOptions, url: &str) -> Result<()> {
    let config = Config::load_at(opts.config_ref())?;
    let request = Request::get(url)?;
    output::print(&Classification::new(&config, &request)?, opts.format)
}
