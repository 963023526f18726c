//! Version lifecycle commands: install, activate, skip-waiting

use std::time::Duration;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tabled::Tabled;

use crate::cli::{CommandContext, GlobalOptions, OutputFormat};
use crate::error::Result;
use crate::lifecycle::{ActivateReport, InstallReport};
use crate::output::{self, Formattable, format_size, json::format_json, table::format_table};

#[derive(Debug, Serialize)]
pub struct InstallSummary {
    pub version: String,
    pub namespace: String,
    pub prefetched: usize,
    pub bytes: usize,
}

impl From<InstallReport> for InstallSummary {
    fn from(report: InstallReport) -> Self {
        Self {
            version: report.version,
            namespace: report.namespace.to_string(),
            prefetched: report.prefetched,
            bytes: report.bytes,
        }
    }
}

impl Formattable for InstallSummary {
    fn format(&self, format: OutputFormat) -> Result<String> {
        Ok(match format {
            OutputFormat::Json => format_json(self)?,
            OutputFormat::Table => format_table(&[NamespaceRow {
                namespace: self.namespace.clone(),
                entries: self.prefetched,
                size: format_size(self.bytes),
            }]),
            OutputFormat::Pretty => format!(
                "{} Installed version {} ({} assets, {}) into {}\n  → Run 'edgecache activate' to serve it",
                "✓".green(),
                self.version.bold(),
                self.prefetched,
                format_size(self.bytes),
                self.namespace.cyan()
            ),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct DeletedNamespace {
    pub namespace: String,
    pub entries: usize,
}

#[derive(Debug, Serialize)]
pub struct ActivateSummary {
    pub version: String,
    pub previous: Option<String>,
    pub deleted: Vec<DeletedNamespace>,
}

impl From<ActivateReport> for ActivateSummary {
    fn from(report: ActivateReport) -> Self {
        Self {
            version: report.version,
            previous: report.previous,
            deleted: report
                .deleted
                .into_iter()
                .map(|(ns, entries)| DeletedNamespace {
                    namespace: ns.to_string(),
                    entries,
                })
                .collect(),
        }
    }
}

#[derive(Tabled)]
struct NamespaceRow {
    #[tabled(rename = "NAMESPACE")]
    namespace: String,
    #[tabled(rename = "ENTRIES")]
    entries: usize,
    #[tabled(rename = "SIZE")]
    size: String,
}

#[derive(Tabled)]
struct DeletedRow {
    #[tabled(rename = "DELETED")]
    namespace: String,
    #[tabled(rename = "ENTRIES")]
    entries: usize,
}

impl Formattable for ActivateSummary {
    fn format(&self, format: OutputFormat) -> Result<String> {
        Ok(match format {
            OutputFormat::Json => format_json(self)?,
            OutputFormat::Table => {
                let rows: Vec<DeletedRow> = self
                    .deleted
                    .iter()
                    .map(|d| DeletedRow {
                        namespace: d.namespace.clone(),
                        entries: d.entries,
                    })
                    .collect();
                format_table(&rows)
            }
            OutputFormat::Pretty => {
                let mut out = match self.previous {
                    Some(ref previous) if previous != &self.version => format!(
                        "{} Activated version {} (was {})",
                        "✓".green(),
                        self.version.bold(),
                        previous
                    ),
                    _ => format!("{} Activated version {}", "✓".green(), self.version.bold()),
                };
                for d in &self.deleted {
                    out.push_str(&format!(
                        "\n  {} {} ({} entries)",
                        "−".red(),
                        d.namespace,
                        d.entries
                    ));
                }
                out
            }
        })
    }
}

fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Prefetch the configured version's static manifest
pub async fn install(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let worker = ctx.worker()?;

    let pb = (ctx.format == OutputFormat::Pretty).then(|| {
        spinner(format!(
            "Prefetching {} asset(s) for {}",
            worker.settings().manifest.len(),
            worker.version()
        ))
    });

    let result = worker.install().await;
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    output::print(&InstallSummary::from(result?), ctx.format)
}

/// Activate the configured version unconditionally
pub fn activate(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let worker = ctx.worker()?;
    let report = worker.activate()?;
    output::print(&ActivateSummary::from(report), ctx.format)
}

/// Activate the configured version only if it is installed and waiting
pub fn skip_waiting(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let worker = ctx.worker()?;
    let report = worker.skip_waiting()?;
    output::print(&ActivateSummary::from(report), ctx.format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Namespace;

    #[test]
    fn test_activate_summary_from_report() {
        let report = ActivateReport {
            version: "v2".to_string(),
            previous: Some("v1".to_string()),
            deleted: vec![(Namespace::new("static", "v1"), 5)],
        };

        let summary = ActivateSummary::from(report);

        assert_eq!(summary.deleted[0].namespace, "static-v1");
        assert_eq!(summary.deleted[0].entries, 5);
        let out = summary.format(OutputFormat::Table).unwrap();
        assert!(out.contains("static-v1"));
    }

    #[test]
    fn test_install_summary_json() {
        let summary = InstallSummary {
            version: "v1".to_string(),
            namespace: "static-v1".to_string(),
            prefetched: 3,
            bytes: 1200,
        };

        let out = summary.format(OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["data"]["prefetched"], 3);
    }
}
