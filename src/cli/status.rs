//! Status command implementation

use colored::Colorize;
use serde::Serialize;

use crate::cli::{CommandContext, GlobalOptions, OutputFormat};
use crate::config::Config;
use crate::error::Result;
use crate::lifecycle::{ACTIVE_VERSION, WAITING_VERSION};
use crate::output::json::format_json;

#[derive(Debug, Serialize)]
struct StatusReport {
    config_path: String,
    config_found: bool,
    version: String,
    origin: String,
    api_hosts: Vec<String>,
    manifest_entries: usize,
    cache_dir: String,
    active_version: Option<String>,
    waiting_version: Option<String>,
    namespaces: Vec<String>,
}

/// Run the status command to display configuration and version state
pub fn run(opts: &GlobalOptions) -> Result<()> {
    let config_path = Config::resolve_path(opts.config_ref())?;
    let ctx = CommandContext::new(opts)?;

    let report = StatusReport {
        config_path: config_path.display().to_string(),
        config_found: config_path.exists(),
        version: ctx.config.version.clone(),
        origin: ctx.config.origin.clone(),
        api_hosts: ctx.config.api_hosts.clone(),
        manifest_entries: ctx.config.static_manifest.len(),
        cache_dir: ctx.cache_dir.display().to_string(),
        active_version: ctx.store.get_meta(ACTIVE_VERSION)?,
        waiting_version: ctx.store.get_meta(WAITING_VERSION)?,
        namespaces: ctx
            .store
            .list_namespaces()?
            .into_iter()
            .map(|n| n.namespace.to_string())
            .collect(),
    };

    if ctx.format == OutputFormat::Json {
        println!("{}", format_json(&report)?);
        return Ok(());
    }

    println!("{}\n", "edgecache Status".bold());

    if report.config_found {
        println!("Config file: {}", report.config_path.cyan());
    } else {
        println!(
            "Config file: {} {}",
            report.config_path.cyan(),
            "(not found, using defaults)".dimmed()
        );
    }
    println!("Cache dir:   {}", report.cache_dir.cyan());
    println!();

    println!("Configured version: {}", report.version.bold());
    println!("Origin:             {}", report.origin);
    println!("API hosts:          {}", report.api_hosts.join(", "));
    println!("Static manifest:    {} asset(s)", report.manifest_entries);
    println!();

    match report.active_version {
        Some(ref active) if active == &report.version => {
            println!("{} Version {} is active", "✓".green(), active);
        }
        Some(ref active) => {
            println!(
                "{} Version {} is active (configured: {})",
                "⚠".yellow(),
                active,
                report.version
            );
        }
        None => {
            println!("{} No active version", "✗".red());
            println!("  → Run 'edgecache install' then 'edgecache activate'");
        }
    }

    if let Some(ref waiting) = report.waiting_version {
        println!("{} Version {} installed and waiting", "○".dimmed(), waiting);
        println!("  → Run 'edgecache skip-waiting' to activate it now");
    }

    if !report.namespaces.is_empty() {
        println!();
        println!("Namespaces: {}", report.namespaces.join(", ").dimmed());
    }
    println!();

    Ok(())
}
