//! Cache management commands

use colored::Colorize;
use tabled::Tabled;

use crate::cache::Namespace;
use crate::cli::{CommandContext, GlobalOptions, OutputFormat};
use crate::error::{Error, Result};
use crate::output::{format_size, format_timestamp, json::format_json, table::format_table};

#[derive(Tabled)]
struct NamespaceRow {
    #[tabled(rename = "NAMESPACE")]
    namespace: String,
    #[tabled(rename = "ENTRIES")]
    entries: usize,
    #[tabled(rename = "SIZE")]
    size: String,
    #[tabled(rename = "CREATED")]
    created: String,
}

#[derive(Tabled)]
struct EntryRow {
    #[tabled(rename = "NAMESPACE")]
    namespace: String,
    #[tabled(rename = "STATUS")]
    status: u16,
    #[tabled(rename = "SIZE")]
    size: String,
    #[tabled(rename = "STORED")]
    stored: String,
    #[tabled(rename = "URL")]
    url: String,
}

/// Show cache status/statistics
pub fn status(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let stats = ctx.store.stats()?;
    let namespaces = ctx.store.list_namespaces()?;
    let path = ctx.cache_dir.display().to_string();

    match ctx.format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "total_entries": stats.total_entries,
                "namespaces": namespaces
                    .iter()
                    .map(|n| serde_json::json!({
                        "name": n.namespace.name,
                        "version": n.namespace.version,
                        "entries": n.entries,
                        "size_bytes": n.size_bytes,
                    }))
                    .collect::<Vec<_>>(),
                "total_size_bytes": stats.total_size_bytes,
                "total_size_human": format_size(stats.total_size_bytes),
                "oldest_entry": stats.oldest_entry,
                "newest_entry": stats.newest_entry,
                "path": path,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Table => {
            let rows: Vec<NamespaceRow> = namespaces
                .into_iter()
                .map(|n| NamespaceRow {
                    namespace: n.namespace.to_string(),
                    entries: n.entries,
                    size: format_size(n.size_bytes),
                    created: format_timestamp(n.created_at),
                })
                .collect();
            println!("{}", format_table(&rows));
        }
        OutputFormat::Pretty => {
            println!("{}", "Cache Status".bold());
            println!("────────────────────────────────────────");
            println!("Location:       {}", path);
            println!("Namespaces:     {}", stats.namespaces);
            println!("Entries:        {}", stats.total_entries);
            println!("Total size:     {}", format_size(stats.total_size_bytes));

            if let Some(oldest) = stats.oldest_entry {
                println!("Oldest entry:   {}", format_timestamp(oldest));
            }
            if let Some(newest) = stats.newest_entry {
                println!("Newest entry:   {}", format_timestamp(newest));
            }

            for n in namespaces {
                println!(
                    "  {} {} entries, {}",
                    n.namespace.to_string().cyan(),
                    n.entries,
                    format_size(n.size_bytes)
                );
            }
        }
    }

    Ok(())
}

/// Clear all cache entries and namespaces
pub fn clear(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let stats = ctx.store.clear_all()?;

    match ctx.format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "entries_removed": stats.entries_removed,
                "success": true,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        _ => {
            if stats.entries_removed > 0 {
                println!("Cleared {} cache entries", stats.entries_removed);
            } else {
                println!("Cache was already empty");
            }
        }
    }

    Ok(())
}

/// Show cache path
pub fn path(opts: &GlobalOptions) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    println!("{}", ctx.cache_dir.display());
    Ok(())
}

/// Parse `name-version`; the version may itself contain dashes
pub fn parse_namespace(label: &str) -> Result<Namespace> {
    match label.split_once('-') {
        Some((name, version)) if !name.is_empty() && !version.is_empty() => {
            Ok(Namespace::new(name, version))
        }
        _ => Err(Error::InvalidRequest(format!(
            "Invalid namespace '{}'. Expected <name>-<version>, e.g. static-v1",
            label
        ))),
    }
}

/// List stored entries, optionally for one namespace
pub fn list(opts: &GlobalOptions, namespace: Option<&str>) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let ns = namespace.map(parse_namespace).transpose()?;
    let entries = ctx.store.list_entries(ns.as_ref())?;

    match ctx.format {
        OutputFormat::Json => {
            let items: Vec<_> = entries
                .iter()
                .map(|e| {
                    serde_json::json!({
                        "namespace": e.namespace.to_string(),
                        "url": e.url,
                        "status": e.status,
                        "size_bytes": e.size_bytes,
                        "stored_at": e.stored_at,
                    })
                })
                .collect();
            println!("{}", format_json(&items)?);
        }
        _ => {
            let rows: Vec<EntryRow> = entries
                .into_iter()
                .map(|e| EntryRow {
                    namespace: e.namespace.to_string(),
                    status: e.status,
                    size: format_size(e.size_bytes),
                    stored: format_timestamp(e.stored_at),
                    url: e.url,
                })
                .collect();
            println!("{}", format_table(&rows));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_namespace() {
        assert_eq!(parse_namespace("static-v1").unwrap(), Namespace::new("static", "v1"));
        assert_eq!(
            parse_namespace("api-2024-06-01").unwrap(),
            Namespace::new("api", "2024-06-01")
        );
        assert!(parse_namespace("static").is_err());
        assert!(parse_namespace("-v1").is_err());
    }
}
