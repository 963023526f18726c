//! Push, notification-click and background sync commands

use colored::Colorize;
use serde::Serialize;

use crate::cli::{CommandContext, GlobalOptions, OutputFormat};
use crate::clients::ClientId;
use crate::error::{Error, Result};
use crate::output::{self, Formattable, json::format_json, table::format_table};
use crate::worker::{Event, EventOutcome, Notification, NotificationAction};

/// What an event produced, flattened for display
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum EventReport {
    Notification(Notification),
    Navigated { client: ClientId, url: String },
    Dismissed,
    Broadcast { tag: String, recipients: usize },
    Ignored { tag: String },
}

#[derive(tabled::Tabled)]
struct EventRow {
    #[tabled(rename = "OUTCOME")]
    outcome: String,
    #[tabled(rename = "DETAIL")]
    detail: String,
}

impl EventReport {
    fn row(&self) -> EventRow {
        let (outcome, detail) = match self {
            EventReport::Notification(n) => ("notification", format!("{}: {}", n.title, n.body)),
            EventReport::Navigated { client, url } => {
                ("navigated", format!("client {} → {}", client, url))
            }
            EventReport::Dismissed => ("dismissed", String::new()),
            EventReport::Broadcast { tag, recipients } => {
                ("broadcast", format!("{} to {} client(s)", tag, recipients))
            }
            EventReport::Ignored { tag } => ("ignored", tag.clone()),
        };
        EventRow {
            outcome: outcome.to_string(),
            detail,
        }
    }

    fn pretty(&self) -> String {
        match self {
            EventReport::Notification(n) => {
                let actions: Vec<&str> = n.actions.iter().map(|a| a.title()).collect();
                format!(
                    "{} {}\n  {}\n  Actions: {}",
                    "🔔".yellow(),
                    n.title.bold(),
                    n.body,
                    actions.join(" | ").cyan()
                )
            }
            EventReport::Navigated { client, url } => {
                format!("{} Client {} navigated to {}", "✓".green(), client, url.cyan())
            }
            EventReport::Dismissed => format!("{} Notification dismissed", "○".dimmed()),
            EventReport::Broadcast { tag, recipients } => format!(
                "{} Sync '{}' broadcast to {} open client(s)",
                "✓".green(),
                tag,
                recipients
            ),
            EventReport::Ignored { tag } => format!(
                "{} Sync tag '{}' is not handled",
                "○".dimmed(),
                tag
            ),
        }
    }
}

impl Formattable for EventReport {
    fn format(&self, format: OutputFormat) -> Result<String> {
        Ok(match format {
            OutputFormat::Json => format_json(self)?,
            OutputFormat::Table => format_table(&[self.row()]),
            OutputFormat::Pretty => self.pretty(),
        })
    }
}

impl EventReport {
    fn from_outcome(outcome: EventOutcome, tag: Option<String>) -> Result<Self> {
        match outcome {
            EventOutcome::Notification(n) => Ok(EventReport::Notification(n)),
            EventOutcome::Navigated { client, url } => Ok(EventReport::Navigated { client, url }),
            EventOutcome::Dismissed => Ok(EventReport::Dismissed),
            EventOutcome::Broadcast { tag, recipients } => {
                Ok(EventReport::Broadcast { tag, recipients })
            }
            EventOutcome::Ignored => Ok(EventReport::Ignored {
                tag: tag.unwrap_or_default(),
            }),
            other => Err(Error::InvalidRequest(format!(
                "Unexpected event outcome: {:?}",
                other
            ))),
        }
    }
}

async fn dispatch(ctx: &CommandContext, event: Event, tag: Option<String>) -> Result<()> {
    let worker = ctx.worker()?;
    worker.resume()?;

    let outcome = worker.handle_event(event).await?;
    output::print(&EventReport::from_outcome(outcome, tag)?, ctx.format)
}

/// Fire a background sync tag (defaults to the configured one)
pub async fn sync(opts: &GlobalOptions, tag: Option<String>) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    let tag = tag.unwrap_or_else(|| ctx.config.preferences.sync_tag.clone());
    dispatch(&ctx, Event::Sync(tag.clone()), Some(tag)).await
}

/// Deliver a push message
pub async fn push(opts: &GlobalOptions, payload: Option<String>) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    dispatch(&ctx, Event::Push(payload), None).await
}

/// Act on a shown notification
pub async fn notification_click(opts: &GlobalOptions, action: NotificationAction) -> Result<()> {
    let ctx = CommandContext::new(opts)?;
    dispatch(&ctx, Event::NotificationClick(action), None).await
}
