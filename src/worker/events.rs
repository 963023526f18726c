//! The closed set of lifecycle and request hooks the worker answers to

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::clients::ClientId;
use crate::http::Request;
use crate::lifecycle::{ActivateReport, InstallReport};
use crate::strategy::Served;

/// Every event the worker handles.
#[derive(Debug)]
pub enum Event {
    /// Prefetch the static manifest for this worker's version
    Install,
    /// Garbage-collect other versions and take control of clients
    Activate,
    /// An intercepted request
    Fetch(Request),
    /// A directive on the control channel
    Message(ControlMessage),
    /// A push with an optional text payload
    Push(Option<String>),
    /// The user picked an action on a shown notification
    NotificationClick(NotificationAction),
    /// The host's connectivity-recovery mechanism fired a sync tag
    Sync(String),
}

/// Directives accepted on the control channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// Activate a waiting version now instead of waiting for old clients to close
    SkipWaiting,
}

/// Result of handling an [`Event`]
#[derive(Debug)]
pub enum EventOutcome {
    Installed(InstallReport),
    Activated(ActivateReport),
    Served(Served),
    Notification(Notification),
    Navigated { client: ClientId, url: String },
    Dismissed,
    Broadcast { tag: String, recipients: usize },
    /// The event did not apply (e.g. an unrelated sync tag)
    Ignored,
}

/// Where this worker's version stands after registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum Registration {
    /// This version controls clients
    Active { version: String },
    /// This version is installed; `active` keeps control until old clients close
    Waiting { version: String, active: String },
}

/// A notification surfaced to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub actions: Vec<NotificationAction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationAction {
    View,
    Dismiss,
}

impl NotificationAction {
    pub fn title(&self) -> &'static str {
        match self {
            NotificationAction::View => "View",
            NotificationAction::Dismiss => "Dismiss",
        }
    }
}

impl fmt::Display for NotificationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationAction::View => f.write_str("view"),
            NotificationAction::Dismiss => f.write_str("dismiss"),
        }
    }
}

impl FromStr for NotificationAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "view" => Ok(NotificationAction::View),
            "dismiss" => Ok(NotificationAction::Dismiss),
            other => Err(format!(
                "Unknown notification action '{}'. Expected: view, dismiss",
                other
            )),
        }
    }
}
