//! Transient user-facing notifications.
//!
//! Panels push a [`Notification`] whenever an action fails (or a long action
//! succeeds). The shell drains and prints them; entries that are never
//! drained expire after the configured TTL.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::error::{ApiError, ErrorCategory};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// What a notification is about. Failures map one-to-one onto
/// [`ErrorCategory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Transport,
    Backend,
    Payload,
    Validation,
    Success,
}

impl From<ErrorCategory> for Category {
    fn from(c: ErrorCategory) -> Self {
        match c {
            ErrorCategory::Transport => Category::Transport,
            ErrorCategory::Backend => Category::Backend,
            ErrorCategory::Payload => Category::Payload,
            ErrorCategory::Validation => Category::Validation,
        }
    }
}

impl Category {
    fn title(self) -> &'static str {
        match self {
            Category::Transport => "Backend unreachable",
            Category::Backend => "Backend error",
            Category::Payload => "Unexpected response",
            Category::Validation => "Missing selection",
            Category::Success => "Done",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: u64,
    pub severity: Severity,
    pub category: Category,
    pub title: String,
    pub detail: String,
    pub raised_at: DateTime<Utc>,
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            Severity::Info => "info",
            Severity::Warning => "warn",
            Severity::Error => "error",
        };
        write!(f, "[{}] #{} {}: {}", tag, self.id, self.title, self.detail)
    }
}

struct Queue {
    next_id: u64,
    entries: VecDeque<Notification>,
}

/// Shared notification queue. Cheap to clone.
#[derive(Clone)]
pub struct Notifications {
    queue: Arc<Mutex<Queue>>,
    ttl: Duration,
}

impl Notifications {
    pub fn new(ttl: Duration) -> Self {
        Self {
            queue: Arc::new(Mutex::new(Queue {
                next_id: 0,
                entries: VecDeque::new(),
            })),
            ttl,
        }
    }

    /// Raise a notification for a failed action. `action` names what the
    /// user was doing, e.g. "convert IMG_VIS".
    pub fn failure(&self, action: &str, err: &ApiError) -> u64 {
        let category = Category::from(err.category());
        let severity = if category == Category::Validation {
            Severity::Warning
        } else {
            Severity::Error
        };
        self.push(severity, category, format!("{}: {}", action, err.detail()))
    }

    pub fn success(&self, detail: impl Into<String>) -> u64 {
        self.push(Severity::Info, Category::Success, detail.into())
    }

    fn push(&self, severity: Severity, category: Category, detail: String) -> u64 {
        let mut queue = self.queue.lock().unwrap();
        queue.next_id += 1;
        let notification = Notification {
            id: queue.next_id,
            severity,
            category,
            title: category.title().to_string(),
            detail,
            raised_at: Utc::now(),
        };
        match severity {
            Severity::Info => info!(target: "notify", "{}", notification),
            Severity::Warning => warn!(target: "notify", "{}", notification),
            Severity::Error => error!(target: "notify", "{}", notification),
        }
        let id = notification.id;
        queue.entries.push_back(notification);
        id
    }

    /// Notifications not yet drained or dismissed.
    pub fn pending(&self) -> Vec<Notification> {
        self.queue.lock().unwrap().entries.iter().cloned().collect()
    }

    /// Take every pending notification.
    pub fn drain(&self) -> Vec<Notification> {
        self.queue.lock().unwrap().entries.drain(..).collect()
    }

    /// Dismiss one notification. Returns whether it was still pending.
    pub fn dismiss(&self, id: u64) -> bool {
        let mut queue = self.queue.lock().unwrap();
        let before = queue.entries.len();
        queue.entries.retain(|n| n.id != id);
        queue.entries.len() != before
    }

    /// Drop notifications older than the TTL.
    pub fn prune_expired(&self, now: DateTime<Utc>) -> usize {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::weeks(52));
        let mut queue = self.queue.lock().unwrap();
        let before = queue.entries.len();
        queue.entries.retain(|n| now - n.raised_at < ttl);
        before - queue.entries.len()
    }
}
