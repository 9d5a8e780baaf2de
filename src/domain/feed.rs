use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::activity::Activity;
use crate::domain::notification::Notification;
use crate::domain::profile::ActorProfile;

/// Position of the last item handed out. Items strictly after it in
/// descending (created_at, id) order belong to the next page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cursor {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

impl Cursor {
    pub fn new(created_at: DateTime<Utc>, id: Uuid) -> Self {
        Self { created_at, id }
    }

    pub fn encode(&self) -> String {
        let raw = format!("{}:{}", self.created_at.timestamp_micros(), self.id);
        URL_SAFE_NO_PAD.encode(raw)
    }

    /// `None` for anything that was not produced by [`Cursor::encode`].
    pub fn decode(token: &str) -> Option<Self> {
        let bytes = URL_SAFE_NO_PAD.decode(token).ok()?;
        let raw = String::from_utf8(bytes).ok()?;
        let (micros, id) = raw.split_once(':')?;
        let created_at = DateTime::from_timestamp_micros(micros.parse().ok()?)?;
        let id = Uuid::parse_str(id).ok()?;
        Some(Self { created_at, id })
    }

    /// True when `(created_at, id)` sorts strictly after this cursor in
    /// newest-first order.
    pub fn precedes(&self, created_at: DateTime<Utc>, id: Uuid) -> bool {
        (created_at, id) < (self.created_at, self.id)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedPage<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

impl<T> FeedPage<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
        }
    }
}

/// A page of the caller's notifications with their unread total.
#[derive(Debug, Clone, Serialize)]
pub struct PersonalFeedPage {
    #[serde(flatten)]
    pub page: FeedPage<NotificationEntry>,
    pub unread_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityEntry {
    pub activity: Activity,
    pub actor: Option<ActorProfile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationEntry {
    pub notification: Notification,
    pub activity: Activity,
    pub actor: Option<ActorProfile>,
    pub message: String,
}
