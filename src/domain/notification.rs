use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::activity::{Activity, UnknownVariant};

/// Why a recipient got the notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationReason {
    Follower,
    Owner,
}

impl NotificationReason {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationReason::Follower => "follower",
            NotificationReason::Owner => "owner",
        }
    }
}

impl FromStr for NotificationReason {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "follower" => Ok(NotificationReason::Follower),
            "owner" => Ok(NotificationReason::Owner),
            other => Err(UnknownVariant {
                kind: "notification reason",
                value: other.to_string(),
            }),
        }
    }
}

/// Unique per (recipient_id, activity_id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub activity_id: Uuid,
    pub reason: NotificationReason,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(recipient_id: Uuid, activity: &Activity, reason: NotificationReason) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient_id,
            activity_id: activity.id,
            reason,
            is_read: false,
            read_at: None,
            created_at: Utc::now().trunc_subsecs(6),
        }
    }

    pub fn for_follower(recipient_id: Uuid, activity: &Activity) -> Self {
        Self::new(recipient_id, activity, NotificationReason::Follower)
    }

    pub fn for_owner(owner_id: Uuid, activity: &Activity) -> Self {
        Self::new(owner_id, activity, NotificationReason::Owner)
    }

    /// unread -> read; a read notification stays read.
    pub fn mark_read(&mut self, at: DateTime<Utc>) -> bool {
        if self.is_read {
            return false;
        }
        self.is_read = true;
        self.read_at = Some(at);
        true
    }
}

/// A notification joined with the activity it points at.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationWithActivity {
    pub notification: Notification,
    pub activity: Activity,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::activity::{ActivityType, Metadata, TargetType};

    fn make_activity() -> Activity {
        Activity::new(
            Uuid::new_v4(),
            ActivityType::CommentPosted,
            TargetType::Comment,
            Uuid::new_v4(),
            Metadata::new(),
        )
    }

    #[test]
    fn test_notification_creation() {
        let activity = make_activity();
        let recipient = Uuid::new_v4();
        let notification = Notification::for_follower(recipient, &activity);

        assert_eq!(notification.recipient_id, recipient);
        assert_eq!(notification.activity_id, activity.id);
        assert_eq!(notification.reason, NotificationReason::Follower);
        assert!(!notification.is_read);
        assert!(notification.read_at.is_none());
    }

    #[test]
    fn test_mark_read_is_one_directional() {
        let activity = make_activity();
        let mut notification = Notification::for_owner(Uuid::new_v4(), &activity);
        let first = Utc::now();

        assert!(notification.mark_read(first));
        assert!(!notification.mark_read(Utc::now()));
        assert!(notification.is_read);
        assert_eq!(notification.read_at, Some(first));
    }

    #[test]
    fn test_reason_parse() {
        assert_eq!("owner".parse::<NotificationReason>(), Ok(NotificationReason::Owner));
        assert!("admin".parse::<NotificationReason>().is_err());
    }
}
