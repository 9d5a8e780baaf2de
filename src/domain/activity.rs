use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type Metadata = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    SpotCreated,
    RatingGiven,
    CommentPosted,
    FavoriteAdded,
    SpotCheckedIn,
    SessionCreated,
    RsvpCreated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Spot,
    Rating,
    Comment,
    Favorite,
    CheckIn,
    Session,
    Rsvp,
}

impl ActivityType {
    pub const ALL: [ActivityType; 7] = [
        ActivityType::SpotCreated,
        ActivityType::RatingGiven,
        ActivityType::CommentPosted,
        ActivityType::FavoriteAdded,
        ActivityType::SpotCheckedIn,
        ActivityType::SessionCreated,
        ActivityType::RsvpCreated,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityType::SpotCreated => "spot_created",
            ActivityType::RatingGiven => "rating_given",
            ActivityType::CommentPosted => "comment_posted",
            ActivityType::FavoriteAdded => "favorite_added",
            ActivityType::SpotCheckedIn => "spot_checked_in",
            ActivityType::SessionCreated => "session_created",
            ActivityType::RsvpCreated => "rsvp_created",
        }
    }

    /// Target types an activity of this type may point at.
    pub fn allowed_targets(self) -> &'static [TargetType] {
        match self {
            ActivityType::SpotCreated => &[TargetType::Spot],
            ActivityType::RatingGiven => &[TargetType::Rating],
            ActivityType::CommentPosted => &[TargetType::Comment],
            ActivityType::FavoriteAdded => &[TargetType::Favorite, TargetType::Spot],
            ActivityType::SpotCheckedIn => &[TargetType::CheckIn],
            ActivityType::SessionCreated => &[TargetType::Session],
            ActivityType::RsvpCreated => &[TargetType::Rsvp],
        }
    }

    pub fn allows(self, target_type: TargetType) -> bool {
        self.allowed_targets().contains(&target_type)
    }

    /// Whether the target has an owner besides the actor (spot owner, session organizer).
    pub fn has_owner(self) -> bool {
        !matches!(self, ActivityType::SpotCreated | ActivityType::SessionCreated)
    }
}

impl TargetType {
    pub const ALL: [TargetType; 7] = [
        TargetType::Spot,
        TargetType::Rating,
        TargetType::Comment,
        TargetType::Favorite,
        TargetType::CheckIn,
        TargetType::Session,
        TargetType::Rsvp,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TargetType::Spot => "spot",
            TargetType::Rating => "rating",
            TargetType::Comment => "comment",
            TargetType::Favorite => "favorite",
            TargetType::CheckIn => "check_in",
            TargetType::Session => "session",
            TargetType::Rsvp => "rsvp",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl FromStr for ActivityType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActivityType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "activity type",
                value: s.to_string(),
            })
    }
}

impl FromStr for TargetType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TargetType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "target type",
                value: s.to_string(),
            })
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of one user action. Never updated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub activity_type: ActivityType,
    pub target_type: TargetType,
    pub target_id: Uuid,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl Activity {
    pub fn new(
        actor_id: Uuid,
        activity_type: ActivityType,
        target_type: TargetType,
        target_id: Uuid,
        metadata: Metadata,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor_id,
            activity_type,
            target_type,
            target_id,
            metadata,
            // postgres keeps microseconds; truncate so cursors round-trip
            created_at: Utc::now().trunc_subsecs(6),
        }
    }
}
