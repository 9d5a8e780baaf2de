use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::activity::Activity;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ActorProfile {
    pub id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub profile_photo_url: Option<String>,
}

impl ActorProfile {
    /// Display name when set and non-blank, username otherwise.
    pub fn label(&self) -> &str {
        match self.display_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.username,
        }
    }
}

/// Denormalized view of the entity an activity points at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSnapshot {
    pub display_name: Option<String>,
    pub counts: BTreeMap<String, i64>,
}

const TARGET_NAME_KEYS: [&str; 3] = ["spot_name", "title", "session_title"];
const COUNT_SUFFIX: &str = "_count";

impl TargetSnapshot {
    pub fn named(display_name: impl Into<String>) -> Self {
        Self {
            display_name: Some(display_name.into()),
            counts: BTreeMap::new(),
        }
    }

    pub fn with_count(mut self, key: impl Into<String>, value: i64) -> Self {
        self.counts.insert(key.into(), value);
        self
    }

    /// Builds a snapshot from what domain services put in the metadata
    /// payload: the target's name and any integer `*_count` entries.
    pub fn from_activity(activity: &Activity) -> Self {
        let display_name = TARGET_NAME_KEYS
            .iter()
            .filter_map(|key| activity.metadata.get(*key))
            .filter_map(|value| value.as_str())
            .find(|name| !name.trim().is_empty())
            .map(str::to_string);

        let counts = activity
            .metadata
            .iter()
            .filter(|(key, _)| key.ends_with(COUNT_SUFFIX))
            .filter_map(|(key, value)| value.as_i64().map(|count| (key.clone(), count)))
            .collect();

        Self {
            display_name,
            counts,
        }
    }
}
