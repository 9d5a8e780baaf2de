//! Rule-based notification text.
//!
//! Every activity type owns a [`CandidateList`]: conditional candidates
//! evaluated top to bottom, then a fallback template that is a required
//! constructor argument. Selection therefore always yields a template.

use std::collections::HashMap;

use serde_json::Value;

use crate::domain::activity::{Activity, ActivityType};
use crate::domain::notification::{Notification, NotificationReason};
use crate::domain::profile::{ActorProfile, TargetSnapshot};

pub const MAX_MESSAGE_CHARS: usize = 280;
const ELLIPSIS: char = '…';
const ANONYMOUS_ACTOR: &str = "Someone";

/// Field-level conditions over the augmented render context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    /// Field exists and is not null or blank.
    Present(&'static str),
    /// Field renders to exactly this text.
    Equals(&'static str, &'static str),
    Reason(NotificationReason),
    AllOf(&'static [Predicate]),
}

impl Predicate {
    fn holds(&self, ctx: &RenderContext) -> bool {
        match self {
            Predicate::Present(key) => ctx.get(key).is_some_and(|v| !v.trim().is_empty()),
            Predicate::Equals(key, expected) => ctx.get(key).is_some_and(|v| v == *expected),
            Predicate::Reason(reason) => ctx.reason == *reason,
            Predicate::AllOf(all) => all.iter().all(|p| p.holds(ctx)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub predicate: Predicate,
    pub template: &'static str,
}

const fn when(predicate: Predicate, template: &'static str) -> Candidate {
    Candidate { predicate, template }
}

#[derive(Debug, Clone)]
pub struct CandidateList {
    conditional: Vec<Candidate>,
    fallback: &'static str,
}

impl CandidateList {
    pub fn new(conditional: Vec<Candidate>, fallback: &'static str) -> Self {
        Self { conditional, fallback }
    }

    fn select(&self, ctx: &RenderContext) -> &'static str {
        self.conditional
            .iter()
            .find(|candidate| candidate.predicate.holds(ctx))
            .map(|candidate| candidate.template)
            .unwrap_or(self.fallback)
    }
}

/// Metadata plus the denormalized display fields, flattened to text.
#[derive(Debug)]
struct RenderContext {
    fields: HashMap<String, String>,
    reason: NotificationReason,
}

impl RenderContext {
    fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    fn render(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len() + 32);
        let mut rest = template;
        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            match after.find('}') {
                Some(end) => {
                    out.push_str(self.get(&after[..end]).unwrap_or_default());
                    rest = &after[end + 1..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

#[derive(Debug, Clone)]
pub struct MessageComposer {
    rules: HashMap<ActivityType, CandidateList>,
}

impl Default for MessageComposer {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageComposer {
    pub fn new() -> Self {
        let rules = ActivityType::ALL
            .into_iter()
            .map(|activity_type| (activity_type, default_candidates(activity_type)))
            .collect();
        Self { rules }
    }

    /// Replaces the candidate list for one activity type.
    pub fn with_rules(mut self, activity_type: ActivityType, candidates: CandidateList) -> Self {
        self.rules.insert(activity_type, candidates);
        self
    }

    pub fn compose(
        &self,
        notification: &Notification,
        activity: &Activity,
        actor: Option<&ActorProfile>,
        target: &TargetSnapshot,
    ) -> String {
        let ctx = augment(notification, activity, actor, target);
        let template = match self.rules.get(&activity.activity_type) {
            Some(candidates) => candidates.select(&ctx),
            None => "{actor} has new activity",
        };
        truncate(ctx.render(template))
    }
}

/// Runs once per `compose` call, before any predicate is evaluated.
fn augment(
    notification: &Notification,
    activity: &Activity,
    actor: Option<&ActorProfile>,
    target: &TargetSnapshot,
) -> RenderContext {
    let mut fields: HashMap<String, String> = activity
        .metadata
        .iter()
        .filter_map(|(key, value)| value_text(value).map(|text| (key.clone(), text)))
        .collect();

    for (key, count) in &target.counts {
        fields.insert(key.clone(), count.to_string());
    }

    let actor_name = actor.map(ActorProfile::label).unwrap_or(ANONYMOUS_ACTOR);
    fields.insert("actor".to_string(), actor_name.to_string());

    if let Some(name) = target.display_name.as_deref() {
        fields.insert("target".to_string(), name.to_string());
    }

    RenderContext {
        fields,
        reason: notification.reason,
    }
}

fn truncate(text: String) -> String {
    if text.chars().count() <= MAX_MESSAGE_CHARS {
        return text;
    }
    let mut cut: String = text.chars().take(MAX_MESSAGE_CHARS - 1).collect();
    cut.push(ELLIPSIS);
    cut
}

const OWNER: Predicate = Predicate::Reason(NotificationReason::Owner);
const TARGET: Predicate = Predicate::Present("target");

fn default_candidates(activity_type: ActivityType) -> CandidateList {
    match activity_type {
        ActivityType::SpotCreated => CandidateList::new(
            vec![
                when(
                    Predicate::AllOf(&[TARGET, Predicate::Present("city")]),
                    "{actor} added a new spot {target} in {city}",
                ),
                when(TARGET, "{actor} added a new spot {target}"),
            ],
            "{actor} added a new spot",
        ),
        ActivityType::RatingGiven => CandidateList::new(
            vec![
                when(
                    Predicate::AllOf(&[OWNER, TARGET, Predicate::Equals("score", "1")]),
                    "{actor} rated your spot {target} 1 star",
                ),
                when(
                    Predicate::AllOf(&[OWNER, TARGET, Predicate::Present("score")]),
                    "{actor} rated your spot {target} {score} stars",
                ),
                when(Predicate::AllOf(&[OWNER, TARGET]), "{actor} rated your spot {target}"),
                when(OWNER, "{actor} rated your spot"),
                when(
                    Predicate::AllOf(&[TARGET, Predicate::Equals("score", "1")]),
                    "{actor} rated {target} 1 star",
                ),
                when(
                    Predicate::AllOf(&[TARGET, Predicate::Present("score")]),
                    "{actor} rated {target} {score} stars",
                ),
                when(TARGET, "{actor} rated {target}"),
            ],
            "{actor} left a rating",
        ),
        ActivityType::CommentPosted => CandidateList::new(
            vec![
                when(
                    Predicate::AllOf(&[OWNER, TARGET]),
                    "{actor} commented on your spot {target}",
                ),
                when(OWNER, "{actor} commented on your spot"),
                when(TARGET, "{actor} commented on {target}"),
            ],
            "{actor} left a comment",
        ),
        ActivityType::FavoriteAdded => CandidateList::new(
            vec![
                when(
                    Predicate::AllOf(&[OWNER, TARGET]),
                    "{actor} favorited your spot {target}",
                ),
                when(OWNER, "{actor} favorited your spot"),
                when(TARGET, "{actor} favorited {target}"),
            ],
            "{actor} favorited a spot",
        ),
        ActivityType::SpotCheckedIn => CandidateList::new(
            vec![
                when(
                    Predicate::AllOf(&[OWNER, TARGET, Predicate::Equals("status", "heading")]),
                    "{actor} is heading to your spot {target}",
                ),
                when(Predicate::AllOf(&[OWNER, TARGET]), "{actor} is at your spot {target}"),
                when(
                    Predicate::AllOf(&[OWNER, Predicate::Equals("status", "heading")]),
                    "{actor} is heading to your spot",
                ),
                when(OWNER, "{actor} is at your spot"),
                when(
                    Predicate::AllOf(&[TARGET, Predicate::Equals("status", "heading")]),
                    "{actor} is heading to {target}",
                ),
                when(TARGET, "{actor} checked in at {target}"),
                when(Predicate::Equals("status", "heading"), "{actor} is heading to a spot"),
            ],
            "{actor} checked in at a spot",
        ),
        ActivityType::SessionCreated => CandidateList::new(
            vec![
                when(
                    Predicate::AllOf(&[TARGET, Predicate::Present("scheduled_at")]),
                    "{actor} scheduled a session {target} for {scheduled_at}",
                ),
                when(TARGET, "{actor} scheduled a session {target}"),
            ],
            "{actor} scheduled a session",
        ),
        ActivityType::RsvpCreated => CandidateList::new(
            vec![
                when(
                    Predicate::AllOf(&[OWNER, TARGET, Predicate::Present("response")]),
                    "{actor} responded {response} to your session {target}",
                ),
                when(Predicate::AllOf(&[OWNER, TARGET]), "{actor} responded to your session {target}"),
                when(
                    Predicate::AllOf(&[TARGET, Predicate::Present("response")]),
                    "{actor} responded {response} to {target}",
                ),
                when(TARGET, "{actor} responded to {target}"),
            ],
            "{actor} updated an RSVP",
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::activity::{Metadata, TargetType};
    use serde_json::json;
    use uuid::Uuid;

    fn actor(name: &str) -> ActorProfile {
        ActorProfile {
            id: Uuid::new_v4(),
            username: name.to_lowercase(),
            display_name: Some(name.to_string()),
            profile_photo_url: None,
        }
    }

    fn activity(activity_type: ActivityType, metadata: serde_json::Value) -> Activity {
        let metadata: Metadata = match metadata {
            serde_json::Value::Object(map) => map,
            _ => Metadata::new(),
        };
        let target_type = activity_type.allowed_targets()[0];
        Activity::new(Uuid::new_v4(), activity_type, target_type, Uuid::new_v4(), metadata)
    }

    fn compose_for(
        reason: NotificationReason,
        activity: &Activity,
        actor: Option<&ActorProfile>,
    ) -> String {
        let notification = Notification::new(Uuid::new_v4(), activity, reason);
        let snapshot = TargetSnapshot::from_activity(activity);
        MessageComposer::new().compose(&notification, activity, actor, &snapshot)
    }

    #[test]
    fn test_rating_with_score_renders_score_template() {
        let a = actor("A");
        let rating = activity(
            ActivityType::RatingGiven,
            json!({"spot_id": Uuid::new_v4().to_string(), "spot_name": "Pier 7", "score": 5}),
        );

        let text = compose_for(NotificationReason::Follower, &rating, Some(&a));
        assert_eq!(text, "A rated Pier 7 5 stars");
    }

    #[test]
    fn test_rating_single_star_and_owner_wording() {
        let a = actor("A");
        let rating = activity(
            ActivityType::RatingGiven,
            json!({"spot_name": "Pier 7", "score": 1}),
        );

        assert_eq!(
            compose_for(NotificationReason::Follower, &rating, Some(&a)),
            "A rated Pier 7 1 star"
        );
        assert_eq!(
            compose_for(NotificationReason::Owner, &rating, Some(&a)),
            "A rated your spot Pier 7 1 star"
        );
    }

    #[test]
    fn test_empty_metadata_falls_back_for_every_type() {
        for activity_type in ActivityType::ALL {
            let empty = activity(activity_type, json!({}));
            let text = compose_for(NotificationReason::Follower, &empty, None);
            assert!(!text.is_empty(), "{activity_type} produced empty text");
            assert!(text.starts_with("Someone "), "{activity_type}: {text}");
        }
    }

    #[test]
    fn test_first_matching_candidate_wins() {
        let a = actor("Dana");
        let checkin = activity(
            ActivityType::SpotCheckedIn,
            json!({"spot_name": "Bowl", "status": "heading"}),
        );
        assert_eq!(
            compose_for(NotificationReason::Follower, &checkin, Some(&a)),
            "Dana is heading to Bowl"
        );

        let arrived = activity(ActivityType::SpotCheckedIn, json!({"status": "arrived"}));
        assert_eq!(
            compose_for(NotificationReason::Owner, &arrived, Some(&a)),
            "Dana is at your spot"
        );
    }

    #[test]
    fn test_blank_and_null_fields_do_not_satisfy_presence() {
        let a = actor("Lee");
        let session = activity(
            ActivityType::SessionCreated,
            json!({"title": "   ", "scheduled_at": null}),
        );
        assert_eq!(
            compose_for(NotificationReason::Follower, &session, Some(&a)),
            "Lee scheduled a session"
        );
    }

    #[test]
    fn test_spot_created_with_city() {
        let a = actor("Ana");
        let spot = activity(
            ActivityType::SpotCreated,
            json!({"spot_name": "Ledges", "city": "Lisbon"}),
        );
        assert_eq!(
            compose_for(NotificationReason::Follower, &spot, Some(&a)),
            "Ana added a new spot Ledges in Lisbon"
        );
    }

    #[test]
    fn test_rsvp_owner_with_response() {
        let a = actor("Max");
        let rsvp = activity(
            ActivityType::RsvpCreated,
            json!({"session_title": "Night Skate", "response": "going"}),
        );
        assert_eq!(
            compose_for(NotificationReason::Owner, &rsvp, Some(&a)),
            "Max responded going to your session Night Skate"
        );
    }

    #[test]
    fn test_snapshot_counts_are_available_to_templates() {
        let composer = MessageComposer::new().with_rules(
            ActivityType::FavoriteAdded,
            CandidateList::new(
                vec![when(
                    Predicate::Present("favorite_count"),
                    "{actor} favorited {target} ({favorite_count} total)",
                )],
                "{actor} favorited a spot",
            ),
        );
        let fav = activity(ActivityType::FavoriteAdded, json!({}));
        let notification = Notification::for_follower(Uuid::new_v4(), &fav);
        let snapshot = TargetSnapshot::named("Plaza").with_count("favorite_count", 12);

        let text = composer.compose(&notification, &fav, Some(&actor("Kim")), &snapshot);
        assert_eq!(text, "Kim favorited Plaza (12 total)");
    }

    #[test]
    fn test_long_text_is_truncated_with_ellipsis() {
        let long_name = "x".repeat(400);
        let spot = activity(ActivityType::SpotCreated, json!({"spot_name": long_name}));
        let text = compose_for(NotificationReason::Follower, &spot, Some(&actor("Bo")));

        assert_eq!(text.chars().count(), MAX_MESSAGE_CHARS);
        assert!(text.ends_with(ELLIPSIS));
    }

    #[test]
    fn test_render_leaves_unclosed_brace() {
        let ctx = RenderContext {
            fields: HashMap::from([("actor".to_string(), "Jo".to_string())]),
            reason: NotificationReason::Follower,
        };
        assert_eq!(ctx.render("{actor} said {oops"), "Jo said {oops");
        assert_eq!(ctx.render("{missing} ok"), " ok");
    }

    #[test]
    fn test_target_type_does_not_affect_selection() {
        let a = actor("Ri");
        let mut fav = activity(ActivityType::FavoriteAdded, json!({"spot_name": "Stairs"}));
        fav.target_type = TargetType::Spot;
        assert_eq!(
            compose_for(NotificationReason::Follower, &fav, Some(&a)),
            "Ri favorited Stairs"
        );
    }
}
