//! Chat message payloads and the status-to-message mapping.
//!
//! [`compose`] is the only place that decides what a build looks like in the
//! chat channel. It is a pure function of the event and the optional
//! [`MentionRule`]; it returns `None` for statuses that are not announced.

use serde::{Deserialize, Serialize};

use crate::event::{BuildEvent, BuildStatus};
use crate::identifiers::{ChatUserId, ProjectId};

/// Display name the webhook posts under.
pub const USERNAME: &str = "Cloud Build Notifier";

/// Embed color for builds in progress.
pub const WORKING_COLOR: u32 = 1_027_128;
/// Embed color for successful builds.
pub const SUCCESS_COLOR: u32 = 1_127_128;
/// Embed color for failed, errored and timed-out builds.
pub const ERROR_COLOR: u32 = 14_177_041;

/// Title of the embed carrying the build log link.
pub const LOG_EMBED_TITLE: &str = "Log";

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// One styled block within a [`Message`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    pub title: String,
    pub color: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// The JSON document posted to the webhook.
///
/// Field order is `username`, `content`, `embeds`; `content` is omitted when
/// empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    pub embeds: Vec<Embed>,
}

// ---------------------------------------------------------------------------
// Mentions
// ---------------------------------------------------------------------------

/// Mentions a user when a build in a watched project fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MentionRule {
    /// Project whose failures trigger the mention.
    pub project_id: ProjectId,
    /// User to mention.
    pub user_id: ChatUserId,
}

impl MentionRule {
    fn content_for(&self, event: &BuildEvent) -> Option<String> {
        let project = event.project();
        (project == self.project_id.as_str()).then(|| {
            format!(
                "<@{}> Build failed for {} in {}",
                self.user_id,
                event.service_name(),
                project
            )
        })
    }
}

// ---------------------------------------------------------------------------
// Mapping
// ---------------------------------------------------------------------------

/// Builds the chat message for `event`.
///
/// Returns `None` when the status is not one the notifier announces.
pub fn compose(event: &BuildEvent, mention: Option<&MentionRule>) -> Option<Message> {
    let service = event.service_name();
    let mut content = String::new();

    let mut embeds = match &event.status {
        BuildStatus::Working => vec![primary(format!("🔨 BUILDING {service}"), WORKING_COLOR)],
        BuildStatus::Success => vec![primary(format!("✅ SUCCESS {service}"), SUCCESS_COLOR)],
        status if status.is_error() => {
            if let Some(text) = mention.and_then(|m| m.content_for(event)) {
                content = text;
            }
            vec![
                primary(format!("❌ ERROR on {service} - {status}"), ERROR_COLOR),
                Embed {
                    title: LOG_EMBED_TITLE.to_string(),
                    color: 0,
                    description: Some(event.log_url.clone()),
                },
            ]
        }
        status => {
            tracing::debug!(build_id = %event.id, %status, "Unhandled build status");
            return None;
        }
    };

    let repo = event.repo_name();
    if !repo.is_empty() {
        if let Some(first) = embeds.first_mut() {
            first.description = Some(format!(
                "Source repo: {repo}\nTrigger: {}/{}",
                event.project(),
                event.trigger_name()
            ));
        }
    }

    Some(Message {
        username: USERNAME.to_string(),
        content,
        embeds,
    })
}

fn primary(title: String, color: u32) -> Embed {
    Embed {
        title: title.trim_end().to_string(),
        color,
        description: None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn event(status: BuildStatus, subs: &[(&str, &str)]) -> BuildEvent {
        BuildEvent {
            id: "b1".to_string(),
            project_id: "my-project-id".to_string(),
            status,
            log_url: "https://x/log".to_string(),
            substitutions: subs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
            ..Default::default()
        }
    }

    fn rule(project: &str, user: &str) -> MentionRule {
        MentionRule {
            project_id: ProjectId::new(project).unwrap(),
            user_id: ChatUserId::new(user).unwrap(),
        }
    }

    #[test]
    fn success_without_service_serializes_to_bare_title() {
        let msg = compose(&event(BuildStatus::Success, &[]), None).unwrap();

        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(
            json,
            r#"{"username":"Cloud Build Notifier","embeds":[{"title":"✅ SUCCESS","color":1127128}]}"#
        );
    }

    #[test]
    fn success_ignores_mention_rule() {
        let msg = compose(
            &event(BuildStatus::Success, &[("_SERVICE_NAME", "api"), ("PROJECT_ID", "p1")]),
            Some(&rule("p1", "42")),
        )
        .unwrap();

        assert_eq!(msg.embeds.len(), 1);
        assert_eq!(msg.embeds[0].title, "✅ SUCCESS api");
        assert_eq!(msg.embeds[0].color, SUCCESS_COLOR);
        assert!(msg.content.is_empty());
    }

    #[test]
    fn working_has_single_building_embed() {
        let msg = compose(&event(BuildStatus::Working, &[("_SERVICE_NAME", "api")]), None).unwrap();

        assert_eq!(msg.embeds.len(), 1);
        assert_eq!(msg.embeds[0].title, "🔨 BUILDING api");
        assert_eq!(msg.embeds[0].color, WORKING_COLOR);
        assert!(msg.content.is_empty());
    }

    #[test]
    fn error_statuses_carry_log_embed() {
        for status in [
            BuildStatus::Failure,
            BuildStatus::InternalError,
            BuildStatus::Timeout,
        ] {
            let msg = compose(&event(status.clone(), &[("_SERVICE_NAME", "api")]), None).unwrap();

            assert_eq!(msg.embeds.len(), 2);
            assert_eq!(msg.embeds[0].title, format!("❌ ERROR on api - {status}"));
            assert_eq!(msg.embeds[0].color, ERROR_COLOR);
            assert_eq!(msg.embeds[1].title, LOG_EMBED_TITLE);
            assert_eq!(msg.embeds[1].description.as_deref(), Some("https://x/log"));
        }
    }

    #[test]
    fn failure_in_watched_project_mentions_user() {
        let msg = compose(
            &event(BuildStatus::Failure, &[("_SERVICE_NAME", "api"), ("PROJECT_ID", "p1")]),
            Some(&rule("p1", "42")),
        )
        .unwrap();

        assert_eq!(msg.content, "<@42> Build failed for api in p1");
        assert_eq!(msg.embeds.len(), 2);
    }

    #[test]
    fn failure_in_other_project_has_no_mention() {
        let msg = compose(
            &event(BuildStatus::Timeout, &[("PROJECT_ID", "p2")]),
            Some(&rule("p1", "42")),
        )
        .unwrap();

        assert!(msg.content.is_empty());
    }

    #[test]
    fn repo_substitution_overwrites_first_description() {
        let msg = compose(
            &event(
                BuildStatus::Failure,
                &[
                    ("REPO_NAME", "backend"),
                    ("PROJECT_ID", "p1"),
                    ("TRIGGER_NAME", "deploy"),
                ],
            ),
            None,
        )
        .unwrap();

        assert_eq!(
            msg.embeds[0].description.as_deref(),
            Some("Source repo: backend\nTrigger: p1/deploy")
        );
        assert_eq!(msg.embeds[1].description.as_deref(), Some("https://x/log"));
    }

    #[test]
    fn repo_description_tolerates_missing_trigger() {
        let mut ev = event(BuildStatus::Success, &[("REPO_NAME", "backend")]);
        ev.project_id = String::new();

        let msg = compose(&ev, None).unwrap();

        assert_eq!(
            msg.embeds[0].description.as_deref(),
            Some("Source repo: backend\nTrigger: /")
        );
    }

    #[test]
    fn unannounced_statuses_produce_no_message() {
        for status in [
            BuildStatus::Queued,
            BuildStatus::Cancelled,
            BuildStatus::StatusUnknown,
            BuildStatus::Other("PAUSED".to_string()),
        ] {
            assert!(compose(&event(status, &[("REPO_NAME", "backend")]), None).is_none());
        }
    }
}
