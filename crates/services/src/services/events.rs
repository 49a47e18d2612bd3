//! Maps a raw webhook delivery (event-type header plus JSON payload) to a
//! typed domain event. Unrecognized deliveries are classified, logged by the
//! caller, and dropped; classification itself never fails.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    PullRequestOpened,
    /// `synchronize` on a draft pull request does not trigger analysis.
    PullRequestSynchronized {
        draft: bool,
    },
    PullRequestClosed,
    RepositoryCreated,
    RepositoryDeleted,
    PushObserved,
    Unrecognized,
}

impl WebhookEvent {
    pub fn triggers_analysis(&self) -> bool {
        matches!(
            self,
            WebhookEvent::PullRequestOpened
                | WebhookEvent::PullRequestSynchronized { draft: false }
        )
    }
}

pub fn classify(event_type: &str, payload: &Value) -> WebhookEvent {
    match event_type {
        "pull_request" => {
            let action = payload.get("action").and_then(Value::as_str);
            match action {
                Some("opened") => WebhookEvent::PullRequestOpened,
                Some("synchronize") => WebhookEvent::PullRequestSynchronized {
                    draft: payload
                        .pointer("/pull_request/draft")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                },
                Some("closed") => WebhookEvent::PullRequestClosed,
                _ => WebhookEvent::Unrecognized,
            }
        }
        "repository" => match payload.get("action").and_then(Value::as_str) {
            Some("created") => WebhookEvent::RepositoryCreated,
            Some("deleted") => WebhookEvent::RepositoryDeleted,
            _ => WebhookEvent::Unrecognized,
        },
        "push" => WebhookEvent::PushObserved,
        _ => WebhookEvent::Unrecognized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_pull_request_actions() {
        assert_eq!(
            classify("pull_request", &json!({"action": "opened"})),
            WebhookEvent::PullRequestOpened
        );
        assert_eq!(
            classify("pull_request", &json!({"action": "closed"})),
            WebhookEvent::PullRequestClosed
        );
        assert_eq!(
            classify("pull_request", &json!({"action": "labeled"})),
            WebhookEvent::Unrecognized
        );
    }

    #[test]
    fn draft_synchronize_is_distinct_from_non_draft() {
        let draft = classify(
            "pull_request",
            &json!({"action": "synchronize", "pull_request": {"draft": true}}),
        );
        let ready = classify(
            "pull_request",
            &json!({"action": "synchronize", "pull_request": {"draft": false}}),
        );
        assert_eq!(draft, WebhookEvent::PullRequestSynchronized { draft: true });
        assert_eq!(ready, WebhookEvent::PullRequestSynchronized { draft: false });
        assert!(!draft.triggers_analysis());
        assert!(ready.triggers_analysis());
    }

    #[test]
    fn missing_draft_flag_defaults_to_non_draft() {
        let event = classify("pull_request", &json!({"action": "synchronize"}));
        assert!(event.triggers_analysis());
    }

    #[test]
    fn classifies_repository_and_push_events() {
        assert_eq!(
            classify("repository", &json!({"action": "created"})),
            WebhookEvent::RepositoryCreated
        );
        assert_eq!(
            classify("repository", &json!({"action": "deleted"})),
            WebhookEvent::RepositoryDeleted
        );
        assert_eq!(classify("push", &json!({})), WebhookEvent::PushObserved);
        assert_eq!(classify("star", &json!({})), WebhookEvent::Unrecognized);
    }

    #[test]
    fn opened_triggers_analysis() {
        assert!(WebhookEvent::PullRequestOpened.triggers_analysis());
        assert!(!WebhookEvent::PullRequestClosed.triggers_analysis());
        assert!(!WebhookEvent::PushObserved.triggers_analysis());
    }
}
