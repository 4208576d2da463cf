// The moderation check forum routes run before saving a thread or comment.
//
// Blocked content becomes a `Rejected` outcome carrying the user-facing
// message; everything else (including any internal moderation failure) is
// `Accepted` so a post never fails to save because of the gateway.

use crate::core::moderation::{
    user_message, Classifier, ContentPayload, HealthCheck, ModerationDecision, ModerationGateway,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

pub const CONTENT_MODERATED: &str = "CONTENT_MODERATED";

/// The fields a forum route receives for a new thread or comment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Submission {
    pub title: Option<String>,
    pub content: Option<String>,
    pub author: Option<String>,
}

impl Submission {
    pub fn to_payload(&self) -> ContentPayload {
        ContentPayload::new(
            self.title.clone().unwrap_or_default(),
            self.content.clone().unwrap_or_default(),
            self.author.clone().unwrap_or_default(),
        )
    }

    /// Payload used by the moderation test endpoint.
    pub fn for_test(&self) -> ContentPayload {
        ContentPayload::new(
            self.title.clone().unwrap_or_default(),
            self.content.clone().unwrap_or_default(),
            self.author.clone().unwrap_or_else(|| "TestUser".to_string()),
        )
    }
}

/// Body returned to the client when content is blocked.
#[derive(Debug, Clone, Serialize)]
pub struct Rejection {
    pub success: bool,
    pub message: String,
    pub code: &'static str,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum GateOutcome {
    /// Persist the content. The decision can go into audit metadata.
    Accepted { decision: ModerationDecision },
    /// Do not persist; show `message` to the user.
    Rejected(Rejection),
}

impl GateOutcome {
    #[allow(dead_code)]
    pub fn is_accepted(&self) -> bool {
        matches!(self, GateOutcome::Accepted { .. })
    }

    /// JSON body for the forum response.
    pub fn response_body(&self) -> Value {
        match self {
            GateOutcome::Accepted { decision } => json!({
                "success": true,
                "moderation_result": decision,
            }),
            GateOutcome::Rejected(rejection) => json!(rejection),
        }
    }
}

/// Route-side integration point for the gateway.
pub struct ModerationGate<S, C> {
    moderator: Arc<ModerationGateway<S, C>>,
}

impl<S, C> Clone for ModerationGate<S, C> {
    fn clone(&self) -> Self {
        Self {
            moderator: Arc::clone(&self.moderator),
        }
    }
}

impl<S, C> ModerationGate<S, C>
where
    S: Classifier + HealthCheck + 'static,
    C: Classifier + 'static,
{
    pub fn new(moderator: Arc<ModerationGateway<S, C>>) -> Self {
        Self { moderator }
    }

    /// Check a submission before it is saved.
    pub async fn check(&self, submission: &Submission) -> GateOutcome {
        let decision = self.decide(submission.to_payload()).await;
        Self::outcome_for(decision)
    }

    /// Run the gateway in its own task so even a panic inside it ends in
    /// an "allow" rather than a failed request.
    pub async fn decide(&self, payload: ContentPayload) -> ModerationDecision {
        let moderator = Arc::clone(&self.moderator);
        match tokio::spawn(async move { moderator.moderate(&payload).await }).await {
            Ok(decision) => decision,
            Err(e) => {
                tracing::error!(error = %e, "Moderation error");
                ModerationDecision::allow("Moderation error")
            }
        }
    }

    fn outcome_for(decision: ModerationDecision) -> GateOutcome {
        if decision.allowed {
            if decision.is_safe_default() {
                tracing::debug!(reason = ?decision.reason, "Content allowed without classifier");
            }
            return GateOutcome::Accepted { decision };
        }

        tracing::info!(
            blocked_reason = ?decision.blocked_reason,
            confidence = ?decision.overall_confidence,
            "Content blocked by moderation"
        );

        GateOutcome::Rejected(Rejection {
            success: false,
            message: user_message(&decision),
            code: CONTENT_MODERATED,
            timestamp: Utc::now(),
        })
    }
}
