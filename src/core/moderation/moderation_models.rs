// Moderation domain models - data structures for the classifier gateway.
//
// These are pure domain types with no HTTP or process dependencies.
// The infra layer parses classifier output into them; the forum layer
// turns them into accept/reject outcomes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Reason attached when moderation is switched off.
pub const REASON_DISABLED: &str = "Moderation disabled";
/// Reason attached when the classifier could not be consulted at all.
pub const REASON_UNAVAILABLE: &str = "Moderation service unavailable";
/// Reason attached when the classifier answered with something unreadable.
pub const REASON_PARSING_ERROR: &str = "Moderation parsing error";

/// The text fields sent to the classifier for one moderation request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentPayload {
    pub title: String,
    /// Body of the thread or comment.
    pub content: String,
    pub author: String,
}

impl ContentPayload {
    pub fn new(
        title: impl Into<String>,
        content: impl Into<String>,
        author: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            author: author.into(),
        }
    }
}

/// Verdict for a single piece of content.
///
/// Field names follow the classifier's wire format (`blocked_reason`,
/// `overall_confidence`), so a decision read from the classifier can be
/// handed back to callers verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationDecision {
    /// The actionable verdict.
    pub allowed: bool,

    /// Short machine-oriented explanation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Detail for logs; only meaningful when `allowed == false`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<String>,

    /// Classifier confidence in [0, 1]. Only used to pick a message tone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_confidence: Option<f64>,

    /// Raw classifier sub-scores, never interpreted here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predictions: Option<Value>,

    /// Anything else the classifier sent (e.g. `error`), kept for diagnostics.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Why a classifier document was rejected at the transport boundary.
#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("Malformed decision JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("overall_confidence out of range: {0}")]
    ConfidenceOutOfRange(f64),
}

impl ModerationDecision {
    /// Allow with a diagnostic reason. Used for every safe-default path.
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: Some(reason.into()),
            blocked_reason: None,
            overall_confidence: None,
            predictions: None,
            extra: Map::new(),
        }
    }

    pub fn disabled() -> Self {
        Self::allow(REASON_DISABLED)
    }

    pub fn unavailable() -> Self {
        Self::allow(REASON_UNAVAILABLE)
    }

    pub fn parsing_error() -> Self {
        Self::allow(REASON_PARSING_ERROR)
    }

    /// Parse and validate one classifier document.
    ///
    /// Surrounding whitespace is ignored (the CLI classifier prints a
    /// trailing newline); anything else that is not exactly one JSON object
    /// with a boolean `allowed` is an error.
    pub fn from_classifier_output(raw: &str) -> Result<Self, DecisionError> {
        let decision: Self = serde_json::from_str(raw.trim())?;
        decision.validate()?;
        Ok(decision)
    }

    fn validate(&self) -> Result<(), DecisionError> {
        match self.overall_confidence {
            Some(c) if !c.is_finite() || !(0.0..=1.0).contains(&c) => {
                Err(DecisionError::ConfidenceOutOfRange(c))
            }
            _ => Ok(()),
        }
    }

    /// Whether this decision came from a safe-default path rather than
    /// from the classifier itself.
    pub fn is_safe_default(&self) -> bool {
        self.allowed
            && matches!(
                self.reason.as_deref(),
                Some(REASON_UNAVAILABLE) | Some(REASON_PARSING_ERROR)
            )
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_wire_shape() {
        let payload = ContentPayload::new("x", "y", "z");
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"title": "x", "content": "y", "author": "z"})
        );
    }

    #[test]
    fn test_parses_full_classifier_document() {
        let raw = r#"{
            "allowed": false,
            "blocked_reason": "hate_speech",
            "overall_confidence": 0.95,
            "predictions": {"content": {"label": "HATE", "confidence": 0.95}}
        }"#;

        let decision = ModerationDecision::from_classifier_output(raw).unwrap();

        assert!(!decision.allowed);
        assert_eq!(decision.blocked_reason.as_deref(), Some("hate_speech"));
        assert_eq!(decision.overall_confidence, Some(0.95));
        assert!(decision.predictions.is_some());
        assert!(decision.reason.is_none());
    }

    #[test]
    fn test_minimal_document_passes_through() {
        let decision = ModerationDecision::from_classifier_output("{\"allowed\":true}\n").unwrap();

        assert!(decision.allowed);
        assert!(decision.reason.is_none());
        assert!(!decision.is_safe_default());
    }

    #[test]
    fn test_unknown_fields_are_kept() {
        let raw = r#"{"allowed": true, "reason": "Moderation service error", "error": "boom"}"#;
        let decision = ModerationDecision::from_classifier_output(raw).unwrap();

        assert_eq!(decision.extra.get("error"), Some(&Value::from("boom")));
        let back = serde_json::to_value(&decision).unwrap();
        assert_eq!(back["error"], "boom");
    }

    #[test]
    fn test_rejects_invalid_documents() {
        assert!(ModerationDecision::from_classifier_output("").is_err());
        assert!(ModerationDecision::from_classifier_output("not json").is_err());
        assert!(ModerationDecision::from_classifier_output(r#"{"reason":"x"}"#).is_err());
        assert!(ModerationDecision::from_classifier_output(r#"{"allowed":"yes"}"#).is_err());
        assert!(matches!(
            ModerationDecision::from_classifier_output(
                r#"{"allowed":false,"overall_confidence":1.5}"#
            ),
            Err(DecisionError::ConfidenceOutOfRange(_))
        ));
    }

    #[test]
    fn test_safe_defaults_are_marked() {
        assert!(ModerationDecision::unavailable().is_safe_default());
        assert!(ModerationDecision::parsing_error().is_safe_default());
        assert!(!ModerationDecision::disabled().is_safe_default());
    }
}
