// User-facing wording for blocked content.
//
// Pure functions only - the forum layer decides where the text ends up.

use super::moderation_models::ModerationDecision;

const MAY_BE_INAPPROPRIATE: &str =
    "Your post contains content that may be inappropriate for our community.";
const REVIEW_GUIDELINES: &str =
    "Please review our community guidelines and try rephrasing your message.";
const RESPECTFUL_ENVIRONMENT: &str =
    "We're committed to maintaining a respectful environment for all users.";
const VIOLATES_STANDARDS: &str =
    "Your post contains language that violates our community standards.";

/// How direct the rejection message should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageTier {
    /// Confidence above 0.9.
    Direct,
    /// Confidence above 0.8.
    Firm,
    /// Everything else, including a missing confidence.
    Gentle,
}

/// Pick a tier from the classifier's confidence. Absent counts as 0.
pub fn message_tier(confidence: Option<f64>) -> MessageTier {
    let confidence = confidence.unwrap_or(0.0);
    if confidence > 0.9 {
        MessageTier::Direct
    } else if confidence > 0.8 {
        MessageTier::Firm
    } else {
        MessageTier::Gentle
    }
}

impl MessageTier {
    pub fn message(self) -> String {
        match self {
            MessageTier::Direct => format!("{} {}", VIOLATES_STANDARDS, REVIEW_GUIDELINES),
            MessageTier::Firm => format!("{} {}", MAY_BE_INAPPROPRIATE, REVIEW_GUIDELINES),
            MessageTier::Gentle => format!("{} {}", MAY_BE_INAPPROPRIATE, RESPECTFUL_ENVIRONMENT),
        }
    }
}

/// The message shown to a user whose post was blocked.
pub fn user_message(decision: &ModerationDecision) -> String {
    message_tier(decision.overall_confidence).message()
}
