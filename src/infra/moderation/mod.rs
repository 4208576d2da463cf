// Transports for the moderation gateway: the HTTP service client, the
// one-shot subprocess runner, and the long-lived service launcher.

pub mod http_classifier;
pub mod service_process;
pub mod subprocess_classifier;

pub use http_classifier::HttpClassifier;
pub use service_process::ProcessServiceLauncher;
pub use subprocess_classifier::SubprocessClassifier;

use crate::core::moderation::{ClassifierError, ModerationConfig, ModerationGateway};

/// The gateway as wired in production.
pub type ForumModerator = ModerationGateway<HttpClassifier, SubprocessClassifier>;

/// Build the production gateway from configuration.
pub fn build_moderator(config: ModerationConfig) -> Result<ForumModerator, ClassifierError> {
    let service = HttpClassifier::new(config.service_endpoint.clone())?;
    let subprocess =
        SubprocessClassifier::new(config.subprocess_command.clone(), config.subprocess_timeout);
    Ok(ModerationGateway::new(config, service, subprocess))
}
