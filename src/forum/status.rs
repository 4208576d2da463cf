use crate::core::moderation::{Classifier, HealthCheck, ModerationGateway};
use serde::Serialize;

/// Which path a request would take right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Disabled,
    PersistentService,
    Subprocess,
}

/// Snapshot behind the `moderation-status` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ModerationStatus {
    pub enabled: bool,
    pub strategy: Strategy,
    pub service_endpoint: String,
    pub external_service: bool,
    pub service_running: bool,
    pub classifier_executable: String,
    pub model: String,
    pub threshold: f64,
}

impl ModerationStatus {
    pub async fn collect<S, C>(moderator: &ModerationGateway<S, C>) -> Self
    where
        S: Classifier + HealthCheck,
        C: Classifier,
    {
        let config = moderator.config();
        let strategy = if !config.enabled {
            Strategy::Disabled
        } else if moderator.is_using_persistent_service() {
            Strategy::PersistentService
        } else {
            Strategy::Subprocess
        };

        Self {
            enabled: config.enabled,
            strategy,
            service_endpoint: config.service_endpoint.clone(),
            external_service: config.external_service,
            service_running: moderator.has_running_service().await,
            classifier_executable: config.subprocess_command.executable.display().to_string(),
            model: config.model.clone(),
            threshold: config.hate_threshold,
        }
    }
}
