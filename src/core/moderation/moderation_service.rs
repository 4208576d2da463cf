// Moderation gateway - decides allow/block for user-generated text.
//
// This service handles:
// - The master enable switch
// - Strategy selection (long-lived HTTP service vs one-shot subprocess)
// - Falling back from the service to the subprocess on any network failure
// - Turning every transport failure into a safe "allow" decision
//
// NO HTTP or process code here - transports are injected through the
// `Classifier` and `HealthCheck` ports and implemented in infra.

use super::moderation_config::ModerationConfig;
use super::moderation_models::{ContentPayload, DecisionError, ModerationDecision};
use super::service_lifecycle::{HealthPolicy, ServiceState};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

/// Why a single classifier transport call failed.
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Service responded with {0}")]
    Status(u16),

    #[error("Classifier timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to spawn classifier: {0}")]
    Spawn(std::io::Error),

    #[error("Classifier I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Classifier exited with code {code:?}")]
    ExitStatus { code: Option<i32>, stderr: String },

    #[error("Unreadable classifier output: {0}")]
    Parse(#[from] DecisionError),
}

impl ClassifierError {
    /// The decision handed back to callers when the subprocess path fails.
    pub fn safe_default(&self) -> ModerationDecision {
        match self {
            ClassifierError::Parse(_) => ModerationDecision::parsing_error(),
            _ => ModerationDecision::unavailable(),
        }
    }
}

// ============================================================================
// TRANSPORT TRAITS (PORTS)
// ============================================================================

/// Anything that can turn a payload into a decision.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, payload: &ContentPayload)
        -> Result<ModerationDecision, ClassifierError>;
}

/// A classifier that can also report whether it is accepting traffic.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// One probe. Must not block for long; implementations bound it.
    async fn check_health(&self) -> bool;
}

// Blanket implementations so callers can keep an `Arc` to a transport
// while the gateway owns another one.
#[async_trait]
impl<T: Classifier + ?Sized> Classifier for Arc<T> {
    async fn classify(
        &self,
        payload: &ContentPayload,
    ) -> Result<ModerationDecision, ClassifierError> {
        (**self).classify(payload).await
    }
}

#[async_trait]
impl<T: HealthCheck + ?Sized> HealthCheck for Arc<T> {
    async fn check_health(&self) -> bool {
        (**self).check_health().await
    }
}

// ============================================================================
// CORE SERVICE
// ============================================================================

/// The moderation gateway. Build one at startup and share it behind an `Arc`.
pub struct ModerationGateway<S, C> {
    config: ModerationConfig,
    service: S,
    subprocess: C,
    state: Arc<ServiceState>,
    health: HealthPolicy,
}

impl<S, C> ModerationGateway<S, C>
where
    S: Classifier + HealthCheck,
    C: Classifier,
{
    /// `service` talks to the long-lived classifier, `subprocess` runs the
    /// one-shot one.
    pub fn new(config: ModerationConfig, service: S, subprocess: C) -> Self {
        let state = ServiceState::new(config.enabled && config.use_persistent_service);

        if config.enabled {
            tracing::info!(
                endpoint = %config.service_endpoint,
                persistent = config.use_persistent_service,
                "Content moderation enabled"
            );
        }

        Self {
            config,
            service,
            subprocess,
            state,
            health: HealthPolicy::default(),
        }
    }

    #[allow(dead_code)]
    pub fn with_health_policy(mut self, health: HealthPolicy) -> Self {
        self.health = health;
        self
    }

    pub fn config(&self) -> &ModerationConfig {
        &self.config
    }

    pub fn state(&self) -> &Arc<ServiceState> {
        &self.state
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn health_policy(&self) -> HealthPolicy {
        self.health
    }

    /// Whether requests currently go to the long-lived service first.
    pub fn is_using_persistent_service(&self) -> bool {
        self.state.use_persistent_service()
    }

    pub async fn has_running_service(&self) -> bool {
        self.state.has_running_service().await
    }

    /// Decide whether `payload` may be published.
    ///
    /// Never fails: every transport problem ends in an "allow" decision
    /// whose `reason` says what went wrong.
    pub async fn moderate(&self, payload: &ContentPayload) -> ModerationDecision {
        if !self.config.enabled {
            return ModerationDecision::disabled();
        }

        if self.state.use_persistent_service() {
            match self.service.classify(payload).await {
                Ok(decision) => return decision,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Persistent moderation service failed, retrying via subprocess"
                    );
                }
            }
        }

        self.moderate_via_subprocess(payload).await
    }

    async fn moderate_via_subprocess(&self, payload: &ContentPayload) -> ModerationDecision {
        match self.subprocess.classify(payload).await {
            Ok(decision) => decision,
            Err(e) => {
                let decision = e.safe_default();
                if let ClassifierError::ExitStatus { code, stderr } = &e {
                    tracing::error!(?code, stderr = %stderr.trim(), "Moderation subprocess failed");
                } else {
                    tracing::error!(error = %e, "Moderation subprocess failed");
                }
                decision
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
