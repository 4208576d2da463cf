// Lifecycle of the optional long-lived classifier service.
//
// The gateway may spawn one background classifier process at startup and
// trust it only after a health probe succeeds. Any failure along the way
// (spawn error, probe window exhausted, process exit) downgrades the gateway
// to the per-request subprocess strategy for the rest of its lifetime.

use super::moderation_service::{Classifier, HealthCheck, ModerationGateway};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

pub const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const HEALTH_MAX_WAIT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Failed to spawn moderation service: {0}")]
    Spawn(#[from] std::io::Error),
}

/// A running long-lived classifier process.
#[async_trait]
pub trait RunningService: Send + Sync {
    /// False once the process has exited for any reason.
    fn is_running(&self) -> bool;

    /// Stop the process and wait for it to be reaped.
    async fn shutdown(&mut self);
}

/// Starts the long-lived classifier. Implementations must call
/// [`ServiceState::mark_exited`] when the process goes away on its own.
#[async_trait]
pub trait ServiceLauncher: Send + Sync {
    async fn launch(
        &self,
        state: Arc<ServiceState>,
    ) -> Result<Box<dyn RunningService>, LaunchError>;
}

/// How health probing is paced during startup.
#[derive(Debug, Clone, Copy)]
pub struct HealthPolicy {
    pub interval: Duration,
    pub max_wait: Duration,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            interval: HEALTH_POLL_INTERVAL,
            max_wait: HEALTH_MAX_WAIT,
        }
    }
}

/// State shared between the dispatcher and the service lifecycle.
///
/// `persistent` is read by every request without locking. A request in
/// flight during a downgrade may still try the network path once.
pub struct ServiceState {
    persistent: AtomicBool,
    handle: Mutex<Option<Box<dyn RunningService>>>,
}

impl ServiceState {
    pub fn new(use_persistent_service: bool) -> Arc<Self> {
        Arc::new(Self {
            persistent: AtomicBool::new(use_persistent_service),
            handle: Mutex::new(None),
        })
    }

    pub fn use_persistent_service(&self) -> bool {
        self.persistent.load(Ordering::Acquire)
    }

    /// Permanently switch to the subprocess strategy. Never undone.
    pub fn downgrade(&self, why: &str) {
        if self.persistent.swap(false, Ordering::AcqRel) {
            tracing::warn!(reason = why, "Falling back to subprocess moderation");
        }
    }

    /// Store the service handle. Returns false (and drops the handle) if the
    /// process already died or a handle is already installed.
    pub async fn install(&self, handle: Box<dyn RunningService>) -> bool {
        let mut slot = self.handle.lock().await;
        if slot.is_some() || !handle.is_running() {
            return false;
        }
        *slot = Some(handle);
        true
    }

    /// Called by the launcher's exit watcher when the service process ends.
    pub async fn mark_exited(&self, code: Option<i32>) {
        match code {
            Some(0) => tracing::info!("Moderation service exited"),
            _ => tracing::warn!(?code, "Moderation service exited unexpectedly"),
        }
        self.handle.lock().await.take();
        self.downgrade("service process exited");
    }

    pub async fn has_running_service(&self) -> bool {
        self.handle
            .lock()
            .await
            .as_ref()
            .map(|h| h.is_running())
            .unwrap_or(false)
    }

    pub async fn take_handle(&self) -> Option<Box<dyn RunningService>> {
        self.handle.lock().await.take()
    }
}

impl<S, C> ModerationGateway<S, C>
where
    S: Classifier + HealthCheck,
    C: Classifier,
{
    /// Spawn the long-lived service and wait for it to become healthy.
    ///
    /// Does nothing unless moderation is enabled, the persistent strategy is
    /// still active, and the endpoint is not an external one. Returns whether
    /// the gateway ends up relying on the service.
    pub async fn start_persistent_service<L: ServiceLauncher>(&self, launcher: &L) -> bool {
        if !self.config().should_spawn_service() || !self.state().use_persistent_service() {
            return false;
        }
        if self.state().has_running_service().await {
            tracing::debug!("Moderation service already running");
            return true;
        }

        tracing::info!(
            endpoint = %self.config().service_endpoint,
            "Starting persistent moderation service"
        );

        match launcher.launch(Arc::clone(self.state())).await {
            Ok(handle) => {
                if !self.state().install(handle).await {
                    self.state().downgrade("service process did not stay up");
                    return false;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to start persistent moderation service");
                self.state().downgrade("spawn failed");
                return false;
            }
        }

        let healthy = self
            .wait_for_service_health(self.health_policy().max_wait)
            .await;

        if healthy {
            tracing::info!("Content moderation service ready");
        } else {
            self.state().downgrade("health check window elapsed");
            if let Some(mut handle) = self.state().take_handle().await {
                handle.shutdown().await;
            }
        }

        healthy
    }

    /// Poll the service's health endpoint until it answers or `max_wait`
    /// elapses. Stops early if the gateway has already been downgraded.
    pub async fn wait_for_service_health(&self, max_wait: Duration) -> bool {
        let started = Instant::now();
        let interval = self.health_policy().interval;

        while started.elapsed() < max_wait {
            if self.service().check_health().await {
                return true;
            }
            if !self.state().use_persistent_service() {
                return false;
            }
            tokio::time::sleep(interval).await;
        }

        false
    }

    /// Run [`Self::start_persistent_service`] on its own task so requests are
    /// served during the health window. Until the service answers, requests
    /// try the network path and fall back to the subprocess.
    pub fn spawn_persistent_service<L>(self: Arc<Self>, launcher: L) -> JoinHandle<bool>
    where
        S: 'static,
        C: 'static,
        L: ServiceLauncher + 'static,
    {
        tokio::spawn(async move { self.start_persistent_service(&launcher).await })
    }

    /// Stop the long-lived service, if one is running.
    pub async fn shutdown(&self) {
        if let Some(mut handle) = self.state().take_handle().await {
            tracing::info!("Shutting down moderation service...");
            handle.shutdown().await;
            tracing::info!("Moderation service shutdown complete");
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
