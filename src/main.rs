// This is the entry point of the moderation gateway.
//
// **Architecture Overview:**
// - `core/` = Business logic (transport-agnostic)
// - `infra/` = Implementations of core traits (HTTP client, child processes)
// - `forum/` = Adapters forum routes use (gate, status, JSON-lines server)
//
// This file's job is to:
// 1. Load configuration
// 2. Build the gateway (dependency injection)
// 3. Start the long-lived classifier if configured
// 4. Serve submissions until input ends or we are interrupted

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with several mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "forum/forum_layer.rs"]
mod forum;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::core::moderation::ModerationConfig;
use crate::forum::line_server::{serve_stdio, LineMode};
use crate::forum::{ModerationGate, ModerationStatus};
use crate::infra::moderation::{build_moderator, ProcessServiceLauncher};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let command = std::env::args().nth(1);
    let mode = match command.as_deref() {
        None | Some("serve") => LineMode::Forum,
        Some("test") => LineMode::Test,
        Some("status") => LineMode::Forum,
        Some(other) => anyhow::bail!("Unknown command '{}'. Use serve, test or status.", other),
    };

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // One gateway per process, shared by reference with every caller.

    let config = ModerationConfig::from_env();
    let moderator = Arc::new(build_moderator(config)?);

    // Startup runs in the background; early requests fall back to the
    // subprocess until the service is healthy.
    let mut startup = moderator.config().should_spawn_service().then(|| {
        let launcher = ProcessServiceLauncher::from_config(moderator.config());
        Arc::clone(&moderator).spawn_persistent_service(launcher)
    });

    if command.as_deref() == Some("status") {
        if let Some(startup) = startup.take() {
            let _ = startup.await;
        }
        let status = ModerationStatus::collect(moderator.as_ref()).await;
        println!("{}", serde_json::to_string_pretty(&status)?);
        moderator.shutdown().await;
        return Ok(());
    }

    let gate = ModerationGate::new(Arc::clone(&moderator));

    tracing::info!(?mode, "Moderation gateway ready, reading submissions from stdin");

    let served = tokio::select! {
        served = serve_stdio(&gate, mode) => Some(served),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
            None
        }
    };

    // Always reap the service, even if serving failed or startup is still
    // waiting on the health check.
    if let Some(startup) = startup {
        startup.abort();
        let _ = startup.await;
    }
    moderator.shutdown().await;

    match served {
        Some(served) => {
            let count = served?;
            tracing::info!(count, "Input closed, moderation gateway stopping");
            Ok(())
        }
        // A pending stdin read can't be cancelled and would hold the runtime open.
        None => std::process::exit(0),
    }
}
