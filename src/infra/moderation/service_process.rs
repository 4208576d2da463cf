use crate::core::moderation::{
    ClassifierCommand, LaunchError, ModerationConfig, RunningService, ServiceLauncher,
    ServiceState,
};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;

/// How long a stopping service gets after SIGTERM before it is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
/// How long we wait for a killed service to be reaped.
const KILL_WAIT: Duration = Duration::from_secs(2);

/// Spawns the long-lived classifier server as a child process.
pub struct ProcessServiceLauncher {
    command: ClassifierCommand,
    env: Vec<(String, String)>,
}

impl ProcessServiceLauncher {
    pub fn new(command: ClassifierCommand, env: Vec<(String, String)>) -> Self {
        Self { command, env }
    }

    pub fn from_config(config: &ModerationConfig) -> Self {
        Self::new(config.service_command.clone(), config.service_env())
    }
}

#[async_trait]
impl ServiceLauncher for ProcessServiceLauncher {
    async fn launch(
        &self,
        state: Arc<ServiceState>,
    ) -> Result<Box<dyn RunningService>, LaunchError> {
        let mut child = Command::new(&self.command.executable)
            .arg(&self.command.script)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        tracing::debug!(pid = ?child.id(), "Moderation service spawned");

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, false));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, true));
        }

        let running = Arc::new(AtomicBool::new(true));
        let (stop_tx, stop_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();
        tokio::spawn(watch(child, stop_rx, done_tx, Arc::clone(&running), state));

        Ok(Box::new(ServiceProcessHandle {
            running,
            stop_tx: Some(stop_tx),
            done_rx: Some(done_rx),
        }))
    }
}

/// Handle to the spawned service. Dropping it also stops the process.
pub struct ServiceProcessHandle {
    running: Arc<AtomicBool>,
    stop_tx: Option<oneshot::Sender<()>>,
    done_rx: Option<oneshot::Receiver<()>>,
}

#[async_trait]
impl RunningService for ServiceProcessHandle {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    async fn shutdown(&mut self) {
        if let Some(stop) = self.stop_tx.take() {
            let _ = stop.send(());
        }
        if let Some(done) = self.done_rx.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE * 2, done).await.is_err() {
                tracing::warn!("Moderation service did not confirm shutdown");
            }
        }
    }
}

/// Owns the child until it exits or a stop is requested.
async fn watch(
    mut child: Child,
    stop_rx: oneshot::Receiver<()>,
    done_tx: oneshot::Sender<()>,
    running: Arc<AtomicBool>,
    state: Arc<ServiceState>,
) {
    tokio::select! {
        status = child.wait() => {
            running.store(false, Ordering::Release);
            let code = match status {
                Ok(status) => status.code(),
                Err(e) => {
                    tracing::error!(error = %e, "Lost track of moderation service");
                    None
                }
            };
            state.mark_exited(code).await;
        }
        // Fires on an explicit stop and when the handle is dropped.
        _ = stop_rx => {
            stop_child(&mut child).await;
            running.store(false, Ordering::Release);
        }
    }
    let _ = done_tx.send(());
}

/// SIGTERM first, then SIGKILL once the grace period runs out.
async fn stop_child(child: &mut Child) {
    if request_terminate(child) {
        if tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await.is_ok() {
            return;
        }
        tracing::warn!("Moderation service ignored SIGTERM, killing it");
    }

    if let Err(e) = child.start_kill() {
        tracing::debug!(error = %e, "Moderation service already gone");
    }
    if tokio::time::timeout(KILL_WAIT, child.wait()).await.is_err() {
        tracing::warn!("Moderation service did not exit after being killed");
    }
}

#[cfg(unix)]
fn request_terminate(child: &Child) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return false;
    };
    match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(error = %e, "Could not send SIGTERM to moderation service");
            false
        }
    }
}

#[cfg(not(unix))]
fn request_terminate(_child: &Child) -> bool {
    false
}

/// Pipe a child stream into our logs. Only stderr lines that look like real
/// errors are surfaced above debug.
async fn forward_lines<R>(stream: R, is_stderr: bool)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    // Bytes, not `lines()`: a decode error must not close the pipe while the
    // service is still writing to it.
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "Stopped reading moderation service output");
                break;
            }
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if is_stderr && (line.contains("ERROR") || line.contains("CRITICAL")) {
            tracing::error!(target: "moderation_service", "{}", line);
        } else {
            tracing::debug!(target: "moderation_service", "{}", line);
        }
    }
}
