use crate::core::moderation::{
    Classifier, ClassifierCommand, ClassifierError, ContentPayload, ModerationDecision,
};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Runs the classifier as a fresh child process for every request.
///
/// The payload goes to the child's stdin as JSON; stdout must hold exactly
/// one decision document. Stderr is diagnostic only. Children are spawned
/// with `kill_on_drop`, so a timed-out run takes its process down with it.
pub struct SubprocessClassifier {
    command: ClassifierCommand,
    timeout: Duration,
}

impl SubprocessClassifier {
    pub fn new(command: ClassifierCommand, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    async fn run(&self, payload: &ContentPayload) -> Result<ModerationDecision, ClassifierError> {
        let input = serde_json::to_vec(payload).map_err(|e| ClassifierError::Io(e.into()))?;

        let mut child = Command::new(&self.command.executable)
            .arg(&self.command.script)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(ClassifierError::Spawn)?;

        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&input).await?;
                stdin.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };

        // Feed stdin while draining stdout/stderr so neither side can stall.
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output?;

        if let Err(e) = fed {
            // The exit status below is what decides the outcome.
            tracing::debug!(error = %e, "Classifier closed stdin early");
        }

        if !output.status.success() {
            return Err(ClassifierError::ExitStatus {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(ModerationDecision::from_classifier_output(&stdout)?)
    }
}

#[async_trait]
impl Classifier for SubprocessClassifier {
    async fn classify(
        &self,
        payload: &ContentPayload,
    ) -> Result<ModerationDecision, ClassifierError> {
        tokio::time::timeout(self.timeout, self.run(payload))
            .await
            .map_err(|_| ClassifierError::Timeout(self.timeout))?
    }
}
