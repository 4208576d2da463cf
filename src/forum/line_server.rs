// JSON-lines front end: one submission per input line, one response per
// output line. Lets the gateway sit behind any process that can pipe text.

use super::gate::{ModerationGate, Submission};
use crate::core::moderation::{Classifier, HealthCheck};
use serde_json::json;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// How submissions are turned into payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineMode {
    /// Normal forum submissions.
    Forum,
    /// Test endpoint: missing author becomes "TestUser", raw decision echoed.
    Test,
}

/// Serve the process's own stdin and stdout.
pub async fn serve_stdio<S, C>(
    gate: &ModerationGate<S, C>,
    mode: LineMode,
) -> std::io::Result<usize>
where
    S: Classifier + HealthCheck + 'static,
    C: Classifier + 'static,
{
    let stdin = BufReader::new(tokio::io::stdin());
    serve_lines(gate, stdin, tokio::io::stdout(), mode).await
}

/// Serve until `input` is exhausted. Returns how many lines were answered.
///
/// Lines that are not valid UTF-8 are decoded lossily and answered like any
/// other malformed submission.
pub async fn serve_lines<S, C, R, W>(
    gate: &ModerationGate<S, C>,
    mut input: R,
    mut output: W,
    mode: LineMode,
) -> std::io::Result<usize>
where
    S: Classifier + HealthCheck + 'static,
    C: Classifier + 'static,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();
    let mut answered = 0;

    loop {
        buf.clear();
        if input.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Submission>(line) {
            Ok(submission) => match mode {
                LineMode::Forum => gate.check(&submission).await.response_body(),
                LineMode::Test => {
                    let input = submission.for_test();
                    let decision = gate.decide(input.clone()).await;
                    json!({
                        "success": true,
                        "input": input,
                        "moderation_result": decision,
                        "timestamp": chrono::Utc::now(),
                    })
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed submission");
                json!({
                    "success": false,
                    "error": format!("Invalid submission: {}", e),
                    "timestamp": chrono::Utc::now(),
                })
            }
        };

        output.write_all(response.to_string().as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
        answered += 1;
    }

    Ok(answered)
}
