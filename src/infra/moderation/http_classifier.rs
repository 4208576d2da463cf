use crate::core::moderation::{
    Classifier, ClassifierError, ContentPayload, HealthCheck, ModerationDecision,
};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for the long-lived classifier service.
///
/// `POST {endpoint}` classifies, `GET {endpoint}/health` probes. Both calls are
/// wrapped in a cancelling timeout so a hung connection is abandoned instead
/// of waiting on the socket.
pub struct HttpClassifier {
    client: Client,
    endpoint: String,
    request_timeout: Duration,
    probe_timeout: Duration,
}

impl HttpClassifier {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, ClassifierError> {
        let client = Client::builder()
            .user_agent("ForumModerationGateway/1.0")
            .build()
            .map_err(|e| ClassifierError::Http(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            request_timeout: REQUEST_TIMEOUT,
            probe_timeout: PROBE_TIMEOUT,
        })
    }

    #[allow(dead_code)]
    pub fn with_timeouts(mut self, request_timeout: Duration, probe_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self.probe_timeout = probe_timeout;
        self
    }

    fn health_url(&self) -> String {
        format!("{}/health", self.endpoint)
    }

    async fn post_payload(
        &self,
        payload: &ContentPayload,
    ) -> Result<ModerationDecision, ClassifierError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(payload)
            .send()
            .await
            .map_err(|e| ClassifierError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ClassifierError::Status(resp.status().as_u16()));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| ClassifierError::Http(e.to_string()))?;

        Ok(ModerationDecision::from_classifier_output(&body)?)
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(
        &self,
        payload: &ContentPayload,
    ) -> Result<ModerationDecision, ClassifierError> {
        tokio::time::timeout(self.request_timeout, self.post_payload(payload))
            .await
            .map_err(|_| ClassifierError::Timeout(self.request_timeout))?
    }
}

#[async_trait]
impl HealthCheck for HttpClassifier {
    async fn check_health(&self) -> bool {
        let probe = self.client.get(self.health_url()).send();
        match tokio::time::timeout(self.probe_timeout, probe).await {
            Ok(Ok(resp)) => resp.status().is_success(),
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "Moderation health probe failed");
                false
            }
            Err(_) => {
                tracing::debug!("Moderation health probe timed out");
                false
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    /// Read one full HTTP request (headers plus Content-Length body).
    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let headers = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                let body_len = headers
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + body_len {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Answer a single request with `status` and `body`; yields the raw request.
    pub(crate) async fn serve_once(
        status: &'static str,
        body: &'static str,
    ) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        let task = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_request(&mut stream).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();
            request
        });

        (url, task)
    }

    /// Accept connections and never answer them.
    pub(crate) async fn serve_hung() -> (String, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        let task = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        (url, task)
    }

    /// An address nothing is listening on.
    pub(crate) async fn refused_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        url
    }

    fn fast(client: HttpClassifier) -> HttpClassifier {
        client.with_timeouts(Duration::from_millis(300), Duration::from_millis(300))
    }

    fn payload() -> ContentPayload {
        ContentPayload::new("x", "y", "someone")
    }

    #[tokio::test]
    async fn test_posts_payload_and_parses_decision() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"allowed":false,"blocked_reason":"hate_speech","overall_confidence":0.95}"#,
        )
        .await;
        let client = fast(HttpClassifier::new(url).unwrap());

        let decision = client.classify(&payload()).await.unwrap();
        let request = server.await.unwrap();

        assert!(!decision.allowed);
        assert_eq!(decision.blocked_reason.as_deref(), Some("hate_speech"));
        assert_eq!(decision.overall_confidence, Some(0.95));
        assert!(request.starts_with("POST / HTTP/1.1"));
        assert!(request.contains(r#""content":"y""#));
        assert!(request.contains(r#""author":"someone""#));
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let (url, _server) = serve_once(
            "500 Internal Server Error",
            r#"{"allowed":true,"reason":"Moderation service error"}"#,
        )
        .await;
        let client = fast(HttpClassifier::new(url).unwrap());

        let err = client.classify(&payload()).await.unwrap_err();

        assert!(matches!(err, ClassifierError::Status(500)));
    }

    #[tokio::test]
    async fn test_malformed_body_is_error() {
        let (url, _server) = serve_once("200 OK", "<html>oops</html>").await;
        let client = fast(HttpClassifier::new(url).unwrap());

        let err = client.classify(&payload()).await.unwrap_err();

        assert!(matches!(err, ClassifierError::Parse(_)));
    }

    #[tokio::test]
    async fn test_hung_service_times_out() {
        let (url, _server) = serve_hung().await;
        let client = fast(HttpClassifier::new(url).unwrap());

        let err = client.classify(&payload()).await.unwrap_err();

        assert!(matches!(err, ClassifierError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_error() {
        let client = fast(HttpClassifier::new(refused_url().await).unwrap());

        let err = client.classify(&payload()).await.unwrap_err();

        assert!(matches!(err, ClassifierError::Http(_)));
    }

    #[tokio::test]
    async fn test_health_probe() {
        let (url, server) = serve_once("200 OK", r#"{"status":"healthy"}"#).await;
        let client = fast(HttpClassifier::new(url).unwrap());
        assert!(client.check_health().await);
        assert!(server.await.unwrap().starts_with("GET /health HTTP/1.1"));

        let (url, _server) = serve_once("503 Service Unavailable", "{}").await;
        assert!(!fast(HttpClassifier::new(url).unwrap()).check_health().await);

        let (url, _server) = serve_hung().await;
        assert!(!fast(HttpClassifier::new(url).unwrap()).check_health().await);

        let url = refused_url().await;
        assert!(!fast(HttpClassifier::new(url).unwrap()).check_health().await);
    }
}
