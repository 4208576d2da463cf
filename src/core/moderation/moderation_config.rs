// Gateway configuration, read once from environment-style key/value input.
//
// There are no error conditions here: anything absent or malformed falls
// back to a default so a missing .env never stops the server from booting.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SERVICE_PORT: u16 = 8001;
pub const DEFAULT_IDLE_TIMEOUT_MINUTES: u32 = 30;
pub const DEFAULT_SUBPROCESS_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MODEL: &str = "irlab-udc/MetaHateBERT";
pub const DEFAULT_HATE_THRESHOLD: f64 = 0.7;

/// How to run the classifier as a child process: `executable script`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierCommand {
    pub executable: PathBuf,
    pub script: PathBuf,
}

impl ClassifierCommand {
    pub fn new(executable: impl Into<PathBuf>, script: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            script: script.into(),
        }
    }
}

/// Process-wide moderation settings. Immutable once built.
#[derive(Debug, Clone)]
pub struct ModerationConfig {
    /// Master switch. When false every request is allowed without I/O.
    pub enabled: bool,
    /// Preferred transport: the long-lived HTTP service.
    pub use_persistent_service: bool,
    /// Base URL of the long-lived classifier service.
    pub service_endpoint: String,
    /// Port handed to a locally spawned service.
    pub service_port: u16,
    /// True when `MODERATION_SERVICE_URL` was given; a local service is then
    /// never spawned.
    pub external_service: bool,
    /// One-shot classifier.
    pub subprocess_command: ClassifierCommand,
    /// Long-lived classifier server, launched with the same executable.
    pub service_command: ClassifierCommand,
    /// Passed to the spawned service for its own idle shutdown.
    pub idle_timeout_minutes: u32,
    /// Upper bound on a single one-shot classifier run.
    pub subprocess_timeout: Duration,
    /// Classifier model name. Reported only; the classifier reads it itself.
    pub model: String,
    /// Classifier blocking threshold, in [0,1]. Reported only.
    pub hate_threshold: f64,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl ModerationConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |key: &str| lookup(key).map(|v| v == "true").unwrap_or(false);
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let service_port = non_empty("MODERATION_SERVICE_PORT")
            .and_then(|v| v.trim().parse::<u16>().ok())
            .unwrap_or(DEFAULT_SERVICE_PORT);

        let explicit_url = non_empty("MODERATION_SERVICE_URL");
        let external_service = explicit_url.is_some();
        let service_endpoint = explicit_url
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("http://localhost:{}", service_port));

        let executable = non_empty("PYTHON_PATH").unwrap_or_else(|| "python".to_string());
        let cli_script = non_empty("MODERATION_CLI_SCRIPT")
            .unwrap_or_else(|| "automod/moderate_cli.py".to_string());
        let server_script = non_empty("MODERATION_SERVER_SCRIPT")
            .unwrap_or_else(|| "automod/moderation_server.py".to_string());

        let idle_timeout_minutes = non_empty("MODERATION_IDLE_TIMEOUT")
            .and_then(|v| v.trim().parse::<u32>().ok())
            .unwrap_or(DEFAULT_IDLE_TIMEOUT_MINUTES);

        let subprocess_timeout = non_empty("MODERATION_SUBPROCESS_TIMEOUT_SECS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_SUBPROCESS_TIMEOUT_SECS);

        let model = non_empty("MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let hate_threshold = non_empty("HATE_THRESHOLD")
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|t| (0.0..=1.0).contains(t))
            .unwrap_or(DEFAULT_HATE_THRESHOLD);

        Self {
            enabled: flag("ENABLE_MODERATION"),
            use_persistent_service: flag("USE_PERSISTENT_MODERATION"),
            service_endpoint,
            service_port,
            external_service,
            subprocess_command: ClassifierCommand::new(&executable, cli_script),
            service_command: ClassifierCommand::new(executable, server_script),
            idle_timeout_minutes,
            subprocess_timeout: Duration::from_secs(subprocess_timeout),
            model,
            hate_threshold,
        }
    }

    /// Whether this gateway should spawn its own long-lived service.
    pub fn should_spawn_service(&self) -> bool {
        self.enabled && self.use_persistent_service && !self.external_service
    }

    /// Environment handed to a spawned long-lived service.
    pub fn service_env(&self) -> Vec<(String, String)> {
        vec![
            (
                "MODERATION_SERVICE_PORT".to_string(),
                self.service_port.to_string(),
            ),
            (
                "MODERATION_IDLE_TIMEOUT".to_string(),
                self.idle_timeout_minutes.to_string(),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> ModerationConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ModerationConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let config = ModerationConfig::default();

        assert!(!config.enabled);
        assert!(!config.use_persistent_service);
        assert!(!config.external_service);
        assert_eq!(config.service_port, 8001);
        assert_eq!(config.service_endpoint, "http://localhost:8001");
        assert_eq!(config.subprocess_command.executable, PathBuf::from("python"));
        assert_eq!(
            config.subprocess_command.script,
            PathBuf::from("automod/moderate_cli.py")
        );
        assert_eq!(config.idle_timeout_minutes, 30);
        assert_eq!(config.subprocess_timeout, Duration::from_secs(60));
        assert_eq!(config.model, "irlab-udc/MetaHateBERT");
        assert_eq!(config.hate_threshold, 0.7);
    }

    #[test]
    fn test_only_literal_true_enables() {
        assert!(config_from(&[("ENABLE_MODERATION", "true")]).enabled);
        assert!(!config_from(&[("ENABLE_MODERATION", "1")]).enabled);
        assert!(!config_from(&[("ENABLE_MODERATION", "TRUE ish")]).enabled);
        assert!(!config_from(&[("ENABLE_MODERATION", " true")]).enabled);
        assert!(!config_from(&[("USE_PERSISTENT_MODERATION", "true\n")]).use_persistent_service);
    }

    #[test]
    fn test_model_and_threshold() {
        let config = config_from(&[("MODEL", "unitary/toxic-bert"), ("HATE_THRESHOLD", "0.85")]);
        assert_eq!(config.model, "unitary/toxic-bert");
        assert_eq!(config.hate_threshold, 0.85);

        let config = config_from(&[("HATE_THRESHOLD", "1.5")]);
        assert_eq!(config.hate_threshold, DEFAULT_HATE_THRESHOLD);
    }

    #[test]
    fn test_malformed_numbers_fall_back_to_defaults() {
        let config = config_from(&[
            ("MODERATION_SERVICE_PORT", "not-a-port"),
            ("MODERATION_IDLE_TIMEOUT", "-4"),
            ("MODERATION_SUBPROCESS_TIMEOUT_SECS", "0"),
        ]);

        assert_eq!(config.service_port, DEFAULT_SERVICE_PORT);
        assert_eq!(config.idle_timeout_minutes, DEFAULT_IDLE_TIMEOUT_MINUTES);
        assert_eq!(
            config.subprocess_timeout,
            Duration::from_secs(DEFAULT_SUBPROCESS_TIMEOUT_SECS)
        );
    }

    #[test]
    fn test_port_feeds_local_endpoint() {
        let config = config_from(&[
            ("ENABLE_MODERATION", "true"),
            ("USE_PERSISTENT_MODERATION", "true"),
            ("MODERATION_SERVICE_PORT", "9100"),
        ]);

        assert_eq!(config.service_endpoint, "http://localhost:9100");
        assert!(config.should_spawn_service());
        assert!(config
            .service_env()
            .contains(&("MODERATION_SERVICE_PORT".to_string(), "9100".to_string())));
    }

    #[test]
    fn test_explicit_url_marks_external_service() {
        let config = config_from(&[
            ("ENABLE_MODERATION", "true"),
            ("USE_PERSISTENT_MODERATION", "true"),
            ("MODERATION_SERVICE_URL", "http://automod:8001/"),
        ]);

        assert!(config.external_service);
        assert_eq!(config.service_endpoint, "http://automod:8001");
        assert!(!config.should_spawn_service());
    }
}
