//! Host configuration for the orchestration integrations.
//!
//! An [`OrchestrationConfig`] says whether the process runs as a game server on
//! zeuz, whether the Session Manager created it, where the Payload Local API
//! lives, and which retry limits the host-side glue uses.

use crate::zeuz::PAYLOAD_API_ENV;
use crate::{Error, Result, RetryPolicy};
use serde::Deserialize;
use std::time::Duration;

/// Command-line flag set on game servers running on zeuz.
pub const ZEUZ_FLAG: &str = "zeuz";

/// Command-line flag set on game servers created by the Session Manager.
pub const SESSION_MANAGER_FLAG: &str = "session-manager";

/// Retry limits for one integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RetrySettings {
    /// Retries allowed after the first attempt.
    pub retry_limit_count: u32,
    /// Relative timeout since the first attempt, in seconds.
    pub retry_timeout_secs: u64,
}

impl RetrySettings {
    /// Creates settings.
    pub const fn new(retry_limit_count: u32, retry_timeout_secs: u64) -> Self {
        Self {
            retry_limit_count,
            retry_timeout_secs,
        }
    }

    /// The retry policy for these limits.
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_limit_count,
            Duration::from_secs(self.retry_timeout_secs),
        )
    }
}

/// Retry limits of the payload monitor when none are configured.
pub const DEFAULT_PAYLOAD_RETRY: RetrySettings = RetrySettings::new(10, 5);

/// Retry limits of the session browser when none are configured.
pub const DEFAULT_SESSION_RETRY: RetrySettings = RetrySettings::new(5, 10);

/// Settings for the orchestration integrations.
///
/// Every field is optional when deserializing; missing fields take their
/// default.
///
/// # Examples
///
/// ```
/// use ims_orchestration::config::OrchestrationConfig;
///
/// let config = OrchestrationConfig::builder()
///     .payload_api_domain("127.0.0.1:9090")
///     .running_on_zeuz(true)
///     .build();
///
/// assert_eq!(config.payload_api_url().as_deref(), Some("http://127.0.0.1:9090"));
/// assert_eq!(config.payload_retry.retry_limit_count, 10);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    /// `host:port` of the Payload Local API.
    pub payload_api_domain: Option<String>,
    /// Set with `-zeuz`.
    pub running_on_zeuz: bool,
    /// Set with `-session-manager`.
    pub created_by_session_manager: bool,
    /// Base URL of the Session Manager API.
    pub session_manager_url: Option<String>,
    /// IMS project sessions are created in.
    pub project_id: String,
    /// Session type (allocation selector) sessions are created from.
    pub session_type: String,
    /// Retry limits of the payload monitor.
    pub payload_retry: RetrySettings,
    /// Retry limits of the session browser.
    pub session_retry: RetrySettings,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            payload_api_domain: None,
            running_on_zeuz: false,
            created_by_session_manager: false,
            session_manager_url: None,
            project_id: String::new(),
            session_type: String::new(),
            payload_retry: DEFAULT_PAYLOAD_RETRY,
            session_retry: DEFAULT_SESSION_RETRY,
        }
    }
}

fn flag_name(arg: &str) -> Option<&str> {
    arg.strip_prefix("--").or_else(|| arg.strip_prefix('-'))
}

impl OrchestrationConfig {
    /// Creates a builder.
    pub fn builder() -> OrchestrationConfigBuilder {
        OrchestrationConfigBuilder::default()
    }

    /// Reads the Payload Local API domain from `ORCHESTRATION_PAYLOAD_API` and
    /// the presence flags from the process arguments.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_args(std::env::args().skip(1));
        config.payload_api_domain = std::env::var(PAYLOAD_API_ENV)
            .ok()
            .filter(|domain| !domain.trim().is_empty());

        tracing::debug!(
            running_on_zeuz = config.running_on_zeuz,
            created_by_session_manager = config.created_by_session_manager,
            payload_api_domain = ?config.payload_api_domain,
            "Loaded orchestration config from environment"
        );
        config
    }

    /// Parses JSON settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationError`] if the JSON does not describe a
    /// config.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            tracing::error!(error = %e, "Invalid orchestration config");
            Error::ConfigurationError(format!("invalid orchestration config: {}", e))
        })
    }

    /// Sets the presence flags found in `args`. Flags match with one or two
    /// leading dashes, ignoring case; other arguments are ignored.
    pub fn apply_args<I, S>(&mut self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            let Some(name) = flag_name(arg.as_ref()) else {
                continue;
            };
            if name.eq_ignore_ascii_case(ZEUZ_FLAG) {
                self.running_on_zeuz = true;
            } else if name.eq_ignore_ascii_case(SESSION_MANAGER_FLAG) {
                self.created_by_session_manager = true;
            }
        }
    }

    /// `http://` followed by the Payload Local API domain, if one is set.
    pub fn payload_api_url(&self) -> Option<String> {
        self.payload_api_domain
            .as_ref()
            .map(|domain| format!("http://{}", domain))
    }
}

/// Builder for [`OrchestrationConfig`].
#[derive(Debug, Default)]
pub struct OrchestrationConfigBuilder {
    config: OrchestrationConfig,
}

impl OrchestrationConfigBuilder {
    /// Sets the `host:port` of the Payload Local API.
    pub fn payload_api_domain(mut self, domain: impl Into<String>) -> Self {
        self.config.payload_api_domain = Some(domain.into());
        self
    }

    /// Marks the process as a game server running on zeuz.
    pub fn running_on_zeuz(mut self, value: bool) -> Self {
        self.config.running_on_zeuz = value;
        self
    }

    /// Marks the process as created by the Session Manager.
    pub fn created_by_session_manager(mut self, value: bool) -> Self {
        self.config.created_by_session_manager = value;
        self
    }

    /// Sets the Session Manager base URL.
    pub fn session_manager_url(mut self, url: impl Into<String>) -> Self {
        self.config.session_manager_url = Some(url.into());
        self
    }

    /// Sets the IMS project.
    pub fn project_id(mut self, project_id: impl Into<String>) -> Self {
        self.config.project_id = project_id.into();
        self
    }

    /// Sets the session type.
    pub fn session_type(mut self, session_type: impl Into<String>) -> Self {
        self.config.session_type = session_type.into();
        self
    }

    /// Sets the payload monitor's retry limits.
    pub fn payload_retry(mut self, retry_limit_count: u32, retry_timeout_secs: u64) -> Self {
        self.config.payload_retry = RetrySettings::new(retry_limit_count, retry_timeout_secs);
        self
    }

    /// Sets the session browser's retry limits.
    pub fn session_retry(mut self, retry_limit_count: u32, retry_timeout_secs: u64) -> Self {
        self.config.session_retry = RetrySettings::new(retry_limit_count, retry_timeout_secs);
        self
    }

    /// Builds the config.
    pub fn build(self) -> OrchestrationConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OrchestrationConfig::default();
        assert!(!config.running_on_zeuz);
        assert!(config.payload_api_url().is_none());
        assert_eq!(config.payload_retry, RetrySettings::new(10, 5));
        assert_eq!(config.session_retry, RetrySettings::new(5, 10));
    }

    #[test]
    fn test_flags() {
        let mut config = OrchestrationConfig::default();
        config.apply_args(["-log", "--zeuz", "Map=Highrise", "zeuz"]);
        assert!(config.running_on_zeuz);
        assert!(!config.created_by_session_manager);

        config.apply_args(["-Session-Manager"]);
        assert!(config.created_by_session_manager);
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = OrchestrationConfig::from_json(
            r#"{"project_id": "proj", "session_retry": {"retry_limit_count": 2, "retry_timeout_secs": 3}}"#,
        )
        .unwrap();
        assert_eq!(config.project_id, "proj");
        assert_eq!(config.session_retry, RetrySettings::new(2, 3));
        assert_eq!(config.payload_retry, DEFAULT_PAYLOAD_RETRY);
    }

    #[test]
    fn test_from_json_rejects_bad_types() {
        let err = OrchestrationConfig::from_json(r#"{"running_on_zeuz": "yes"}"#).unwrap_err();
        assert!(matches!(err, Error::ConfigurationError(_)));
    }

    #[test]
    fn test_policy_from_settings() {
        let policy = RetrySettings::new(10, 5).policy();
        assert_eq!(policy.retry_limit_count(), Some(10));
        assert_eq!(policy.retry_timeout(), Some(Duration::from_secs(5)));
    }
}
