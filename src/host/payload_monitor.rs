//! Payload lifecycle tracking for a game server running on zeuz.

use super::lock;
use crate::client::{ApiClient, RequestHandle};
use crate::config::OrchestrationConfig;
use crate::events::{Event, EventBroadcaster};
use crate::zeuz::{
    ApiV0SessionManagerStatusPostRequest, GetPayloadV0Request, GetSessionConfigV0Request,
    PayloadLocalApi, PayloadStatusStateV0, ReadyV0Request, SessionManagerLocalApi,
};
use crate::{Request, Result, RetryManager, RetryPolicy};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Progress reported by a [`PayloadMonitor`].
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadEvent {
    /// The ready call finished.
    ReadyComplete {
        /// Whether the payload was marked ready.
        successful: bool,
    },
    /// A status poll observed a new payload state.
    StateChanged {
        /// The state before the poll.
        previous: PayloadStatusStateV0,
        /// The state reported by the poll.
        current: PayloadStatusStateV0,
    },
    /// A status poll failed.
    StatusUpdateFailed,
    /// The session config of a reserved payload arrived.
    SessionConfigReceived(Value),
    /// The session config could not be fetched.
    SessionConfigFailed,
}

/// Kinds of [`PayloadEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadEventKind {
    /// See [`PayloadEvent::ReadyComplete`].
    ReadyComplete,
    /// See [`PayloadEvent::StateChanged`].
    StateChanged,
    /// See [`PayloadEvent::StatusUpdateFailed`].
    StatusUpdateFailed,
    /// See [`PayloadEvent::SessionConfigReceived`].
    SessionConfigReceived,
    /// See [`PayloadEvent::SessionConfigFailed`].
    SessionConfigFailed,
}

impl Event for PayloadEvent {
    type Kind = PayloadEventKind;

    fn kind(&self) -> PayloadEventKind {
        match self {
            PayloadEvent::ReadyComplete { .. } => PayloadEventKind::ReadyComplete,
            PayloadEvent::StateChanged { .. } => PayloadEventKind::StateChanged,
            PayloadEvent::StatusUpdateFailed => PayloadEventKind::StatusUpdateFailed,
            PayloadEvent::SessionConfigReceived(_) => PayloadEventKind::SessionConfigReceived,
            PayloadEvent::SessionConfigFailed => PayloadEventKind::SessionConfigFailed,
        }
    }
}

#[derive(Debug, Default)]
struct MonitorState {
    current: PayloadStatusStateV0,
    polling: bool,
    config_wanted: bool,
    session_config: Option<Value>,
}

/// Follows the payload a game server runs in through the Payload Local API.
///
/// The monitor marks the payload ready, polls its state, and fetches the
/// session config once a payload created by the Session Manager is reserved.
/// Failures are reported as events; the monitor never stops the process.
///
/// # Examples
///
/// ```no_run
/// use ims_orchestration::config::OrchestrationConfig;
/// use ims_orchestration::host::{PayloadEvent, PayloadEventKind, PayloadMonitor};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), ims_orchestration::Error> {
/// let config = OrchestrationConfig::from_env();
/// if !config.running_on_zeuz {
///     return Ok(());
/// }
///
/// let monitor = PayloadMonitor::new(&config);
/// monitor.events().subscribe(PayloadEventKind::StateChanged, |event| {
///     if let PayloadEvent::StateChanged { current, .. } = event {
///         println!("payload is now {}", current);
///     }
/// });
///
/// monitor.mark_ready()?;
/// loop {
///     monitor.update_status()?;
///     monitor.tick();
///     tokio::time::sleep(Duration::from_secs(1)).await;
/// }
/// # }
/// ```
#[derive(Debug)]
pub struct PayloadMonitor {
    payload_api: PayloadLocalApi,
    session_api: SessionManagerLocalApi,
    created_by_session_manager: bool,
    retry_policy: RetryPolicy,
    state: Arc<Mutex<MonitorState>>,
    events: Arc<EventBroadcaster<PayloadEvent>>,
}

fn local_client(url: Option<&str>, retry_manager: &Arc<RetryManager>) -> ApiClient {
    let builder = ApiClient::builder().retry_manager(retry_manager.clone());
    let Some(url) = url else {
        return builder.build();
    };
    match builder.base_url(url) {
        Ok(builder) => builder.build(),
        Err(e) => {
            tracing::error!(url = %url, error = %e, "Invalid Payload Local API URL");
            ApiClient::builder()
                .retry_manager(retry_manager.clone())
                .build()
        }
    }
}

impl PayloadMonitor {
    /// Creates a monitor for the configured Payload Local API.
    ///
    /// Without a Payload Local API domain the clients are left without a base
    /// URL and every call fails with a configuration error.
    pub fn new(config: &OrchestrationConfig) -> Self {
        let url = config.payload_api_url();
        match &url {
            Some(url) => tracing::info!(url = %url, "Payload Local API URL set"),
            None => tracing::warn!(
                env = crate::zeuz::PAYLOAD_API_ENV,
                "No Payload Local API domain configured"
            ),
        }

        let retry_manager = Arc::new(RetryManager::new());
        Self::with_apis(
            PayloadLocalApi::with_client(local_client(url.as_deref(), &retry_manager)),
            SessionManagerLocalApi::with_client(local_client(url.as_deref(), &retry_manager)),
            config,
        )
    }

    /// Creates a monitor over existing API façades.
    pub fn with_apis(
        payload_api: PayloadLocalApi,
        session_api: SessionManagerLocalApi,
        config: &OrchestrationConfig,
    ) -> Self {
        Self {
            payload_api,
            session_api,
            created_by_session_manager: config.created_by_session_manager,
            retry_policy: config.payload_retry.policy(),
            state: Arc::new(Mutex::new(MonitorState::default())),
            events: Arc::new(EventBroadcaster::new()),
        }
    }

    /// The monitor's event subscriptions.
    pub fn events(&self) -> &EventBroadcaster<PayloadEvent> {
        &self.events
    }

    /// The payload's state as of the last successful poll.
    pub fn current_state(&self) -> PayloadStatusStateV0 {
        lock(&self.state).current
    }

    /// Returns `false` once the payload is shutting down, unhealthy or errored.
    pub fn can_accept_players(&self) -> bool {
        !self.current_state().rejects_players()
    }

    /// The session config, once fetched.
    pub fn session_config(&self) -> Option<Value> {
        lock(&self.state).session_config.clone()
    }

    /// Marks the payload ready to be reserved.
    /// [`PayloadEvent::ReadyComplete`] reports the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the call could not be issued; no event follows.
    pub fn mark_ready(&self) -> Result<RequestHandle> {
        let mut request = ReadyV0Request::default();
        request.set_should_retry(Some(self.retry_policy.clone()));

        let events = self.events.clone();
        self.payload_api.ready_v0(&request, move |response| {
            let successful = response.status_is_ok();
            if successful {
                tracing::info!("Payload marked ready");
            } else {
                tracing::warn!(
                    status = %response.status(),
                    attempts = response.attempts(),
                    "Failed to mark payload ready"
                );
            }
            events.broadcast(&PayloadEvent::ReadyComplete { successful });
        })
    }

    /// Polls the payload's state. Returns `None` while the previous poll is
    /// still in flight.
    ///
    /// # Errors
    ///
    /// Returns an error if the call could not be issued.
    pub fn update_status(&self) -> Result<Option<RequestHandle>> {
        if lock(&self.state).polling {
            return Ok(None);
        }

        let mut request = GetPayloadV0Request::default();
        request.set_should_retry(Some(self.retry_policy.clone()));

        let state = self.state.clone();
        let events = self.events.clone();
        let created_by_session_manager = self.created_by_session_manager;
        let handle = self.payload_api.get_payload_v0(&request, move |response| {
            let successful = response.status_is_ok() && response.parse_error().is_none();
            let change = {
                let mut state = lock(&state);
                state.polling = false;
                let pending = response.content.result.status.state;
                if !successful || pending == state.current {
                    None
                } else {
                    let previous = std::mem::replace(&mut state.current, pending);
                    if pending == PayloadStatusStateV0::Reserved && created_by_session_manager {
                        state.config_wanted = true;
                    }
                    Some(previous)
                }
            };

            if !successful {
                tracing::warn!(status = %response.status(), "Failed to retrieve payload details");
                events.broadcast(&PayloadEvent::StatusUpdateFailed);
                return;
            }
            let Some(previous) = change else {
                return;
            };

            let current = response.content.result.status.state;
            match current {
                PayloadStatusStateV0::Reserved => tracing::info!("Payload reserved"),
                PayloadStatusStateV0::Error | PayloadStatusStateV0::Unhealthy => {
                    tracing::error!(state = %current, "Payload is in a failed state")
                }
                _ => tracing::info!(previous = %previous, state = %current, "Payload state changed"),
            }
            events.broadcast(&PayloadEvent::StateChanged { previous, current });
        })?;

        lock(&self.state).polling = true;
        Ok(Some(handle))
    }

    /// Fetches the config the Session Manager created the session with.
    /// [`PayloadEvent::SessionConfigReceived`] or
    /// [`PayloadEvent::SessionConfigFailed`] reports the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the call could not be issued.
    pub fn fetch_session_config(&self) -> Result<RequestHandle> {
        let mut request = GetSessionConfigV0Request::default();
        request.set_should_retry(Some(self.retry_policy.clone()));

        let state = self.state.clone();
        let events = self.events.clone();
        self.session_api.get_session_config_v0(&request, move |response| {
            if response.status_is_ok() && response.parse_error().is_none() {
                tracing::info!("Received session config");
                lock(&state).session_config = Some(response.content.clone());
                events.broadcast(&PayloadEvent::SessionConfigReceived(response.content.clone()));
            } else {
                tracing::warn!(status = %response.status(), "Failed to retrieve session config");
                events.broadcast(&PayloadEvent::SessionConfigFailed);
            }
        })
    }

    /// Publishes session status pairs (player counts, game phase, map) for
    /// players browsing sessions.
    ///
    /// # Errors
    ///
    /// Returns an error if the call could not be issued.
    pub fn publish_session_status<K, V>(
        &self,
        status: impl IntoIterator<Item = (K, V)>,
    ) -> Result<RequestHandle>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut request = ApiV0SessionManagerStatusPostRequest::new(status);
        request.set_should_retry(Some(self.retry_policy.clone()));

        self.session_api
            .api_v0_session_manager_status_post(&request, |response| {
                if !response.status_is_ok() {
                    tracing::warn!(
                        status = %response.status(),
                        reason = %response.response_string(),
                        "Failed to publish session status"
                    );
                }
            })
    }

    /// Delivers finished calls and issues the session config fetch once the
    /// payload is reserved. Returns the number of completions invoked.
    pub fn tick(&self) -> usize {
        let delivered = self.payload_api.tick() + self.session_api.tick();

        let config_wanted = std::mem::take(&mut lock(&self.state).config_wanted);
        if config_wanted {
            if let Err(e) = self.fetch_session_config() {
                tracing::error!(error = %e, "Failed to request session config");
                self.events.broadcast(&PayloadEvent::SessionConfigFailed);
            }
        }
        delivered
    }

    /// Number of calls not yet completed.
    pub fn in_flight(&self) -> usize {
        self.payload_api.in_flight() + self.session_api.in_flight()
    }

    /// Ticks every `interval` until no call is in flight.
    pub async fn tick_until_idle(&self, interval: Duration) {
        loop {
            self.tick();
            if self.in_flight() == 0 {
                return;
            }
            tokio::time::sleep(interval).await;
        }
    }
}
