//! Hosting, finding and joining sessions through the Session Manager.

use super::lock;
use crate::client::RequestHandle;
use crate::config::OrchestrationConfig;
use crate::events::{Event, EventBroadcaster};
use crate::session_manager::{
    CreateSessionV0Request, ListSessionsV0Request, SessionManagerV0Api,
    V0CreateSessionRequestBody, V0CreateSessionResponse,
};
use crate::session_search::{SearchState, Session, SessionSearch, GAME_PORT_NAME, UNKNOWN};
use crate::{Request, Response, Result, RetryPolicy};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Progress reported by a [`SessionBrowser`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A create-session call finished. Carries the address to connect to, or
    /// `None` if the session could not be created or exposes no game port.
    CreateSessionComplete {
        /// `address:port` of the new session.
        session_address: Option<String>,
    },
    /// A session search finished.
    FindSessionsComplete {
        /// Whether the search succeeded.
        successful: bool,
    },
    /// A join was attempted. Carries the address to travel to, or `None` if
    /// there is nothing to join.
    JoinSessionComplete {
        /// `address:port` of the joined session.
        session_address: Option<String>,
    },
}

/// Kinds of [`SessionEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEventKind {
    /// See [`SessionEvent::CreateSessionComplete`].
    CreateSessionComplete,
    /// See [`SessionEvent::FindSessionsComplete`].
    FindSessionsComplete,
    /// See [`SessionEvent::JoinSessionComplete`].
    JoinSessionComplete,
}

impl Event for SessionEvent {
    type Kind = SessionEventKind;

    fn kind(&self) -> SessionEventKind {
        match self {
            SessionEvent::CreateSessionComplete { .. } => SessionEventKind::CreateSessionComplete,
            SessionEvent::FindSessionsComplete { .. } => SessionEventKind::FindSessionsComplete,
            SessionEvent::JoinSessionComplete { .. } => SessionEventKind::JoinSessionComplete,
        }
    }
}

/// Hosts, finds and joins sessions through the Session Manager.
///
/// # Examples
///
/// ```no_run
/// use ims_orchestration::config::OrchestrationConfig;
/// use ims_orchestration::host::{SessionBrowser, SessionEvent, SessionEventKind};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), ims_orchestration::Error> {
/// let config = OrchestrationConfig::builder()
///     .session_manager_url("https://session-manager.example.com")
///     .project_id("my-project")
///     .session_type("match")
///     .build();
/// let mut browser = SessionBrowser::new(&config)?;
///
/// browser.events().subscribe(SessionEventKind::FindSessionsComplete, |event| {
///     println!("{:?}", event);
/// });
/// browser.find_sessions("playfab-session-ticket")?;
/// browser.tick_until_idle(Duration::from_millis(16)).await;
///
/// for session in browser.search_results() {
///     println!("{} {} {}", session.session_address(), session.map_name(), session.player_count());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SessionBrowser {
    api: SessionManagerV0Api,
    project_id: String,
    session_type: String,
    retry_policy: RetryPolicy,
    search: Arc<Mutex<SessionSearch>>,
    events: Arc<EventBroadcaster<SessionEvent>>,
}

/// The session config handed to the game server of a new session.
fn session_config_json(max_num_players: i32, bots_count: i32) -> String {
    tracing::debug!(max_num_players, bots_count, "Creating session config");
    json!({
        "MaxNumPlayers": max_num_players,
        "BotsCount": bots_count,
    })
    .to_string()
}

fn created_session_address(response: &Response<V0CreateSessionResponse>) -> Option<String> {
    if !response.status_is_ok() || response.parse_error().is_some() {
        tracing::warn!(
            status = %response.status(),
            attempts = response.attempts(),
            "Failed to create a session"
        );
        return None;
    }

    let content = &response.content;
    let (Some(address), Some(ports)) = (&content.address, &content.ports) else {
        tracing::warn!("Create-session response is missing the address or ports");
        return None;
    };

    match ports.iter().find(|port| port.name == GAME_PORT_NAME) {
        Some(port) => {
            let session_address = format!("{}:{}", address, port.port);
            tracing::info!(session_address = %session_address, "Created a session");
            Some(session_address)
        }
        None => {
            tracing::error!("Created a session but it exposes no game port");
            None
        }
    }
}

impl SessionBrowser {
    /// Creates a browser for the configured project and session type.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured Session Manager URL is invalid.
    pub fn new(config: &OrchestrationConfig) -> Result<Self> {
        let mut api = SessionManagerV0Api::new();
        match &config.session_manager_url {
            Some(url) => api.set_url(url)?,
            None => tracing::warn!("No Session Manager URL configured"),
        }
        Ok(Self::with_api(api, config))
    }

    /// Creates a browser over an existing API façade.
    pub fn with_api(api: SessionManagerV0Api, config: &OrchestrationConfig) -> Self {
        Self {
            api,
            project_id: config.project_id.clone(),
            session_type: config.session_type.clone(),
            retry_policy: config.session_retry.policy(),
            search: Arc::new(Mutex::new(SessionSearch::new())),
            events: Arc::new(EventBroadcaster::new()),
        }
    }

    /// The Session Manager façade.
    pub fn api(&self) -> &SessionManagerV0Api {
        &self.api
    }

    /// The Session Manager façade, for URL and header changes.
    pub fn api_mut(&mut self) -> &mut SessionManagerV0Api {
        &mut self.api
    }

    /// The browser's event subscriptions.
    pub fn events(&self) -> &EventBroadcaster<SessionEvent> {
        &self.events
    }

    /// Replaces the retry policy used for subsequent calls.
    pub fn set_retry_policy(&mut self, policy: RetryPolicy) {
        self.retry_policy = policy;
    }

    fn authorize(&mut self, session_ticket: &str) -> Result<()> {
        self.api
            .add_header_param("Authorization", format!("Bearer playfab/{}", session_ticket))
    }

    /// Creates a session for `max_num_players` with `bots_count` bots.
    /// [`SessionEvent::CreateSessionComplete`] reports the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the call could not be issued; no event follows.
    pub fn host_session(
        &mut self,
        max_num_players: i32,
        bots_count: i32,
        session_ticket: &str,
    ) -> Result<RequestHandle> {
        self.authorize(session_ticket)?;

        let mut request = CreateSessionV0Request::new(
            &self.project_id,
            &self.session_type,
            V0CreateSessionRequestBody {
                session_config: Some(session_config_json(max_num_players, bots_count)),
            },
        );
        request.set_should_retry(Some(self.retry_policy.clone()));

        tracing::info!(
            project_id = %self.project_id,
            session_type = %self.session_type,
            "Creating a session"
        );
        let events = self.events.clone();
        self.api.create_session_v0(&request, move |response| {
            events.broadcast(&SessionEvent::CreateSessionComplete {
                session_address: created_session_address(response),
            });
        })
    }

    /// Lists the sessions of the configured project and session type into the
    /// current search. [`SessionEvent::FindSessionsComplete`] reports the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the call could not be issued; the search state is
    /// left unchanged and no event follows.
    pub fn find_sessions(&mut self, session_ticket: &str) -> Result<RequestHandle> {
        self.authorize(session_ticket)?;

        let mut request = ListSessionsV0Request::new(&self.project_id, &self.session_type);
        request.set_should_retry(Some(self.retry_policy.clone()));

        tracing::info!(
            project_id = %self.project_id,
            session_type = %self.session_type,
            "Listing sessions"
        );
        let search = self.search.clone();
        let events = self.events.clone();
        let handle = self.api.list_sessions_v0(&request, move |response| {
            let successful = response.status_is_ok() && response.parse_error().is_none();
            {
                let mut search = lock(&search);
                if successful {
                    search.complete(response.content.sessions.iter().cloned());
                    tracing::info!(found = search.search_results.len(), "Listed sessions");
                } else {
                    search.fail();
                    tracing::warn!(status = %response.status(), "Failed to list sessions");
                }
            }
            events.broadcast(&SessionEvent::FindSessionsComplete { successful });
        })?;

        lock(&self.search).start();
        Ok(handle)
    }

    /// Progress of the current search.
    pub fn search_state(&self) -> SearchState {
        lock(&self.search).search_state
    }

    /// Sessions found by the last successful search.
    pub fn search_results(&self) -> Vec<Session> {
        lock(&self.search).search_results.clone()
    }

    /// Joins the search result at `index`, returning the address to travel to.
    /// [`SessionEvent::JoinSessionComplete`] reports the result.
    pub fn join_session(&self, index: usize) -> Option<String> {
        let address = lock(&self.search)
            .search_results
            .get(index)
            .map(|session| session.session_address().to_string());
        self.join_session_at(address.as_deref().unwrap_or(UNKNOWN))
    }

    /// Joins the session at `session_address`, returning the address to travel
    /// to. Fails for an empty or unknown address.
    pub fn join_session_at(&self, session_address: &str) -> Option<String> {
        let joined = (!session_address.is_empty() && session_address != UNKNOWN)
            .then(|| session_address.to_string());
        match &joined {
            Some(address) => tracing::info!(session_address = %address, "Joining session"),
            None => tracing::warn!("No session address to join"),
        }
        self.events.broadcast(&SessionEvent::JoinSessionComplete {
            session_address: joined.clone(),
        });
        joined
    }

    /// Delivers finished calls. Returns the number of completions invoked.
    pub fn tick(&self) -> usize {
        self.api.tick()
    }

    /// Number of calls not yet completed.
    pub fn in_flight(&self) -> usize {
        self.api.in_flight()
    }

    /// Ticks every `interval` until no call is in flight.
    pub async fn tick_until_idle(&self, interval: Duration) {
        self.api.tick_until_idle(interval).await
    }
}
