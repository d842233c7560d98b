//! Session search results as shown in a server browser.

use crate::session_manager::V0Session;
use std::ops::Deref;

/// Name of the port players connect to.
pub const GAME_PORT_NAME: &str = "GamePort";

/// Shown when a value is not available.
pub const UNKNOWN: &str = "Unknown";

/// Progress of a session search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchState {
    /// The search has not been started.
    #[default]
    NotStarted,
    /// The search is waiting for the Session Manager.
    InProgress,
    /// The search completed successfully.
    Done,
    /// The search failed.
    Failed,
}

/// A session found by a search, with its connect address resolved.
///
/// # Examples
///
/// ```
/// use ims_orchestration::session_manager::{V0Port, V0Session};
/// use ims_orchestration::session_search::Session;
///
/// let session = Session::new(V0Session {
///     address: "10.0.0.5".to_string(),
///     ports: vec![V0Port { name: "GamePort".to_string(), port: 7777 }],
///     session_status: None,
/// });
///
/// assert_eq!(session.session_address(), "10.0.0.5:7777");
/// assert_eq!(session.player_count(), "Unknown");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    inner: V0Session,
    session_address: Option<String>,
}

impl Session {
    /// Wraps a session, resolving the address of its game port.
    pub fn new(session: V0Session) -> Self {
        let session_address = session
            .ports
            .iter()
            .find(|port| port.name == GAME_PORT_NAME)
            .map(|port| format!("{}:{}", session.address, port.port));

        Self {
            inner: session,
            session_address,
        }
    }

    /// `address:port` of the game port, or `"Unknown"` if the session exposes
    /// none.
    pub fn session_address(&self) -> &str {
        self.session_address.as_deref().unwrap_or(UNKNOWN)
    }

    /// Returns `true` if the session exposes a game port.
    pub fn is_joinable(&self) -> bool {
        self.session_address.is_some()
    }

    /// `"Current/Max"` players, or `"Unknown"` unless both counts are published.
    pub fn player_count(&self) -> String {
        let status = self.inner.session_status.as_ref();
        match status.and_then(|s| Some((s.get("CurrentNumPlayers")?, s.get("MaxNumPlayers")?))) {
            Some((current, max)) => format!("{}/{}", current, max),
            None => UNKNOWN.to_string(),
        }
    }

    /// A value from the published session status, or `"Unknown"`.
    pub fn from_session_status(&self, key: &str) -> &str {
        self.inner
            .session_status
            .as_ref()
            .and_then(|status| status.get(key))
            .map_or(UNKNOWN, String::as_str)
    }

    /// The published game phase.
    pub fn game_phase(&self) -> &str {
        self.from_session_status("GamePhase")
    }

    /// The published map name.
    pub fn map_name(&self) -> &str {
        self.from_session_status("MapName")
    }

    /// The underlying session.
    pub fn into_inner(self) -> V0Session {
        self.inner
    }
}

impl Deref for Session {
    type Target = V0Session;

    fn deref(&self) -> &V0Session {
        &self.inner
    }
}

impl From<V0Session> for Session {
    fn from(session: V0Session) -> Self {
        Self::new(session)
    }
}

/// Default cap on results kept by a search.
pub const DEFAULT_MAX_SEARCH_RESULTS: usize = 8;

/// The state and results of the latest session search.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSearch {
    /// Results beyond this many are dropped.
    pub max_search_results: usize,
    /// Sessions found, in the order the Session Manager listed them.
    pub search_results: Vec<Session>,
    /// Progress of the search.
    pub search_state: SearchState,
}

impl Default for SessionSearch {
    fn default() -> Self {
        Self {
            max_search_results: DEFAULT_MAX_SEARCH_RESULTS,
            search_results: Vec::new(),
            search_state: SearchState::NotStarted,
        }
    }
}

impl SessionSearch {
    /// Creates an empty search that has not started.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the search as waiting for results.
    pub fn start(&mut self) {
        self.search_state = SearchState::InProgress;
    }

    /// Replaces the results with the first `max_search_results` sessions and
    /// marks the search done.
    pub fn complete(&mut self, sessions: impl IntoIterator<Item = V0Session>) {
        self.search_results = sessions
            .into_iter()
            .take(self.max_search_results)
            .map(Session::new)
            .collect();
        self.search_state = SearchState::Done;
    }

    /// Marks the search failed. Earlier results are kept.
    pub fn fail(&mut self) {
        self.search_state = SearchState::Failed;
    }
}
