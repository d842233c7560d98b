//! Host-side glue driving the API clients.
//!
//! A game client uses a [`SessionBrowser`] to host, find and join sessions
//! through the Session Manager. A game server running on zeuz uses a
//! [`PayloadMonitor`] to mark its payload ready and follow the payload's state.
//! Both report progress as events and are advanced by calling `tick` from the
//! host's update loop.

mod payload_monitor;
mod session_browser;

pub use payload_monitor::{PayloadEvent, PayloadEventKind, PayloadMonitor};
pub use session_browser::{SessionBrowser, SessionEvent, SessionEventKind};

use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
