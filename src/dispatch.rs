//! Tick-driven dispatch of single HTTP attempts.
//!
//! [`HttpDispatcher::dispatch`] starts an exchange on a tokio task and returns
//! immediately. When the exchange finishes its result is queued; completions run
//! only inside [`HttpDispatcher::tick`], on the thread that ticks, and never while
//! the dispatcher's lock is held. Dropping the dispatcher aborts every exchange
//! still in flight and hands each completion a [`TransportError::Cancelled`].

use crate::error::TransportError;
use crate::transport::{Completion, HttpOutcome, HttpRequest, HttpResult, Transport};
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Identifies one dispatched attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

type Finished = (RequestId, HttpResult, Duration);

struct InFlight {
    completion: Completion,
    task: JoinHandle<()>,
}

struct DispatchState {
    finished_rx: mpsc::UnboundedReceiver<Finished>,
    in_flight: HashMap<RequestId, InFlight>,
    next_id: u64,
}

/// Runs attempts on tokio tasks and delivers their completions on `tick`.
pub(crate) struct HttpDispatcher {
    runtime: OnceLock<Handle>,
    finished_tx: mpsc::UnboundedSender<Finished>,
    state: Mutex<DispatchState>,
}

impl HttpDispatcher {
    pub(crate) fn new() -> Self {
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        Self {
            runtime: OnceLock::new(),
            finished_tx,
            state: Mutex::new(DispatchState {
                finished_rx,
                in_flight: HashMap::new(),
                next_id: 1,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DispatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The runtime captured on the first dispatch. Later dispatches (including
    /// retries issued from `tick`) reuse it.
    fn runtime(&self) -> Result<Handle> {
        if let Some(handle) = self.runtime.get() {
            return Ok(handle.clone());
        }
        let handle = Handle::try_current().map_err(|e| {
            Error::ConfigurationError(format!("HTTP dispatch requires a tokio runtime: {}", e))
        })?;
        Ok(self.runtime.get_or_init(|| handle).clone())
    }

    /// Starts one attempt. The completion receives an outcome with `attempts == 1`.
    pub(crate) fn dispatch(
        &self,
        transport: &Arc<dyn Transport>,
        request: HttpRequest,
        completion: Completion,
    ) -> Result<RequestId> {
        let runtime = self.runtime()?;

        let mut state = self.lock();
        let id = RequestId(state.next_id);
        state.next_id += 1;

        tracing::debug!(
            request = %id,
            method = %request.method,
            url = %request.url,
            "Executing HTTP request"
        );

        let exchange = transport.execute(request);
        let finished_tx = self.finished_tx.clone();
        let task = runtime.spawn(async move {
            let started = Instant::now();
            let result = exchange.await;
            // The receiver only goes away with the dispatcher, which aborts us first.
            let _ = finished_tx.send((id, result, started.elapsed()));
        });

        state.in_flight.insert(id, InFlight { completion, task });
        Ok(id)
    }

    /// Delivers every finished attempt to its completion. Returns how many ran.
    pub(crate) fn tick(&self) -> usize {
        let ready: Vec<(Completion, HttpOutcome)> = {
            let mut state = self.lock();
            let mut ready = Vec::new();
            while let Ok((id, result, latency)) = state.finished_rx.try_recv() {
                // Absent when the attempt was cancelled after it finished.
                if let Some(in_flight) = state.in_flight.remove(&id) {
                    ready.push((
                        in_flight.completion,
                        HttpOutcome {
                            result,
                            attempts: 1,
                            latency,
                        },
                    ));
                }
            }
            ready
        };

        let count = ready.len();
        for (completion, outcome) in ready {
            completion(outcome);
        }
        count
    }

    /// Aborts an attempt and drops its completion without calling it.
    /// Returns `false` if the attempt already completed.
    pub(crate) fn cancel(&self, id: RequestId) -> bool {
        match self.lock().in_flight.remove(&id) {
            Some(in_flight) => {
                in_flight.task.abort();
                true
            }
            None => false,
        }
    }

    /// Number of attempts not yet delivered.
    pub(crate) fn in_flight(&self) -> usize {
        self.lock().in_flight.len()
    }
}

impl Drop for HttpDispatcher {
    fn drop(&mut self) {
        let state = self
            .state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        let cancelled: Vec<InFlight> = state.in_flight.drain().map(|(_, f)| f).collect();
        if !cancelled.is_empty() {
            tracing::warn!(
                count = cancelled.len(),
                "Dispatcher dropped with requests in flight; cancelling"
            );
        }
        for in_flight in cancelled {
            in_flight.task.abort();
            (in_flight.completion)(HttpOutcome {
                result: Err(TransportError::Cancelled),
                attempts: 1,
                latency: Duration::ZERO,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::ScriptedTransport;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use url::Url;

    fn request() -> HttpRequest {
        HttpRequest::new(Url::parse("http://localhost/api/v0/payload").unwrap())
    }

    async fn tick_until(dispatcher: &HttpDispatcher, mut done: impl FnMut() -> bool) {
        for _ in 0..200 {
            dispatcher.tick();
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_completion_runs_on_tick_only() {
        let transport: Arc<dyn Transport> = Arc::new(ScriptedTransport::new([Ok((200, "{}"))]));
        let dispatcher = HttpDispatcher::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        dispatcher
            .dispatch(
                &transport,
                request(),
                Box::new(move |outcome| {
                    assert_eq!(outcome.attempts, 1);
                    assert!(outcome.result.is_ok());
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        // Let the task finish without ticking.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(dispatcher.in_flight(), 1);

        tick_until(&dispatcher, || calls.load(Ordering::SeqCst) == 1).await;
        assert_eq!(dispatcher.in_flight(), 0);
        dispatcher.tick();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drop_cancels_in_flight() {
        struct Never;
        impl Transport for Never {
            fn execute(&self, _request: HttpRequest) -> crate::transport::TransportFuture {
                Box::pin(std::future::pending())
            }
        }

        let transport: Arc<dyn Transport> = Arc::new(Never);
        let dispatcher = HttpDispatcher::new();
        let cancelled = Arc::new(AtomicUsize::new(0));

        let counter = cancelled.clone();
        dispatcher
            .dispatch(
                &transport,
                request(),
                Box::new(move |outcome| {
                    assert!(matches!(outcome.result, Err(TransportError::Cancelled)));
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        drop(dispatcher);
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_suppresses_completion() {
        let transport: Arc<dyn Transport> = Arc::new(ScriptedTransport::default());
        let dispatcher = HttpDispatcher::new();
        let id = dispatcher
            .dispatch(
                &transport,
                request(),
                Box::new(|_| panic!("cancelled completion must not run")),
            )
            .unwrap();

        assert!(dispatcher.cancel(id));
        assert!(!dispatcher.cancel(id));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(dispatcher.tick(), 0);
    }

    #[test]
    fn test_dispatch_outside_runtime_fails() {
        let transport: Arc<dyn Transport> = Arc::new(ScriptedTransport::default());
        let dispatcher = HttpDispatcher::new();
        let result = dispatcher.dispatch(&transport, request(), Box::new(|_| {}));
        assert!(matches!(result, Err(Error::ConfigurationError(_))));
    }
}
