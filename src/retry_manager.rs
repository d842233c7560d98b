//! Tracking and re-issuing of retryable requests.
//!
//! Every request registered through [`RetryManager::process_request`] becomes an
//! entry that moves between two states:
//!
//! - **Active**: an attempt is in flight on the manager's dispatcher.
//! - **Pending retry**: the last attempt failed in a way its [`RetryPolicy`]
//!   covers, and the entry waits for its lockout to pass.
//!
//! An entry leaves the manager when an attempt completes without qualifying for a
//! retry, when its retry count or relative timeout is used up, or when the
//! manager is dropped. In each case the completion runs exactly once, from
//! [`RetryManager::tick`] (or from `Drop`, with [`TransportError::Cancelled`]).

use crate::dispatch::{HttpDispatcher, RequestId};
use crate::error::TransportError;
use crate::retry::{Backoff, ResolvedPolicy, RetryDefaults, RetryPolicy};
use crate::retry_after::{lockout_for, DEFAULT_MAX_LOCKOUT};
use crate::transport::{Completion, HttpOutcome, HttpRequest, HttpResult, Transport};
use crate::Result;
use http::Method;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Identifies a request tracked by a [`RetryManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RetryHandle(u64);

impl std::fmt::Display for RetryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "retry-{}", self.0)
    }
}

/// What to do with a finished attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    /// The attempt does not qualify for a retry; hand it to the caller.
    Complete,
    /// The attempt qualifies and the budget allows another one.
    Retry,
    /// The attempt qualifies but the count or time budget is spent.
    Exhausted,
}

/// Decides whether a finished attempt is retried.
///
/// `retries` is the number of retries already made; `elapsed` is measured from
/// the first attempt.
pub(crate) fn evaluate(
    result: &HttpResult,
    method: &Method,
    policy: &ResolvedPolicy,
    retries: u32,
    elapsed: Duration,
) -> Verdict {
    let rules = &policy.policy;
    let eligible = match result {
        Ok(response) => {
            rules.retries_response_code(response.status.as_u16()) && rules.allows_verb(method)
        }
        Err(TransportError::Cancelled) => false,
        Err(TransportError::Connect(_)) => rules.allows_verb(method),
        Err(_) if rules.retry_verbs().is_empty() => {
            *method == Method::GET || *method == Method::HEAD
        }
        Err(_) => rules.retry_verbs().contains(method),
    };

    if !eligible {
        return Verdict::Complete;
    }
    if retries >= policy.retry_limit_count {
        return Verdict::Exhausted;
    }
    match policy.retry_timeout {
        Some(timeout) if elapsed >= timeout => Verdict::Exhausted,
        _ => Verdict::Retry,
    }
}

/// Builds the request for the next attempt. A transport failure moves the
/// request to the next fallback domain, if the policy lists any; `None` once
/// they are used up.
fn next_attempt(handle: RetryHandle, entry: &mut Entry, result: &HttpResult) -> Option<HttpRequest> {
    let domains = entry.policy.policy.retry_domains();
    if result.is_ok() || domains.is_empty() {
        return Some(entry.current.clone());
    }

    let Some(domain) = domains.get(entry.next_domain) else {
        tracing::warn!(
            handle = %handle,
            domains = domains.len(),
            "Fallback domains exhausted"
        );
        return None;
    };

    match entry.current.with_domain(domain) {
        Ok(moved) => {
            entry.next_domain += 1;
            Some(moved)
        }
        Err(e) => {
            tracing::error!(
                handle = %handle,
                domain = %domain,
                error = %e,
                "Invalid fallback domain"
            );
            None
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum EntryState {
    Active(RequestId),
    PendingRetry { ready_at: Instant },
}

struct Entry {
    transport: Arc<dyn Transport>,
    /// The request sent (or about to be sent) by the current attempt.
    current: HttpRequest,
    policy: ResolvedPolicy,
    completion: Completion,
    attempts: u32,
    first_attempt: Instant,
    next_domain: usize,
    state: EntryState,
    /// The failed result a pending retry would otherwise surface.
    last: Option<HttpResult>,
}

impl Entry {
    fn timed_out(&self, now: Instant) -> bool {
        self.policy
            .retry_timeout
            .is_some_and(|timeout| now.duration_since(self.first_attempt) >= timeout)
    }

    fn finish(self, result: HttpResult) -> (Completion, HttpOutcome) {
        let outcome = HttpOutcome {
            result,
            attempts: self.attempts,
            latency: self.first_attempt.elapsed(),
        };
        (self.completion, outcome)
    }
}

type Delivered = (RetryHandle, HttpOutcome);

struct ManagerState {
    delivered_rx: mpsc::UnboundedReceiver<Delivered>,
    entries: HashMap<RetryHandle, Entry>,
    next_handle: u64,
}

/// Re-issues failed requests according to their [`RetryPolicy`].
///
/// A manager is driven by [`tick`](RetryManager::tick), which the owner calls
/// periodically (the [`ApiClient`](crate::ApiClient) does so from its own
/// `tick`). One manager may be shared between clients through an `Arc`.
///
/// # Examples
///
/// ```
/// use ims_orchestration::{Backoff, RetryManager};
/// use std::time::Duration;
///
/// let manager = RetryManager::builder()
///     .retry_limit_count(3)
///     .retry_timeout(Duration::from_secs(20))
///     .backoff(Backoff::Linear { delay: Duration::from_millis(500) })
///     .build();
///
/// assert_eq!(manager.defaults().retry_limit_count, 3);
/// assert_eq!(manager.in_flight(), 0);
/// ```
pub struct RetryManager {
    dispatcher: HttpDispatcher,
    defaults: RetryDefaults,
    backoff: Backoff,
    max_lockout: Duration,
    delivered_tx: mpsc::UnboundedSender<Delivered>,
    state: Mutex<ManagerState>,
}

impl Default for RetryManager {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl std::fmt::Debug for RetryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryManager")
            .field("defaults", &self.defaults)
            .field("backoff", &self.backoff)
            .field("max_lockout", &self.max_lockout)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl RetryManager {
    /// Creates a manager with the default limits and backoff.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder.
    pub fn builder() -> RetryManagerBuilder {
        RetryManagerBuilder::default()
    }

    /// Limits applied to policies that leave them unset.
    pub fn defaults(&self) -> RetryDefaults {
        self.defaults
    }

    /// Number of requests not yet completed.
    pub fn in_flight(&self) -> usize {
        self.lock().entries.len()
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Dispatches the first attempt of `request` and tracks it under `policy`.
    ///
    /// The completion runs once, from a later [`tick`](Self::tick), with the final
    /// attempt's result. On error nothing was sent and the completion is dropped
    /// uncalled.
    pub fn process_request(
        &self,
        transport: Arc<dyn Transport>,
        request: HttpRequest,
        policy: &RetryPolicy,
        completion: Completion,
    ) -> Result<RetryHandle> {
        let mut state = self.lock();
        let handle = RetryHandle(state.next_handle);
        state.next_handle += 1;

        let id = self.dispatch_attempt(handle, &transport, request.clone())?;

        tracing::debug!(
            handle = %handle,
            method = %request.method,
            url = %request.url,
            "Tracking retryable request"
        );

        state.entries.insert(
            handle,
            Entry {
                transport,
                current: request,
                policy: policy.resolve(&self.defaults),
                completion,
                attempts: 1,
                first_attempt: Instant::now(),
                next_domain: 0,
                state: EntryState::Active(id),
                last: None,
            },
        );
        Ok(handle)
    }

    fn dispatch_attempt(
        &self,
        handle: RetryHandle,
        transport: &Arc<dyn Transport>,
        request: HttpRequest,
    ) -> Result<RequestId> {
        let delivered_tx = self.delivered_tx.clone();
        self.dispatcher.dispatch(
            transport,
            request,
            Box::new(move |outcome| {
                let _ = delivered_tx.send((handle, outcome));
            }),
        )
    }

    /// Advances every tracked request: consumes finished attempts, expires
    /// attempts past their timeout and re-issues retries whose lockout has passed.
    ///
    /// Returns the number of completions invoked. Completions run after the
    /// manager's internal lock is released, so they may register new requests.
    pub fn tick(&self) -> usize {
        self.dispatcher.tick();

        let finished = {
            let mut state = self.lock();
            let mut finished = Vec::new();
            while let Ok((handle, outcome)) = state.delivered_rx.try_recv() {
                self.on_attempt_finished(&mut state, handle, outcome.result, &mut finished);
            }
            let now = Instant::now();
            self.expire_active(&mut state, now, &mut finished);
            self.reissue_due(&mut state, now, &mut finished);
            finished
        };

        let count = finished.len();
        for (completion, outcome) in finished {
            completion(outcome);
        }
        count
    }

    fn on_attempt_finished(
        &self,
        state: &mut ManagerState,
        handle: RetryHandle,
        result: HttpResult,
        finished: &mut Vec<(Completion, HttpOutcome)>,
    ) {
        let Some(entry) = state.entries.get_mut(&handle) else {
            return;
        };
        let EntryState::Active(_) = entry.state else {
            return;
        };

        let retries = entry.attempts - 1;
        let verdict = evaluate(
            &result,
            &entry.current.method,
            &entry.policy,
            retries,
            entry.first_attempt.elapsed(),
        );

        let next = match verdict {
            Verdict::Complete => None,
            Verdict::Exhausted => {
                tracing::warn!(
                    handle = %handle,
                    attempts = entry.attempts,
                    "Retry budget exhausted"
                );
                None
            }
            Verdict::Retry => next_attempt(handle, entry, &result),
        };

        match next {
            Some(next) => {
                let delay = match &result {
                    Ok(response) => lockout_for(response.status, &response.headers, self.max_lockout),
                    Err(_) => None,
                }
                .unwrap_or_else(|| self.backoff.delay_for_retry(retries + 1));

                tracing::info!(
                    handle = %handle,
                    attempt = entry.attempts,
                    delay_ms = delay.as_millis(),
                    url = %next.url,
                    "Retrying request after delay"
                );
                entry.current = next;
                entry.state = EntryState::PendingRetry {
                    ready_at: Instant::now() + delay,
                };
                entry.last = Some(result);
            }
            None => {
                if let Some(entry) = state.entries.remove(&handle) {
                    finished.push(entry.finish(result));
                }
            }
        }
    }

    fn expire_active(
        &self,
        state: &mut ManagerState,
        now: Instant,
        finished: &mut Vec<(Completion, HttpOutcome)>,
    ) {
        let expired: Vec<RetryHandle> = state
            .entries
            .iter()
            .filter(|(_, entry)| matches!(entry.state, EntryState::Active(_)) && entry.timed_out(now))
            .map(|(handle, _)| *handle)
            .collect();

        for handle in expired {
            if let Some(entry) = state.entries.remove(&handle) {
                if let EntryState::Active(id) = entry.state {
                    self.dispatcher.cancel(id);
                }
                tracing::warn!(
                    handle = %handle,
                    attempts = entry.attempts,
                    "Request timed out while in flight"
                );
                finished.push(entry.finish(Err(TransportError::Timeout)));
            }
        }
    }

    fn reissue_due(
        &self,
        state: &mut ManagerState,
        now: Instant,
        finished: &mut Vec<(Completion, HttpOutcome)>,
    ) {
        let due: Vec<RetryHandle> = state
            .entries
            .iter()
            .filter(|(_, entry)| match entry.state {
                EntryState::PendingRetry { ready_at, .. } => ready_at <= now || entry.timed_out(now),
                EntryState::Active(_) => false,
            })
            .map(|(handle, _)| *handle)
            .collect();

        for handle in due {
            let Some(mut entry) = state.entries.remove(&handle) else {
                continue;
            };
            let last = entry.last.take().unwrap_or(Err(TransportError::Timeout));

            if entry.timed_out(now) {
                tracing::warn!(
                    handle = %handle,
                    attempts = entry.attempts,
                    "Retry timeout elapsed before the next attempt"
                );
                finished.push(entry.finish(last));
                continue;
            }

            match self.dispatch_attempt(handle, &entry.transport, entry.current.clone()) {
                Ok(id) => {
                    entry.attempts += 1;
                    entry.state = EntryState::Active(id);
                    state.entries.insert(handle, entry);
                }
                Err(e) => {
                    tracing::error!(handle = %handle, error = %e, "Failed to re-issue request");
                    finished.push(entry.finish(last));
                }
            }
        }
    }
}

impl Drop for RetryManager {
    fn drop(&mut self) {
        let state = self
            .state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        let entries: Vec<Entry> = state.entries.drain().map(|(_, entry)| entry).collect();
        if !entries.is_empty() {
            tracing::warn!(
                count = entries.len(),
                "Retry manager dropped with requests in flight; cancelling"
            );
        }
        for entry in entries {
            if let EntryState::Active(id) = entry.state {
                self.dispatcher.cancel(id);
            }
            let (completion, outcome) = entry.finish(Err(TransportError::Cancelled));
            completion(outcome);
        }
    }
}

/// Builder for [`RetryManager`].
#[derive(Debug, Clone)]
pub struct RetryManagerBuilder {
    defaults: RetryDefaults,
    backoff: Backoff,
    max_lockout: Duration,
}

impl Default for RetryManagerBuilder {
    fn default() -> Self {
        Self {
            defaults: RetryDefaults::default(),
            backoff: Backoff::default(),
            max_lockout: DEFAULT_MAX_LOCKOUT,
        }
    }
}

impl RetryManagerBuilder {
    /// Retries allowed when a policy sets no count.
    pub fn retry_limit_count(mut self, count: u32) -> Self {
        self.defaults.retry_limit_count = count;
        self
    }

    /// Relative timeout applied when a policy sets none.
    pub fn retry_timeout(mut self, timeout: Duration) -> Self {
        self.defaults.retry_timeout = Some(timeout);
        self
    }

    /// Lets requests without a timeout override retry indefinitely in time
    /// (still bounded by the retry count).
    pub fn no_retry_timeout(mut self) -> Self {
        self.defaults.retry_timeout = None;
        self
    }

    /// Schedule used between attempts when the server does not ask for a lockout.
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Cap on server-requested lockouts (`Retry-After`).
    pub fn max_lockout(mut self, max_lockout: Duration) -> Self {
        self.max_lockout = max_lockout;
        self
    }

    /// Builds the manager.
    pub fn build(self) -> RetryManager {
        let (delivered_tx, delivered_rx) = mpsc::unbounded_channel();
        RetryManager {
            dispatcher: HttpDispatcher::new(),
            defaults: self.defaults,
            backoff: self.backoff,
            max_lockout: self.max_lockout,
            delivered_tx,
            state: Mutex::new(ManagerState {
                delivered_rx,
                entries: HashMap::new(),
                next_handle: 1,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::ScriptedTransport;
    use crate::transport::TransportFuture;
    use http::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use url::Url;

    fn get(url: &str) -> HttpRequest {
        HttpRequest::new(Url::parse(url).unwrap())
    }

    fn post(url: &str) -> HttpRequest {
        HttpRequest {
            method: Method::POST,
            ..get(url)
        }
    }

    fn immediate() -> RetryManager {
        RetryManager::builder().backoff(Backoff::Immediate).build()
    }

    fn status(code: u16) -> HttpResult {
        Ok(crate::transport::HttpResponse {
            status: StatusCode::from_u16(code).unwrap(),
            headers: http::HeaderMap::new(),
            body: String::new(),
            url: Url::parse("http://localhost/").unwrap(),
        })
    }

    /// Collects the single outcome a completion receives.
    fn capture() -> (Arc<Mutex<Vec<HttpOutcome>>>, Completion) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, Box::new(move |outcome| sink.lock().unwrap().push(outcome)))
    }

    async fn drive(manager: &RetryManager) {
        for _ in 0..400 {
            manager.tick();
            if manager.in_flight() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("requests still in flight");
    }

    fn codes_and_get() -> RetryPolicy {
        RetryPolicy::builder()
            .retry_limit_count(2)
            .retry_response_codes([500, 503])
            .retry_verbs([Method::GET])
            .build()
    }

    #[test]
    fn test_evaluate_response_codes() {
        let policy = codes_and_get().resolve(&RetryDefaults::default());
        let early = Duration::from_millis(1);

        assert_eq!(evaluate(&status(500), &Method::GET, &policy, 0, early), Verdict::Retry);
        assert_eq!(evaluate(&status(404), &Method::GET, &policy, 0, early), Verdict::Complete);
        assert_eq!(evaluate(&status(200), &Method::GET, &policy, 0, early), Verdict::Complete);
        assert_eq!(evaluate(&status(500), &Method::POST, &policy, 0, early), Verdict::Complete);
        assert_eq!(evaluate(&status(503), &Method::GET, &policy, 2, early), Verdict::Exhausted);
    }

    #[test]
    fn test_evaluate_timeout_beats_remaining_count() {
        let policy = RetryPolicy::builder()
            .retry_limit_count(10)
            .retry_timeout(Duration::from_secs(5))
            .retry_response_codes([500])
            .build()
            .resolve(&RetryDefaults::default());

        assert_eq!(
            evaluate(&status(500), &Method::GET, &policy, 1, Duration::from_secs(6)),
            Verdict::Exhausted
        );
    }

    #[test]
    fn test_evaluate_transport_failures() {
        let open = RetryPolicy::default().resolve(&RetryDefaults::default());
        let connect = Err(TransportError::Connect("refused".to_string()));
        let reset = Err(TransportError::Request("reset".to_string()));
        let zero = Duration::ZERO;

        assert_eq!(evaluate(&connect, &Method::POST, &open, 0, zero), Verdict::Retry);
        assert_eq!(evaluate(&reset, &Method::POST, &open, 0, zero), Verdict::Complete);
        assert_eq!(evaluate(&reset, &Method::GET, &open, 0, zero), Verdict::Retry);
        assert_eq!(
            evaluate(&Err(TransportError::Timeout), &Method::HEAD, &open, 0, zero),
            Verdict::Retry
        );
        assert_eq!(
            evaluate(&Err(TransportError::Cancelled), &Method::GET, &open, 0, zero),
            Verdict::Complete
        );

        let put_only = RetryPolicy::builder()
            .retry_verbs([Method::PUT])
            .build()
            .resolve(&RetryDefaults::default());
        assert_eq!(evaluate(&reset, &Method::PUT, &put_only, 0, zero), Verdict::Retry);
        assert_eq!(evaluate(&connect, &Method::GET, &put_only, 0, zero), Verdict::Complete);
    }

    #[tokio::test]
    async fn test_retries_until_count_limit() {
        let transport = ScriptedTransport::new([
            Ok((500, "{}")),
            Ok((500, "{}")),
            Ok((500, "{}")),
            Ok((200, "{}")),
        ]);
        let manager = immediate();
        let (seen, completion) = capture();

        manager
            .process_request(
                Arc::new(transport.clone()),
                get("http://localhost/sessions"),
                &codes_and_get(),
                completion,
            )
            .unwrap();
        drive(&manager).await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].attempts, 3);
        assert_eq!(seen[0].result.as_ref().unwrap().status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let transport = ScriptedTransport::new([Ok((404, "{}"))]);
        let manager = immediate();
        let (seen, completion) = capture();

        manager
            .process_request(
                Arc::new(transport.clone()),
                get("http://localhost/sessions"),
                &codes_and_get(),
                completion,
            )
            .unwrap();
        drive(&manager).await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].attempts, 1);
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_success_after_retry() {
        let transport = ScriptedTransport::new([Ok((503, "{}")), Ok((200, r#"{"ok":true}"#))]);
        let manager = immediate();
        let (seen, completion) = capture();

        manager
            .process_request(
                Arc::new(transport),
                get("http://localhost/status"),
                &codes_and_get(),
                completion,
            )
            .unwrap();
        drive(&manager).await;

        let seen = seen.lock().unwrap();
        let response = seen[0].result.as_ref().unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, r#"{"ok":true}"#);
        assert_eq!(seen[0].attempts, 2);
    }

    #[tokio::test]
    async fn test_fallback_domains_rotate_without_wrapping() {
        let refused = || Err(TransportError::Connect("refused".to_string()));
        let transport = ScriptedTransport::new([refused(), refused(), refused(), Ok((200, "{}"))]);
        let manager = immediate();
        let (seen, completion) = capture();
        let policy = RetryPolicy::builder()
            .retry_domains(["backup-a:8081", "backup-b:8082"])
            .build();

        manager
            .process_request(
                Arc::new(transport.clone()),
                post("http://primary:8080/api/v0/payload/ready"),
                &policy,
                completion,
            )
            .unwrap();
        drive(&manager).await;

        let hosts: Vec<String> = transport
            .requests()
            .iter()
            .map(|r| format!("{}:{}", r.url.host_str().unwrap(), r.url.port().unwrap()))
            .collect();
        assert_eq!(hosts, ["primary:8080", "backup-a:8081", "backup-b:8082"]);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(matches!(seen[0].result, Err(TransportError::Connect(_))));
        assert_eq!(seen[0].attempts, 3);
    }

    #[tokio::test]
    async fn test_completion_runs_once_per_request() {
        let transport = ScriptedTransport::new([
            Ok((500, "{}")),
            Ok((200, "{}")),
            Ok((404, "{}")),
            Err(TransportError::Connect("refused".to_string())),
        ]);
        let transport: Arc<dyn Transport> = Arc::new(transport);
        let manager = immediate();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let counter = calls.clone();
            manager
                .process_request(
                    transport.clone(),
                    get("http://localhost/sessions"),
                    &codes_and_get(),
                    Box::new(move |_| {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }),
                )
                .unwrap();
        }
        drive(&manager).await;
        for _ in 0..5 {
            manager.tick();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    struct Never;

    impl Transport for Never {
        fn execute(&self, _request: HttpRequest) -> TransportFuture {
            Box::pin(std::future::pending())
        }
    }

    #[tokio::test]
    async fn test_in_flight_attempt_expires_with_timeout() {
        let manager = immediate();
        let (seen, completion) = capture();
        let policy = RetryPolicy::new(3, Duration::from_millis(20));

        manager
            .process_request(Arc::new(Never), get("http://localhost/slow"), &policy, completion)
            .unwrap();
        drive(&manager).await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].result.as_ref().unwrap_err(), &TransportError::Timeout);
    }

    #[tokio::test]
    async fn test_drop_cancels_tracked_requests() {
        let manager = immediate();
        let (seen, completion) = capture();

        manager
            .process_request(
                Arc::new(Never),
                get("http://localhost/slow"),
                &RetryPolicy::default(),
                completion,
            )
            .unwrap();
        manager.tick();
        drop(manager);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].result.as_ref().unwrap_err(), &TransportError::Cancelled);
    }

    #[test]
    fn test_process_request_outside_runtime_fails() {
        let manager = immediate();
        let result = manager.process_request(
            Arc::new(Never),
            get("http://localhost/"),
            &RetryPolicy::default(),
            Box::new(|_| panic!("must not run")),
        );
        assert!(result.is_err());
        assert_eq!(manager.in_flight(), 0);
    }
}
