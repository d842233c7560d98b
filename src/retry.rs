//! Retry policies and backoff schedules.
//!
//! A [`RetryPolicy`] is attached to an individual request and says *whether* a
//! failed attempt may be re-issued: which status codes and verbs qualify, how many
//! retries are allowed, how long since the first attempt the request may keep
//! trying, and which fallback domains to rotate through when the primary one is
//! unreachable.
//!
//! A [`Backoff`] belongs to the [`RetryManager`](crate::RetryManager) and says
//! *when* the next attempt is issued.

use http::Method;
use rand::Rng;
use std::collections::HashSet;
use std::time::Duration;

/// Retry count used when neither the policy nor the manager sets one.
pub const DEFAULT_RETRY_LIMIT_COUNT: u32 = 6;

/// Relative timeout used when neither the policy nor the manager sets one.
pub const DEFAULT_RETRY_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-request retry eligibility.
///
/// Unset overrides fall back to the defaults of the manager that tracks the
/// request. An empty verb set means "no verb restriction" for response-code
/// failures, and "connection failures for any verb, other transport failures
/// for `GET`/`HEAD` only" for failures without a response.
///
/// # Examples
///
/// ```
/// use ims_orchestration::RetryPolicy;
/// use http::Method;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::builder()
///     .retry_limit_count(3)
///     .retry_timeout(Duration::from_secs(10))
///     .retry_response_codes([500, 503])
///     .retry_verbs([Method::GET])
///     .retry_domains(["fallback-a.example.com", "fallback-b.example.com:8443"])
///     .build();
///
/// assert!(policy.retries_response_code(503));
/// assert!(!policy.retries_response_code(404));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryPolicy {
    retry_limit_count: Option<u32>,
    retry_timeout: Option<Duration>,
    retry_response_codes: HashSet<u16>,
    retry_verbs: HashSet<Method>,
    retry_domains: Vec<String>,
}

impl RetryPolicy {
    /// A policy overriding only the retry count and relative timeout.
    pub fn new(retry_limit_count: u32, retry_timeout: Duration) -> Self {
        Self {
            retry_limit_count: Some(retry_limit_count),
            retry_timeout: Some(retry_timeout),
            ..Self::default()
        }
    }

    /// Creates a builder.
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::default()
    }

    /// The retry count override, if any.
    pub fn retry_limit_count(&self) -> Option<u32> {
        self.retry_limit_count
    }

    /// The relative timeout override, if any.
    pub fn retry_timeout(&self) -> Option<Duration> {
        self.retry_timeout
    }

    /// Status codes that make a completed attempt retryable.
    pub fn retry_response_codes(&self) -> &HashSet<u16> {
        &self.retry_response_codes
    }

    /// Verbs eligible for retry. Empty means the defaults described on the type.
    pub fn retry_verbs(&self) -> &HashSet<Method> {
        &self.retry_verbs
    }

    /// Fallback domains, in rotation order.
    pub fn retry_domains(&self) -> &[String] {
        &self.retry_domains
    }

    /// Returns `true` if a response with this status code may be retried.
    pub fn retries_response_code(&self, code: u16) -> bool {
        self.retry_response_codes.contains(&code)
    }

    /// Returns `true` if the verb is listed, or no verbs are listed.
    pub fn allows_verb(&self, method: &Method) -> bool {
        self.retry_verbs.is_empty() || self.retry_verbs.contains(method)
    }

    /// Resolves the overrides against manager defaults.
    pub(crate) fn resolve(&self, defaults: &RetryDefaults) -> ResolvedPolicy {
        ResolvedPolicy {
            retry_limit_count: self
                .retry_limit_count
                .unwrap_or(defaults.retry_limit_count),
            retry_timeout: self.retry_timeout.or(defaults.retry_timeout),
            policy: self.clone(),
        }
    }
}

/// A policy with its limits fixed at registration time.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedPolicy {
    pub(crate) retry_limit_count: u32,
    pub(crate) retry_timeout: Option<Duration>,
    pub(crate) policy: RetryPolicy,
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Default)]
pub struct RetryPolicyBuilder {
    policy: RetryPolicy,
}

impl RetryPolicyBuilder {
    /// Maximum number of retries after the first attempt.
    pub fn retry_limit_count(mut self, count: u32) -> Self {
        self.policy.retry_limit_count = Some(count);
        self
    }

    /// Maximum time since the first attempt during which retries may happen.
    pub fn retry_timeout(mut self, timeout: Duration) -> Self {
        self.policy.retry_timeout = Some(timeout);
        self
    }

    /// Status codes that make a completed attempt retryable.
    pub fn retry_response_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.policy.retry_response_codes.extend(codes);
        self
    }

    /// Verbs eligible for retry.
    pub fn retry_verbs(mut self, verbs: impl IntoIterator<Item = Method>) -> Self {
        self.policy.retry_verbs.extend(verbs);
        self
    }

    /// Fallback domains (`host` or `host:port`) tried in order when an attempt
    /// fails at the transport level.
    pub fn retry_domains<S: Into<String>>(mut self, domains: impl IntoIterator<Item = S>) -> Self {
        self.policy
            .retry_domains
            .extend(domains.into_iter().map(Into::into));
        self
    }

    /// Builds the policy.
    pub fn build(self) -> RetryPolicy {
        self.policy
    }
}

/// Manager-wide limits applied when a policy leaves them unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDefaults {
    /// Retries allowed after the first attempt.
    pub retry_limit_count: u32,
    /// Relative timeout since the first attempt; `None` never times out.
    pub retry_timeout: Option<Duration>,
}

impl Default for RetryDefaults {
    fn default() -> Self {
        Self {
            retry_limit_count: DEFAULT_RETRY_LIMIT_COUNT,
            retry_timeout: Some(DEFAULT_RETRY_TIMEOUT),
        }
    }
}

/// Defines how long a request waits before its next attempt.
///
/// # Examples
///
/// ```
/// use ims_orchestration::Backoff;
/// use std::time::Duration;
///
/// // Exponential backoff: 100ms, 200ms, 400ms, 800ms...
/// let exponential = Backoff::ExponentialBackoff {
///     initial_delay: Duration::from_millis(100),
///     max_delay: Duration::from_secs(30),
///     jitter: false,
/// };
/// assert_eq!(exponential.delay_for_retry(3), Duration::from_millis(400));
///
/// // Fixed delay: 1s, 1s, 1s...
/// let linear = Backoff::Linear { delay: Duration::from_secs(1) };
/// assert_eq!(linear.delay_for_retry(5), Duration::from_secs(1));
/// ```
#[derive(Debug, Clone)]
pub enum Backoff {
    /// Re-issue on the next tick.
    Immediate,

    /// Wait `initial_delay * 2^(retry - 1)`, capped at `max_delay`.
    /// Optional jitter scales the delay by a random factor in `[0.5, 1.0]`.
    ExponentialBackoff {
        /// The delay before the first retry.
        initial_delay: Duration,
        /// The maximum delay between attempts.
        max_delay: Duration,
        /// Whether to add random jitter to delays.
        jitter: bool,
    },

    /// Wait a fixed delay between attempts.
    Linear {
        /// The delay between attempts.
        delay: Duration,
    },

    /// Custom schedule: takes the retry number (1-indexed) and returns the delay.
    Custom {
        /// Function computing the delay before a retry.
        delay_fn: fn(retry: u32) -> Duration,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::ExponentialBackoff {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            jitter: true,
        }
    }
}

impl Backoff {
    /// Returns the delay before the given retry (1 = first retry).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        match self {
            Backoff::Immediate => Duration::ZERO,
            Backoff::ExponentialBackoff {
                initial_delay,
                max_delay,
                jitter,
            } => {
                let multiplier = 2u32.saturating_pow(retry.saturating_sub(1));
                let delay = initial_delay.saturating_mul(multiplier).min(*max_delay);

                if *jitter {
                    let jitter_factor = rand::thread_rng().gen_range(0.5..=1.0);
                    delay.mul_f64(jitter_factor)
                } else {
                    delay
                }
            }
            Backoff::Linear { delay } => *delay,
            Backoff::Custom { delay_fn } => delay_fn(retry),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_delays() {
        let backoff = Backoff::ExponentialBackoff {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            jitter: false,
        };

        assert_eq!(backoff.delay_for_retry(1), Duration::from_millis(100));
        assert_eq!(backoff.delay_for_retry(2), Duration::from_millis(200));
        assert_eq!(backoff.delay_for_retry(3), Duration::from_millis(400));
        assert_eq!(backoff.delay_for_retry(4), Duration::from_millis(800));
        assert_eq!(backoff.delay_for_retry(5), Duration::from_secs(1));
        assert_eq!(backoff.delay_for_retry(40), Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let backoff = Backoff::ExponentialBackoff {
            initial_delay: Duration::from_millis(400),
            max_delay: Duration::from_secs(10),
            jitter: true,
        };
        for _ in 0..50 {
            let delay = backoff.delay_for_retry(1);
            assert!(delay >= Duration::from_millis(200) && delay <= Duration::from_millis(400));
        }
    }

    #[test]
    fn test_custom_and_immediate() {
        let backoff = Backoff::Custom {
            delay_fn: |retry| Duration::from_millis(retry as u64 * 10),
        };
        assert_eq!(backoff.delay_for_retry(3), Duration::from_millis(30));
        assert_eq!(Backoff::Immediate.delay_for_retry(9), Duration::ZERO);
    }

    #[test]
    fn test_resolve_prefers_overrides() {
        let defaults = RetryDefaults::default();

        let resolved = RetryPolicy::default().resolve(&defaults);
        assert_eq!(resolved.retry_limit_count, DEFAULT_RETRY_LIMIT_COUNT);
        assert_eq!(resolved.retry_timeout, Some(DEFAULT_RETRY_TIMEOUT));

        let resolved = RetryPolicy::new(10, Duration::from_secs(5)).resolve(&defaults);
        assert_eq!(resolved.retry_limit_count, 10);
        assert_eq!(resolved.retry_timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_verb_filter() {
        let open = RetryPolicy::default();
        assert!(open.allows_verb(&Method::POST));

        let get_only = RetryPolicy::builder().retry_verbs([Method::GET]).build();
        assert!(get_only.allows_verb(&Method::GET));
        assert!(!get_only.allows_verb(&Method::POST));
    }
}
