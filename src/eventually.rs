//! Polling assertions for eventually-consistent state.
//!
//! The controller under test converges asynchronously, so observations are
//! made by re-running a probe on a fixed schedule until a [`Matcher`] holds
//! or the deadline passes. Every tick runs the probe from scratch.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{Error, Result};

/// Deadline and tick interval for a polling assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Maximum time to wait for the matcher to hold.
    pub timeout: Duration,
    /// Delay between probe invocations.
    pub interval: Duration,
}

impl PollSettings {
    /// Creates settings with the given timeout and interval.
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            interval: Duration::from_secs(1),
        }
    }
}

/// A condition over a probed value.
pub trait Matcher<V: ?Sized>: Send + Sync {
    /// Returns true if the value satisfies the condition.
    fn matches(&self, value: &V) -> bool;

    /// Human-readable description used in failure reports.
    fn describe(&self) -> String;
}

/// Matches text containing a fixed substring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainsSubstring(pub String);

impl ContainsSubstring {
    /// Creates a matcher for text containing `needle`.
    pub fn new(needle: impl Into<String>) -> Self {
        Self(needle.into())
    }
}

impl<V: AsRef<str> + ?Sized> Matcher<V> for ContainsSubstring {
    fn matches(&self, value: &V) -> bool {
        value.as_ref().contains(&self.0)
    }

    fn describe(&self) -> String {
        format!("contains {:?}", self.0)
    }
}

/// Holds only if every inner matcher holds on the same value.
pub struct SatisfyAll<V: ?Sized> {
    matchers: Vec<Box<dyn Matcher<V>>>,
}

impl<V: ?Sized> SatisfyAll<V> {
    /// Combines `matchers`; an empty list always matches.
    pub fn new(matchers: Vec<Box<dyn Matcher<V>>>) -> Self {
        Self { matchers }
    }
}

impl<V: AsRef<str> + ?Sized + 'static> SatisfyAll<V> {
    /// Builds an all-must-hold check from a list of substrings.
    pub fn substrings<I, S>(needles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            needles
                .into_iter()
                .map(|n| Box::new(ContainsSubstring::new(n)) as Box<dyn Matcher<V>>)
                .collect(),
        )
    }
}

impl<V: ?Sized> fmt::Debug for SatisfyAll<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SatisfyAll")
            .field("matchers", &self.matchers.len())
            .finish()
    }
}

impl<V: ?Sized> Matcher<V> for SatisfyAll<V> {
    fn matches(&self, value: &V) -> bool {
        self.matchers.iter().all(|m| m.matches(value))
    }

    fn describe(&self) -> String {
        let parts: Vec<String> = self.matchers.iter().map(|m| m.describe()).collect();
        format!("all of [{}]", parts.join(", "))
    }
}

/// Adapts a closure into a [`Matcher`].
pub struct Predicate<F> {
    description: String,
    check: F,
}

impl<F> Predicate<F> {
    /// Wraps `check`, reported as `description` on failure.
    pub fn new(description: impl Into<String>, check: F) -> Self {
        Self {
            description: description.into(),
            check,
        }
    }
}

impl<F> fmt::Debug for Predicate<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate")
            .field("description", &self.description)
            .finish()
    }
}

impl<V: ?Sized, F> Matcher<V> for Predicate<F>
where
    F: Fn(&V) -> bool + Send + Sync,
{
    fn matches(&self, value: &V) -> bool {
        (self.check)(value)
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

/// Re-runs `probe` until `matcher` holds on its result or `settings.timeout`
/// elapses.
///
/// Returns the first matching value. A probe that matches on its first call
/// returns without sleeping. On timeout the error carries the last observed
/// value, and the probe is not invoked again.
pub async fn eventually<V, P, Fut, M>(
    settings: &PollSettings,
    description: &str,
    mut probe: P,
    matcher: &M,
) -> Result<V>
where
    V: fmt::Display,
    P: FnMut() -> Fut,
    Fut: Future<Output = V>,
    M: Matcher<V> + ?Sized,
{
    let start = Instant::now();
    let deadline = start + settings.timeout;
    let mut attempts: u64 = 0;

    loop {
        let value = probe().await;
        attempts += 1;

        if matcher.matches(&value) {
            tracing::debug!(
                check = %description,
                attempts,
                elapsed = ?start.elapsed(),
                "condition met"
            );
            return Ok(value);
        }

        let now = Instant::now();
        if now >= deadline {
            tracing::warn!(check = %description, attempts, "condition not met before deadline");
            return Err(Error::Convergence {
                description: description.to_string(),
                expected: matcher.describe(),
                last_observed: value.to_string(),
                elapsed: now - start,
            });
        }

        tracing::debug!(check = %description, attempts, "condition not met yet");
        tokio::time::sleep(settings.interval.min(deadline - now)).await;
    }
}
