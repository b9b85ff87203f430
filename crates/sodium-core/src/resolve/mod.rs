//! Property resolution over ordered fallback chains.
//!
//! The resolver walks a [`PropertyChain`] in declared order:
//!
//! - A command failure or a non-matching output moves on to the next strategy
//! - An empty match (or an empty sentinel such as `null`) moves on as well
//! - The first non-empty match is coerced; a coercion failure stops the
//!   chain immediately, because the right command printed an unexpected format
//! - When every strategy is exhausted the chain's [`Presence`] decides
//!   between `None` and `PropertyUnavailable`
//!
//! Each strategy gets its own timeout. An optional aggregate deadline bounds
//! the whole chain: the per-command timeout is clipped to what is left, and
//! strategies that would start after the deadline are skipped.

mod chain;

pub use chain::{Presence, PropertyChain, Strategy};

use crate::coerce::Coercer;
use crate::exec::CommandExecutor;
use sodium_common::{Attempt, AttemptOutcome, Error, Result};
use std::time::{Duration, Instant};
use tracing::{debug, instrument, trace, warn};

/// Default timeout per command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Evaluates property chains against a command executor.
#[derive(Debug, Clone)]
pub struct Resolver {
    default_timeout: Option<Duration>,
    deadline: Option<Duration>,
}

impl Default for Resolver {
    fn default() -> Self {
        Self {
            default_timeout: Some(DEFAULT_COMMAND_TIMEOUT),
            deadline: None,
        }
    }
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timeout for strategies that do not set their own. `None` leaves the
    /// executor's own default in charge.
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Bound the total time spent on one chain.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Resolve a chain to its typed value.
    ///
    /// Returns `Ok(None)` only for an exhausted [`Presence::Optional`] chain.
    pub fn resolve<E, C>(&self, executor: &E, chain: &PropertyChain<C>) -> Result<Option<C::Output>>
    where
        E: CommandExecutor + ?Sized,
        C: Coercer,
    {
        match self.walk(executor, chain)? {
            Ok(value) => Ok(Some(value)),
            Err(attempts) => match chain.presence() {
                Presence::Optional => {
                    debug!(property = chain.name(), attempts = attempts.len(), "optional property absent");
                    Ok(None)
                }
                Presence::Required => Err(Error::PropertyUnavailable {
                    property: chain.name().to_string(),
                    attempts,
                }),
            },
        }
    }

    /// Resolve a chain whose value must be present.
    ///
    /// An exhausted optional chain is reported as unavailable here too, with
    /// the same attempt ledger a required chain carries.
    pub fn require<E, C>(&self, executor: &E, chain: &PropertyChain<C>) -> Result<C::Output>
    where
        E: CommandExecutor + ?Sized,
        C: Coercer,
    {
        self.walk(executor, chain)?
            .map_err(|attempts| Error::PropertyUnavailable {
                property: chain.name().to_string(),
                attempts,
            })
    }

    /// Walk the strategies in order. The inner `Err` is an exhausted chain
    /// with its attempt ledger.
    #[instrument(level = "debug", skip_all, fields(property = %chain.name()))]
    fn walk<E, C>(
        &self,
        executor: &E,
        chain: &PropertyChain<C>,
    ) -> Result<std::result::Result<C::Output, Vec<Attempt>>>
    where
        E: CommandExecutor + ?Sized,
        C: Coercer,
    {
        let start = Instant::now();
        let mut attempts = Vec::with_capacity(chain.strategies().len());
        let mut cut_by_deadline = false;

        for (index, strategy) in chain.strategies().iter().enumerate() {
            let command = strategy.command().to_string();
            let timeout = match self.clip_to_deadline(strategy.timeout_override(), start) {
                Some(timeout) => timeout,
                None => {
                    for skipped in &chain.strategies()[index..] {
                        attempts.push(Attempt::new(
                            skipped.command().to_string(),
                            AttemptOutcome::Skipped,
                        ));
                    }
                    return Err(self.deadline_exceeded(chain.name(), attempts));
                }
            };

            trace!(index, command = %command, ?timeout, "executing strategy");
            let output = match executor.execute(strategy.command(), timeout) {
                Ok(output) => output,
                Err(failure) => {
                    debug!(index, command = %command, error = %failure, "strategy command failed");
                    cut_by_deadline |= failure.is_timeout() && self.deadline_passed(start);
                    attempts.push(Attempt::new(
                        command,
                        AttemptOutcome::CommandFailed {
                            reason: failure.to_string(),
                        },
                    ));
                    continue;
                }
            };

            let Some(value) = strategy.extract(output.as_str()) else {
                debug!(index, command = %command, "strategy output did not match");
                attempts.push(Attempt::new(command, AttemptOutcome::NoMatch));
                continue;
            };

            if chain.is_falsy(&value) {
                debug!(index, command = %command, value = %value, "strategy yielded an empty value");
                attempts.push(Attempt::new(command, AttemptOutcome::Empty { value }));
                continue;
            }

            return match chain.coercer().coerce(&value) {
                Ok(resolved) => {
                    debug!(
                        index,
                        command = %command,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "property resolved"
                    );
                    Ok(Ok(resolved))
                }
                Err(e) => {
                    warn!(command = %command, value = %e.value, target = e.target, "matched value has an unexpected format");
                    Err(Error::Coercion {
                        property: chain.name().to_string(),
                        command,
                        value: e.value,
                        target: e.target.to_string(),
                    })
                }
            };
        }

        // Only a command cut short by the deadline exceeds it.
        if cut_by_deadline {
            return Err(self.deadline_exceeded(chain.name(), attempts));
        }

        Ok(Err(attempts))
    }

    fn deadline_passed(&self, start: Instant) -> bool {
        self.deadline.is_some_and(|d| start.elapsed() >= d)
    }

    /// Timeout for the next strategy, or `None` when the deadline has passed.
    fn clip_to_deadline(
        &self,
        strategy_timeout: Option<Duration>,
        start: Instant,
    ) -> Option<Option<Duration>> {
        let timeout = strategy_timeout.or(self.default_timeout);
        let Some(deadline) = self.deadline else {
            return Some(timeout);
        };
        let remaining = deadline.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            return None;
        }
        Some(Some(timeout.map_or(remaining, |t| t.min(remaining))))
    }

    fn deadline_exceeded(&self, property: &str, attempts: Vec<Attempt>) -> Error {
        let deadline_ms = self.deadline.map_or(0, |d| d.as_millis() as u64);
        warn!(property, deadline_ms, "property chain exceeded its deadline");
        Error::DeadlineExceeded {
            property: property.to_string(),
            deadline_ms,
            attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coerce::{FlagCoercer, IntegerCoercer, TextCoercer};
    use crate::exec::{CommandSpec, RawOutput};
    use crate::extract::{ExtractionPattern, Narrowing};
    use sodium_common::CommandFailure;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Executor answering from a fixed table and counting every call.
    #[derive(Default)]
    struct Scripted {
        answers: HashMap<String, std::result::Result<String, CommandFailure>>,
        calls: Mutex<Vec<String>>,
        delay: Option<Duration>,
    }

    impl Scripted {
        fn ok(mut self, command: &str, output: &str) -> Self {
            self.answers
                .insert(command.to_string(), Ok(output.to_string()));
            self
        }

        fn fail(mut self, command: &str) -> Self {
            self.answers.insert(
                command.to_string(),
                Err(CommandFailure::Unreachable {
                    message: "device offline".into(),
                }),
            );
            self
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        fn calls(&self, command: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.as_str() == command)
                .count()
        }
    }

    impl CommandExecutor for Scripted {
        fn execute(
            &self,
            command: &CommandSpec,
            timeout: Option<Duration>,
        ) -> std::result::Result<RawOutput, CommandFailure> {
            let line = command.to_shell_line();
            self.calls.lock().unwrap().push(line.clone());
            if let Some(delay) = self.delay {
                let wait = timeout.map_or(delay, |t| t.min(delay));
                std::thread::sleep(wait);
                if wait < delay {
                    return Err(CommandFailure::Timeout { timeout: wait });
                }
            }
            match self.answers.get(&line) {
                Some(Ok(text)) => Ok(RawOutput::new(text.clone())),
                Some(Err(e)) => Err(e.clone()),
                None => Err(CommandFailure::Unsupported { command: line }),
            }
        }
    }

    fn max_volume_chain() -> PropertyChain<IntegerCoercer> {
        PropertyChain::required("max_volume_level", IntegerCoercer)
            .then(
                Strategy::new("s1")
                    .pattern(ExtractionPattern::new(r"(?m)Max: (\d+)\r?$")),
            )
            .then(
                Strategy::new("s2")
                    .pattern(ExtractionPattern::new(r"(?m)Max: (\d+)\r?$")),
            )
    }

    #[test]
    fn test_fallback_after_command_failure() {
        let exec = Scripted::default().fail("s1").ok("s2", "Max: 15\n");
        let value = Resolver::new().resolve(&exec, &max_volume_chain()).unwrap();

        assert_eq!(value, Some(15));
        assert_eq!(exec.calls("s1"), 1);
        assert_eq!(exec.calls("s2"), 1);
    }

    #[test]
    fn test_fallback_after_no_match() {
        let exec = Scripted::default()
            .ok("s1", "Min: 0\n")
            .ok("s2", "Max: 15\n");
        let value = Resolver::new().resolve(&exec, &max_volume_chain()).unwrap();

        assert_eq!(value, Some(15));
        assert_eq!(exec.calls("s1"), 1);
        assert_eq!(exec.calls("s2"), 1);
    }

    #[test]
    fn test_first_success_short_circuits() {
        let exec = Scripted::default()
            .ok("s1", "Max: 7\n")
            .ok("s2", "Max: 15\n");
        let value = Resolver::new().resolve(&exec, &max_volume_chain()).unwrap();

        assert_eq!(value, Some(7));
        assert_eq!(exec.calls("s2"), 0);
    }

    #[test]
    fn test_coercion_failure_does_not_fall_through() {
        let chain = PropertyChain::required("screen_timeout", IntegerCoercer)
            .then(Strategy::new("s1").pattern(ExtractionPattern::new(r"timeout=(\S+)")))
            .then(Strategy::new("s2"));
        let exec = Scripted::default().ok("s1", "timeout=N/A\n").ok("s2", "30000");

        let err = Resolver::new().resolve(&exec, &chain).unwrap_err();
        match err {
            Error::Coercion {
                property,
                command,
                value,
                target,
            } => {
                assert_eq!(property, "screen_timeout");
                assert_eq!(command, "s1");
                assert_eq!(value, "N/A");
                assert_eq!(target, "integer");
            }
            other => panic!("expected Coercion, got {:?}", other),
        }
        assert_eq!(exec.calls("s2"), 0);
    }

    #[test]
    fn test_falsy_value_tries_next() {
        let chain = PropertyChain::required("brand", TextCoercer)
            .then(Strategy::new("getprop persist.sys.romtype"))
            .then(Strategy::new("getprop ro.product.manufacturer"));
        let exec = Scripted::default()
            .ok("getprop persist.sys.romtype", "\n")
            .ok("getprop ro.product.manufacturer", "Google\n");

        let value = Resolver::new().resolve(&exec, &chain).unwrap();
        assert_eq!(value.as_deref(), Some("Google"));
    }

    #[test]
    fn test_sentinel_is_falsy_before_coercion() {
        let chain = PropertyChain::required("screen_brightness", IntegerCoercer)
            .then(Strategy::new("settings get system screen_brightness"))
            .empty_sentinel("null");
        let exec = Scripted::default().ok("settings get system screen_brightness", "null\n");

        let err = Resolver::new().resolve(&exec, &chain).unwrap_err();
        match err {
            Error::PropertyUnavailable { attempts, .. } => {
                assert_eq!(
                    attempts[0].outcome,
                    AttemptOutcome::Empty {
                        value: "null".into()
                    }
                );
            }
            other => panic!("expected PropertyUnavailable, got {:?}", other),
        }
    }

    #[test]
    fn test_exhausted_optional_is_none() {
        let chain = PropertyChain::optional("current_ssid", TextCoercer).then(
            Strategy::new("dumpsys netstats")
                .narrow(Narrowing::lines_containing("iface=wlan"))
                .pattern(ExtractionPattern::with_group(
                    r#"(networkId|wifiNetworkKey)="(.+?)""#,
                    2,
                )),
        );
        let exec = Scripted::default().ok("dumpsys netstats", "iface=rmnet0 ident=[]\n");

        assert_eq!(Resolver::new().resolve(&exec, &chain).unwrap(), None);
    }

    #[test]
    fn test_exhausted_required_lists_every_attempt() {
        let exec = Scripted::default().fail("s1").ok("s2", "nothing");
        let err = Resolver::new()
            .resolve(&exec, &max_volume_chain())
            .unwrap_err();

        match err {
            Error::PropertyUnavailable { property, attempts } => {
                assert_eq!(property, "max_volume_level");
                assert_eq!(attempts.len(), 2);
                assert!(matches!(
                    attempts[0].outcome,
                    AttemptOutcome::CommandFailed { .. }
                ));
                assert_eq!(attempts[1].outcome, AttemptOutcome::NoMatch);
            }
            other => panic!("expected PropertyUnavailable, got {:?}", other),
        }
    }

    #[test]
    fn test_require_maps_absence_to_unavailable() {
        let chain = PropertyChain::optional("current_ssid", TextCoercer)
            .then(Strategy::new("dumpsys netstats"));
        let exec = Scripted::default().ok("dumpsys netstats", "");

        let err = Resolver::new().require(&exec, &chain).unwrap_err();
        match err {
            Error::PropertyUnavailable { property, attempts } => {
                assert_eq!(property, "current_ssid");
                assert_eq!(attempts.len(), 1);
                assert_eq!(attempts[0].command, "dumpsys netstats");
            }
            other => panic!("expected PropertyUnavailable, got {:?}", other),
        }
        assert_eq!(exec.calls("dumpsys netstats"), 1);
    }

    #[test]
    fn test_flag_chain() {
        let chain = PropertyChain::required("bluetooth_on", FlagCoercer::equals("1"))
            .then(Strategy::new("settings get global bluetooth_on"));

        let on = Scripted::default().ok("settings get global bluetooth_on", "1\n");
        assert_eq!(Resolver::new().require(&on, &chain).unwrap(), true);

        let superstring = Scripted::default().ok("settings get global bluetooth_on", "10\n");
        assert_eq!(Resolver::new().require(&superstring, &chain).unwrap(), false);
    }

    #[test]
    fn test_deadline_clips_timeout_and_skips_rest() {
        let chain = PropertyChain::required("slow", TextCoercer)
            .then(Strategy::new("a"))
            .then(Strategy::new("b"))
            .then(Strategy::new("c"));
        let exec = Scripted::default()
            .ok("a", "x")
            .ok("b", "y")
            .ok("c", "z")
            .slow(Duration::from_millis(500));
        let resolver = Resolver::new().with_deadline(Some(Duration::from_millis(50)));

        let started = Instant::now();
        let err = resolver.resolve(&exec, &chain).unwrap_err();
        assert!(started.elapsed() < Duration::from_millis(400));

        match err {
            Error::DeadlineExceeded {
                property,
                deadline_ms,
                attempts,
            } => {
                assert_eq!(property, "slow");
                assert_eq!(deadline_ms, 50);
                assert!(matches!(
                    attempts[0].outcome,
                    AttemptOutcome::CommandFailed { .. }
                ));
                assert!(attempts[1..]
                    .iter()
                    .all(|a| a.outcome == AttemptOutcome::Skipped));
            }
            other => panic!("expected DeadlineExceeded, got {:?}", other),
        }
        assert_eq!(exec.calls("a"), 1);
        assert_eq!(exec.calls("b"), 0);
    }

    #[test]
    fn test_no_deadline_waits_for_each_strategy() {
        let chain = PropertyChain::required("slow", TextCoercer)
            .then(Strategy::new("a"))
            .then(Strategy::new("b"));
        let exec = Scripted::default()
            .ok("a", "")
            .ok("b", "value")
            .slow(Duration::from_millis(20));

        let value = Resolver::new().require(&exec, &chain).unwrap();
        assert_eq!(value, "value");
        assert_eq!(exec.calls("a"), 1);
        assert_eq!(exec.calls("b"), 1);
    }

    #[test]
    fn test_strategy_timeout_overrides_default() {
        let chain = PropertyChain::required("slow", TextCoercer)
            .then(Strategy::new("a").timeout(Duration::from_millis(10)))
            .then(Strategy::new("b"));
        let exec = Scripted::default()
            .ok("a", "first")
            .ok("b", "second")
            .slow(Duration::from_millis(100));

        // "a" times out under its own 10ms budget, "b" runs under the default.
        let value = Resolver::new().require(&exec, &chain).unwrap();
        assert_eq!(value, "second");
    }
}
