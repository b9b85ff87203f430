//! Strategies and property chains.

use crate::coerce::Coercer;
use crate::exec::CommandSpec;
use crate::extract::{ExtractionPattern, Narrowing};
use std::time::Duration;

/// One way of reading a property: command, narrowing, pattern.
#[derive(Debug, Clone)]
pub struct Strategy {
    command: CommandSpec,
    timeout: Option<Duration>,
    narrowing: Narrowing,
    pattern: Option<ExtractionPattern>,
}

impl Strategy {
    /// Strategy that takes the whole (trimmed) output of `command`.
    pub fn new(command: impl Into<CommandSpec>) -> Self {
        Self {
            command: command.into(),
            timeout: None,
            narrowing: Narrowing::Whole,
            pattern: None,
        }
    }

    pub fn narrow(mut self, narrowing: Narrowing) -> Self {
        self.narrowing = narrowing;
        self
    }

    pub fn pattern(mut self, pattern: ExtractionPattern) -> Self {
        self.pattern = Some(pattern);
        self
    }

    /// Override the resolver's default per-command timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn command(&self) -> &CommandSpec {
        &self.command
    }

    pub fn timeout_override(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn narrowing(&self) -> &Narrowing {
        &self.narrowing
    }

    pub fn extraction(&self) -> Option<&ExtractionPattern> {
        self.pattern.as_ref()
    }

    /// Narrow `raw` and pull out the candidate value, trimmed.
    ///
    /// `None` means no match. An empty string is a match that the resolver
    /// treats as falsy.
    pub fn extract(&self, raw: &str) -> Option<String> {
        let narrowed = self.narrowing.apply(raw);
        let value = match &self.pattern {
            Some(pattern) => pattern.extract(&narrowed)?,
            None => narrowed.as_ref(),
        };
        Some(value.trim().to_string())
    }
}

/// What happens when every strategy of a chain is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// Exhaustion raises `PropertyUnavailable`.
    Required,
    /// Exhaustion is a legitimate absence and resolves to `None`.
    Optional,
}

/// Ordered strategies for one logical property plus its coercion rule.
#[derive(Debug, Clone)]
pub struct PropertyChain<C> {
    name: String,
    strategies: Vec<Strategy>,
    coercer: C,
    presence: Presence,
    empty_sentinels: Vec<String>,
}

impl<C: Coercer> PropertyChain<C> {
    pub fn required(name: impl Into<String>, coercer: C) -> Self {
        Self::with_presence(name, coercer, Presence::Required)
    }

    pub fn optional(name: impl Into<String>, coercer: C) -> Self {
        Self::with_presence(name, coercer, Presence::Optional)
    }

    fn with_presence(name: impl Into<String>, coercer: C, presence: Presence) -> Self {
        Self {
            name: name.into(),
            strategies: Vec::new(),
            coercer,
            presence,
            empty_sentinels: Vec::new(),
        }
    }

    /// Append a lower-priority strategy.
    pub fn then(mut self, strategy: Strategy) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Treat `value` like an empty match, e.g. the `null` printed by
    /// `settings get` for an unset key.
    pub fn empty_sentinel(mut self, value: impl Into<String>) -> Self {
        self.empty_sentinels.push(value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    pub fn coercer(&self) -> &C {
        &self.coercer
    }

    pub fn presence(&self) -> Presence {
        self.presence
    }

    /// Whether an extracted value should send the chain to its next strategy.
    pub fn is_falsy(&self, value: &str) -> bool {
        value.is_empty() || self.empty_sentinels.iter().any(|s| s == value)
    }
}
