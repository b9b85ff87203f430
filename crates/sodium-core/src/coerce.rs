//! Conversion of extracted substrings into typed values.
//!
//! Rules are fixed per target type. Booleans never fail: they are a
//! literal test declared per property, not a generic truthiness rule.
//! Integers fail hard on a present but unparseable value.

use thiserror::Error;

/// A present value that could not be converted to the target type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot read {value:?} as {target}")]
pub struct CoercionError {
    pub value: String,
    pub target: &'static str,
}

/// Converts an extracted substring into a typed value.
pub trait Coercer {
    type Output;

    /// Name of the target type, used in error reports.
    fn target(&self) -> &'static str;

    fn coerce(&self, value: &str) -> Result<Self::Output, CoercionError>;
}

/// Base-10 integer.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegerCoercer;

impl Coercer for IntegerCoercer {
    type Output = i64;

    fn target(&self) -> &'static str {
        "integer"
    }

    fn coerce(&self, value: &str) -> Result<i64, CoercionError> {
        value.parse::<i64>().map_err(|_| CoercionError {
            value: value.to_string(),
            target: self.target(),
        })
    }
}

/// The substring itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCoercer;

impl Coercer for TextCoercer {
    type Output = String;

    fn target(&self) -> &'static str {
        "text"
    }

    fn coerce(&self, value: &str) -> Result<String, CoercionError> {
        Ok(value.to_string())
    }
}

/// How a substring maps to `true`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagRule {
    /// The whole value equals one of the literals.
    Equals(Vec<String>),
    /// The value contains the token anywhere.
    Contains(String),
}

/// Boolean by literal test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagCoercer {
    rule: FlagRule,
}

impl FlagCoercer {
    /// `true` only when the value is exactly `literal`.
    pub fn equals(literal: impl Into<String>) -> Self {
        Self {
            rule: FlagRule::Equals(vec![literal.into()]),
        }
    }

    /// `true` when the value is exactly one of `literals`.
    pub fn equals_any<I, S>(literals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rule: FlagRule::Equals(literals.into_iter().map(Into::into).collect()),
        }
    }

    /// `true` when the value contains `token`.
    pub fn contains(token: impl Into<String>) -> Self {
        Self {
            rule: FlagRule::Contains(token.into()),
        }
    }

    pub fn rule(&self) -> &FlagRule {
        &self.rule
    }
}

impl Coercer for FlagCoercer {
    type Output = bool;

    fn target(&self) -> &'static str {
        "boolean"
    }

    fn coerce(&self, value: &str) -> Result<bool, CoercionError> {
        Ok(match &self.rule {
            FlagRule::Equals(literals) => literals.iter().any(|l| l == value),
            FlagRule::Contains(token) => value.contains(token.as_str()),
        })
    }
}
