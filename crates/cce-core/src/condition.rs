//! # Condition Module
//!
//! Row-count expectations such as `count >= 1` or `count == 0`.
//!
//! Grammar: `count <op> <integer>`, whitespace-insensitive, where `<op>` is
//! one of `>=`, `>`, `<=`, `<`, `==`, `=`, `!=`. The glyphs `≥` and `≤` are
//! accepted as aliases.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Comparison operator of an expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    AtLeast,
    MoreThan,
    AtMost,
    LessThan,
    Exactly,
    NotEqual,
}

impl Comparison {
    fn symbol(&self) -> &'static str {
        match self {
            Comparison::AtLeast => ">=",
            Comparison::MoreThan => ">",
            Comparison::AtMost => "<=",
            Comparison::LessThan => "<",
            Comparison::Exactly => "==",
            Comparison::NotEqual => "!=",
        }
    }
}

/// A parsed `count <op> <n>` expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expectation {
    pub comparison: Comparison,
    pub threshold: u64,
}

/// Expectation used when a row-count policy omits one.
pub const DEFAULT_CONDITION: &str = "count >= 1";

impl Default for Expectation {
    fn default() -> Self {
        Self {
            comparison: Comparison::AtLeast,
            threshold: 1,
        }
    }
}

impl Expectation {
    #[must_use]
    pub fn new(comparison: Comparison, threshold: u64) -> Self {
        Self {
            comparison,
            threshold,
        }
    }

    /// Whether `count` satisfies this expectation.
    #[must_use]
    pub fn holds(&self, count: u64) -> bool {
        match self.comparison {
            Comparison::AtLeast => count >= self.threshold,
            Comparison::MoreThan => count > self.threshold,
            Comparison::AtMost => count <= self.threshold,
            Comparison::LessThan => count < self.threshold,
            Comparison::Exactly => count == self.threshold,
            Comparison::NotEqual => count != self.threshold,
        }
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "count {} {}", self.comparison.symbol(), self.threshold)
    }
}

/// Reasons an expectation string could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    #[error("condition '{0}' must start with 'count'")]
    MissingSubject(String),

    #[error("condition '{0}' has no comparison operator")]
    MissingOperator(String),

    #[error("condition '{0}' has an invalid threshold")]
    InvalidThreshold(String),
}

impl FromStr for Expectation {
    type Err = ConditionError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let compact: String = input
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .replace('≥', ">=")
            .replace('≤', "<=");

        let rest = compact
            .strip_prefix("count")
            .ok_or_else(|| ConditionError::MissingSubject(input.to_string()))?;

        // Two-character operators must be tried before their one-character prefixes.
        let operators = [
            (">=", Comparison::AtLeast),
            ("<=", Comparison::AtMost),
            ("==", Comparison::Exactly),
            ("!=", Comparison::NotEqual),
            (">", Comparison::MoreThan),
            ("<", Comparison::LessThan),
            ("=", Comparison::Exactly),
        ];

        let (comparison, number) = operators
            .iter()
            .find_map(|(symbol, cmp)| rest.strip_prefix(symbol).map(|n| (*cmp, n)))
            .ok_or_else(|| ConditionError::MissingOperator(input.to_string()))?;

        let threshold = number
            .parse::<u64>()
            .map_err(|_| ConditionError::InvalidThreshold(input.to_string()))?;

        Ok(Self::new(comparison, threshold))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_forms() {
        assert_eq!(
            "count >= 1".parse::<Expectation>(),
            Ok(Expectation::new(Comparison::AtLeast, 1))
        );
        assert_eq!(
            "count==0".parse::<Expectation>(),
            Ok(Expectation::new(Comparison::Exactly, 0))
        );
        assert_eq!(
            "count ≥ 3".parse::<Expectation>(),
            Ok(Expectation::new(Comparison::AtLeast, 3))
        );
        assert_eq!(
            "count < 10".parse::<Expectation>(),
            Ok(Expectation::new(Comparison::LessThan, 10))
        );
    }

    #[test]
    fn rejects_malformed_conditions() {
        assert!(matches!(
            "rows >= 1".parse::<Expectation>(),
            Err(ConditionError::MissingSubject(_))
        ));
        assert!(matches!(
            "count ~ 1".parse::<Expectation>(),
            Err(ConditionError::MissingOperator(_))
        ));
        assert!(matches!(
            "count >= many".parse::<Expectation>(),
            Err(ConditionError::InvalidThreshold(_))
        ));
    }

    #[test]
    fn holds_matches_operator() {
        let at_least_one = Expectation::default();
        assert!(at_least_one.holds(1));
        assert!(at_least_one.holds(7));
        assert!(!at_least_one.holds(0));

        let none = Expectation::new(Comparison::Exactly, 0);
        assert!(none.holds(0));
        assert!(!none.holds(2));
    }

    #[test]
    fn display_is_canonical() {
        let parsed: Result<Expectation, _> = "count>5".parse();
        assert_eq!(parsed.map(|e| e.to_string()), Ok("count > 5".to_string()));
        assert_eq!(DEFAULT_CONDITION.parse::<Expectation>(), Ok(Expectation::default()));
    }
}
