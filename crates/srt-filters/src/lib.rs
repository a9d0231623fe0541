mod filter;
mod predicate;

pub use filter::{Family, Filter};
pub use predicate::{JobPredicate, Predicate};

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("{family} filter needs at least one item")]
    EmptySelection { family: String },
    #[error("{family} filter in single mode takes exactly one item, got {count}")]
    SingleModeArity { family: String, count: usize },
    #[error("{family} filter item `{item}` cannot be used as an output key")]
    InvalidKey { family: String, item: String },
    #[error("{family} filter value `{item}` is not a number")]
    InvalidNumber { family: String, item: String },
    #[error("weapon category `{0}` is not in the catalog")]
    UnknownCategory(String),
    #[error("unknown comparison `{0}` (expected =, > or <)")]
    UnknownComparison(String),
    #[error("unknown combination mode `{0}` (expected single, and or or)")]
    UnknownMode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Comparison {
    #[default]
    Equal,
    GreaterThan,
    LessThan,
}

impl Comparison {
    pub fn holds<T: PartialOrd>(&self, actual: T, threshold: T) -> bool {
        match self {
            Comparison::Equal => actual == threshold,
            Comparison::GreaterThan => actual > threshold,
            Comparison::LessThan => actual < threshold,
        }
    }

    /// Prefix of comparison output keys, e.g. `greaterThan2`.
    pub fn key_prefix(&self) -> &'static str {
        match self {
            Comparison::Equal => "equal",
            Comparison::GreaterThan => "greaterThan",
            Comparison::LessThan => "lessThan",
        }
    }
}

impl FromStr for Comparison {
    type Err = FilterError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim() {
            "=" | "==" | "eq" => Ok(Comparison::Equal),
            ">" | "gt" => Ok(Comparison::GreaterThan),
            "<" | "lt" => Ok(Comparison::LessThan),
            other => Err(FilterError::UnknownComparison(other.to_string())),
        }
    }
}

/// How the items of a multi-item filter combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    #[default]
    Single,
    And,
    Or,
}

impl Mode {
    /// Appended after every item in the output key.
    pub fn suffix(&self) -> &'static str {
        match self {
            Mode::Single => "",
            Mode::And => "and",
            Mode::Or => "or",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Single => f.write_str("single"),
            Mode::And => f.write_str("and"),
            Mode::Or => f.write_str("or"),
        }
    }
}

impl FromStr for Mode {
    type Err = FilterError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "" | "single" => Ok(Mode::Single),
            "and" | "all" => Ok(Mode::And),
            "or" | "any" => Ok(Mode::Or),
            other => Err(FilterError::UnknownMode(other.to_string())),
        }
    }
}
