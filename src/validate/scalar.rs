//! Scalar validators

use regex::Regex;
use serde_json::Value;

use super::{describe, Refined, Validator, ValidatorExt};
use crate::error::ValidationError;

/// Accepts any JSON string
#[derive(Debug, Clone, Copy, Default)]
pub struct StringValidator;

pub fn string() -> StringValidator {
    StringValidator
}

impl StringValidator {
    /// Require the string to match a regular expression.
    ///
    /// Patterns are compiled when the contract is built; an invalid pattern
    /// surfaces through [`Validator::well_formed`].
    pub fn matches(self, pattern: &str) -> Pattern {
        Pattern {
            source: pattern.to_string(),
            regex: Regex::new(pattern).map_err(|e| e.to_string()),
        }
    }

    pub fn non_empty(self) -> Refined<StringValidator> {
        self.refine("a non-empty string", |s: &String| !s.is_empty())
    }

    /// Require a fixed prefix, as used by typed record ids ("asset:...")
    pub fn prefixed(self, prefix: &str) -> Refined<StringValidator> {
        let owned = prefix.to_string();
        self.refine(format!("a string starting with {:?}", prefix), move |s: &String| {
            s.starts_with(&owned) && s.len() > owned.len()
        })
    }
}

impl Validator for StringValidator {
    type Output = String;

    fn validate(&self, value: &Value) -> Result<String, ValidationError> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ValidationError::new(self.expectation(), describe(value)))
    }

    fn expectation(&self) -> String {
        "a string".to_string()
    }
}

/// A string constrained by a regular expression
pub struct Pattern {
    source: String,
    regex: Result<Regex, String>,
}

impl Validator for Pattern {
    type Output = String;

    fn validate(&self, value: &Value) -> Result<String, ValidationError> {
        let s = string().validate(value)?;
        match &self.regex {
            Ok(regex) if regex.is_match(&s) => Ok(s),
            _ => Err(ValidationError::new(self.expectation(), describe(value))),
        }
    }

    fn expectation(&self) -> String {
        format!("a string matching /{}/", self.source)
    }

    fn well_formed(&self) -> Result<(), String> {
        self.regex
            .as_ref()
            .map(|_| ())
            .map_err(|e| format!("invalid pattern /{}/: {}", self.source, e))
    }
}

/// Accepts any finite JSON number
#[derive(Debug, Clone, Copy, Default)]
pub struct NumberValidator;

pub fn number() -> NumberValidator {
    NumberValidator
}

impl NumberValidator {
    /// Inclusive lower bound
    pub fn min(self, min: f64) -> Refined<NumberValidator> {
        self.refine(format!("a number >= {}", min), move |n| *n >= min)
    }

    /// Inclusive upper bound
    pub fn max(self, max: f64) -> Refined<NumberValidator> {
        self.refine(format!("a number <= {}", max), move |n| *n <= max)
    }
}

impl Validator for NumberValidator {
    type Output = f64;

    fn validate(&self, value: &Value) -> Result<f64, ValidationError> {
        value
            .as_f64()
            .filter(|n| n.is_finite())
            .ok_or_else(|| ValidationError::new(self.expectation(), describe(value)))
    }

    fn expectation(&self) -> String {
        "a number".to_string()
    }
}

/// A number strictly greater than zero (sizes)
pub fn positive_number() -> Refined<NumberValidator> {
    number().refine("a number > 0", |n| *n > 0.0)
}

/// A number greater than or equal to zero (timestamps, offsets)
pub fn non_negative_number() -> Refined<NumberValidator> {
    number().refine("a number >= 0", |n| *n >= 0.0)
}

/// A number in `0..=1` (opacity, normalized coordinates)
pub fn unit_interval() -> Refined<NumberValidator> {
    number().refine("a number between 0 and 1", |n| (0.0..=1.0).contains(n))
}

/// Accepts whole numbers only; `1.5` and `"1"` are rejected
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegerValidator;

pub fn integer() -> IntegerValidator {
    IntegerValidator
}

impl Validator for IntegerValidator {
    type Output = i64;

    fn validate(&self, value: &Value) -> Result<i64, ValidationError> {
        value
            .as_i64()
            .ok_or_else(|| ValidationError::new(self.expectation(), describe(value)))
    }

    fn expectation(&self) -> String {
        "an integer".to_string()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanValidator;

pub fn boolean() -> BooleanValidator {
    BooleanValidator
}

impl Validator for BooleanValidator {
    type Output = bool;

    fn validate(&self, value: &Value) -> Result<bool, ValidationError> {
        value
            .as_bool()
            .ok_or_else(|| ValidationError::new(self.expectation(), describe(value)))
    }

    fn expectation(&self) -> String {
        "a boolean".to_string()
    }
}

/// Accepts one of a fixed set of strings
#[derive(Debug, Clone)]
pub struct LiteralValidator {
    allowed: Vec<String>,
}

pub fn literal(allowed: &[&str]) -> LiteralValidator {
    LiteralValidator {
        allowed: allowed.iter().map(|s| s.to_string()).collect(),
    }
}

impl Validator for LiteralValidator {
    type Output = String;

    fn validate(&self, value: &Value) -> Result<String, ValidationError> {
        match value.as_str() {
            Some(s) if self.allowed.iter().any(|a| a == s) => Ok(s.to_string()),
            _ => Err(ValidationError::new(self.expectation(), describe(value))),
        }
    }

    fn expectation(&self) -> String {
        match self.allowed.as_slice() {
            [only] => format!("{:?}", only),
            many => format!(
                "one of {}",
                many.iter()
                    .map(|s| format!("{:?}", s))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }

    fn well_formed(&self) -> Result<(), String> {
        if self.allowed.is_empty() {
            Err("literal set is empty".to_string())
        } else {
            Ok(())
        }
    }
}

/// Accepts any value unchanged (opaque `meta` bags)
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyValidator;

pub fn any() -> AnyValidator {
    AnyValidator
}

impl Validator for AnyValidator {
    type Output = Value;

    fn validate(&self, value: &Value) -> Result<Value, ValidationError> {
        Ok(value.clone())
    }

    fn expectation(&self) -> String {
        "any value".to_string()
    }
}
