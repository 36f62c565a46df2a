//! Composable value validators
//!
//! A [`Validator`] checks a `serde_json::Value` against a structural contract
//! and either returns the typed value or a [`ValidationError`] locating the
//! mismatch. Validators never mutate their input and never panic on a
//! mismatch.
//!
//! ## Building blocks
//!
//! - Scalars: [`string`], [`number`], [`integer`], [`boolean`], [`literal`]
//! - Refinements: [`ValidatorExt::refine`], [`positive_number`], [`StringValidator::matches`]
//! - Containers: [`nullable`], [`array_of`], [`union`], [`object`]
//! - Records: [`RecordValidator`] asserts the `typeName` tag before checking props
//!
//! ```
//! use document_schemas::validate::{self, Validator};
//! use serde_json::json;
//!
//! let crop = validate::object()
//!     .field("x", validate::number())
//!     .field("y", validate::number());
//! let props = validate::object().field("crop", validate::nullable(crop));
//!
//! assert!(props.validate(&json!({"crop": null})).is_ok());
//! assert!(props.validate(&json!({"crop": {"x": 1}})).is_err());
//! ```

mod object;
mod scalar;

use std::sync::Arc;

use serde_json::Value;

use crate::error::ValidationError;

pub use object::{object, ObjectValidator, RecordValidator, UnknownKeys};
pub use scalar::{
    any, boolean, integer, literal, non_negative_number, number, positive_number, string,
    unit_interval, AnyValidator, BooleanValidator, IntegerValidator, LiteralValidator,
    NumberValidator, Pattern, StringValidator,
};

/// A pure structural check over a JSON value
pub trait Validator: Send + Sync {
    /// Typed result of a successful validation
    type Output;

    /// Check `value`, returning its typed form or the first mismatch
    fn validate(&self, value: &Value) -> Result<Self::Output, ValidationError>;

    /// Short description of accepted values, used in diagnostics
    fn expectation(&self) -> String;

    /// Check that the validator itself was composed sensibly.
    ///
    /// Called once at registration; a failure is a programmer error.
    fn well_formed(&self) -> Result<(), String> {
        Ok(())
    }
}

/// A validator whose output has been erased back to a JSON value
pub type DynValidator = Arc<dyn Validator<Output = Value>>;

/// Combinators available on every validator
pub trait ValidatorExt: Validator + Sized {
    /// Add a predicate the typed output must satisfy
    fn refine<P>(self, expected: impl Into<String>, predicate: P) -> Refined<Self>
    where
        P: Fn(&Self::Output) -> bool + Send + Sync + 'static,
    {
        Refined {
            inner: self,
            expected: expected.into(),
            predicate: Box::new(predicate),
        }
    }

    /// Accept `null` in addition to whatever this validator accepts
    fn nullable(self) -> Nullable<Self> {
        Nullable { inner: self }
    }

    /// Erase the output type so heterogeneous validators can be composed
    fn erased(self) -> DynValidator
    where
        Self: 'static,
        Self::Output: Into<Value>,
    {
        Arc::new(Erased(self))
    }
}

impl<V: Validator> ValidatorExt for V {}

/// Describe a value for diagnostics without dumping large payloads
pub fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => format!("boolean {}", b),
        Value::Number(n) => format!("number {}", n),
        Value::String(s) if s.chars().count() > 32 => {
            let head: String = s.chars().take(32).collect();
            format!("string {:?}...", head)
        }
        Value::String(s) => format!("string {:?}", s),
        Value::Array(items) => format!("array of {} items", items.len()),
        Value::Object(map) => format!("object with {} keys", map.len()),
    }
}

struct Erased<V>(V);

impl<V> Validator for Erased<V>
where
    V: Validator,
    V::Output: Into<Value>,
{
    type Output = Value;

    fn validate(&self, value: &Value) -> Result<Value, ValidationError> {
        self.0.validate(value).map(Into::into)
    }

    fn expectation(&self) -> String {
        self.0.expectation()
    }

    fn well_formed(&self) -> Result<(), String> {
        self.0.well_formed()
    }
}

impl Validator for Arc<dyn Validator<Output = Value>> {
    type Output = Value;

    fn validate(&self, value: &Value) -> Result<Value, ValidationError> {
        self.as_ref().validate(value)
    }

    fn expectation(&self) -> String {
        self.as_ref().expectation()
    }

    fn well_formed(&self) -> Result<(), String> {
        self.as_ref().well_formed()
    }
}

/// A validator narrowed by a predicate over its output
pub struct Refined<V: Validator> {
    inner: V,
    expected: String,
    predicate: Box<dyn Fn(&V::Output) -> bool + Send + Sync>,
}

impl<V: Validator> Validator for Refined<V> {
    type Output = V::Output;

    fn validate(&self, value: &Value) -> Result<V::Output, ValidationError> {
        let output = self.inner.validate(value)?;
        if (self.predicate)(&output) {
            Ok(output)
        } else {
            Err(ValidationError::new(self.expected.clone(), describe(value)))
        }
    }

    fn expectation(&self) -> String {
        self.expected.clone()
    }

    fn well_formed(&self) -> Result<(), String> {
        self.inner.well_formed()
    }
}

/// Accepts `null` or a value satisfying the inner validator
pub struct Nullable<V> {
    inner: V,
}

/// Accept `null` or a value satisfying `inner`
pub fn nullable<V: Validator>(inner: V) -> Nullable<V> {
    Nullable { inner }
}

impl<V: Validator> Validator for Nullable<V> {
    type Output = Option<V::Output>;

    fn validate(&self, value: &Value) -> Result<Self::Output, ValidationError> {
        if value.is_null() {
            return Ok(None);
        }
        self.inner.validate(value).map(Some).map_err(|mut err| {
            if err.path.is_root() {
                err.expected = self.expectation();
            }
            err
        })
    }

    fn expectation(&self) -> String {
        format!("null or {}", self.inner.expectation())
    }

    fn well_formed(&self) -> Result<(), String> {
        self.inner.well_formed()
    }
}

/// Applies the inner validator to every element of an array
pub struct ArrayOf<V> {
    inner: V,
}

/// Accept an array whose every element satisfies `inner`
pub fn array_of<V: Validator>(inner: V) -> ArrayOf<V> {
    ArrayOf { inner }
}

impl<V: Validator> Validator for ArrayOf<V> {
    type Output = Vec<V::Output>;

    fn validate(&self, value: &Value) -> Result<Self::Output, ValidationError> {
        let items = value
            .as_array()
            .ok_or_else(|| ValidationError::new(self.expectation(), describe(value)))?;

        items
            .iter()
            .enumerate()
            .map(|(index, item)| self.inner.validate(item).map_err(|e| e.at_index(index)))
            .collect()
    }

    fn expectation(&self) -> String {
        format!("an array of {}", self.inner.expectation())
    }

    fn well_formed(&self) -> Result<(), String> {
        self.inner.well_formed()
    }
}

/// First-match-wins choice between validators of the same output type
pub struct Union<T> {
    branches: Vec<Box<dyn Validator<Output = T>>>,
}

/// Start an empty union; add branches with [`Union::or`]
pub fn union<T>() -> Union<T> {
    Union {
        branches: Vec::new(),
    }
}

impl<T> Union<T> {
    pub fn or<V>(mut self, branch: V) -> Self
    where
        V: Validator<Output = T> + 'static,
    {
        self.branches.push(Box::new(branch));
        self
    }
}

impl<T> Validator for Union<T> {
    type Output = T;

    fn validate(&self, value: &Value) -> Result<T, ValidationError> {
        let mut failures = Vec::with_capacity(self.branches.len());
        for branch in &self.branches {
            match branch.validate(value) {
                Ok(output) => return Ok(output),
                Err(err) => failures.push(err),
            }
        }
        Err(ValidationError::new(self.expectation(), describe(value)).with_branches(failures))
    }

    fn expectation(&self) -> String {
        let options: Vec<String> = self.branches.iter().map(|b| b.expectation()).collect();
        format!("one of [{}]", options.join(" | "))
    }

    fn well_formed(&self) -> Result<(), String> {
        if self.branches.is_empty() {
            return Err("union has no branches".to_string());
        }
        self.branches.iter().try_for_each(|b| b.well_formed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nullable_accepts_null() {
        let v = nullable(string());
        assert_eq!(v.validate(&Value::Null).unwrap(), None);
        assert_eq!(v.validate(&json!("a")).unwrap(), Some("a".to_string()));

        let err = v.validate(&json!(3)).unwrap_err();
        assert_eq!(err.expected, "null or a string");
    }

    #[test]
    fn test_array_reports_index() {
        let v = array_of(number());
        assert_eq!(v.validate(&json!([1, 2.5])).unwrap(), vec![1.0, 2.5]);

        let err = v.validate(&json!([1, "two", 3])).unwrap_err();
        assert_eq!(err.path.to_string(), "$[1]");
        assert!(v.validate(&json!({"0": 1})).is_err());
    }

    #[test]
    fn test_union_first_match_and_branch_report() {
        let v = union::<Value>()
            .or(number().erased())
            .or(literal(&["auto"]).erased());

        assert_eq!(v.validate(&json!(4)).unwrap(), json!(4.0));
        assert_eq!(v.validate(&json!("auto")).unwrap(), json!("auto"));

        let err = v.validate(&json!(true)).unwrap_err();
        assert_eq!(err.branches.len(), 2);
        assert!(err.expected.starts_with("one of ["));
    }

    #[test]
    fn test_empty_union_is_malformed() {
        let v = union::<Value>();
        assert!(v.well_formed().is_err());
        assert!(v.validate(&json!(1)).is_err());
    }

    #[test]
    fn test_refine() {
        let even = integer().refine("an even integer", |n| n % 2 == 0);
        assert!(even.validate(&json!(4)).is_ok());
        let err = even.validate(&json!(3)).unwrap_err();
        assert_eq!(err.expected, "an even integer");
        assert_eq!(err.found, "number 3");
    }

    #[test]
    fn test_describe_truncates_long_strings() {
        let long = "x".repeat(100);
        let described = describe(&json!(long));
        assert!(described.ends_with("..."));
        assert!(described.len() < 60);
    }
}
