//! Response validation.
//!
//! A [`Validator`] turns a raw JSON body into a typed value or rejects it.
//! Rejection makes the attempt fail with
//! [`FetchError::Validation`](crate::error::FetchError::Validation) even
//! though the transport succeeded.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use validator::Validate;

use crate::error::ValidationError;

/// Parses a raw response body into `T`.
pub trait Validator<T>: Send + Sync {
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if `raw` does not describe a valid `T`.
    fn parse(&self, raw: Value) -> Result<T, ValidationError>;
}

impl<T, F> Validator<T> for F
where
    F: Fn(Value) -> Result<T, ValidationError> + Send + Sync,
{
    fn parse(&self, raw: Value) -> Result<T, ValidationError> {
        self(raw)
    }
}

/// Shared, type-erased validator.
pub type ValidatorRef<T> = Arc<dyn Validator<T>>;

/// Accepts any body that deserializes into `T`.
pub struct SerdeValidator<T> {
    _phantom: PhantomData<fn() -> T>,
}

impl<T> SerdeValidator<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T> Default for SerdeValidator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for SerdeValidator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerdeValidator")
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T: DeserializeOwned> Validator<T> for SerdeValidator<T> {
    fn parse(&self, raw: Value) -> Result<T, ValidationError> {
        Ok(serde_json::from_value(raw)?)
    }
}

/// Deserializes into `T`, then checks its `#[validate(...)]` rules.
///
/// ```
/// use serde::Deserialize;
/// use serde_json::json;
/// use snap_query::validate::{ValidateSchema, Validator};
/// use validator::Validate;
///
/// #[derive(Deserialize, Validate)]
/// struct Todo {
///     #[validate(length(min = 1))]
///     title: String,
/// }
///
/// let schema = ValidateSchema::<Todo>::new();
/// assert!(schema.parse(json!({ "title": "a" })).is_ok());
/// assert!(schema.parse(json!({ "title": "" })).is_err());
/// ```
pub struct ValidateSchema<T> {
    _phantom: PhantomData<fn() -> T>,
}

impl<T> ValidateSchema<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T> Default for ValidateSchema<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ValidateSchema<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidateSchema")
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T: DeserializeOwned + Validate> Validator<T> for ValidateSchema<T> {
    fn parse(&self, raw: Value) -> Result<T, ValidationError> {
        let value: T = serde_json::from_value(raw)?;
        value.validate()?;
        Ok(value)
    }
}

/// Picks the validator for an attempt: the per-invocation one, then the
/// factory default, then plain deserialization.
pub(crate) fn select<T: DeserializeOwned + 'static>(
    invocation: Option<&ValidatorRef<T>>,
    default: Option<&ValidatorRef<T>>,
) -> ValidatorRef<T> {
    invocation
        .or(default)
        .cloned()
        .unwrap_or_else(|| Arc::new(SerdeValidator::<T>::new()))
}
