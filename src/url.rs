//! Path template compilation.
//!
//! A template is a URL or path containing `:name` placeholders, e.g.
//! `https://api.example.com/users/:user_id/todos/:id`. Compiling substitutes
//! each placeholder with the matching entry of a [`PathParams`] map.
//!
//! Placeholder names start with a letter or an underscore, so port numbers
//! (`http://localhost:8080/...`) are never treated as placeholders.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use thiserror::Error;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":([A-Za-z_][A-Za-z0-9_]*)").expect("valid placeholder pattern"));

/// Error returned by [`compile_url_strict`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UrlError {
    #[error("Unresolved path parameter `{name}` in template `{template}`")]
    Unresolved { name: String, template: String },
}

/// A single path parameter value.
///
/// Floats compare by bit pattern, so a `NaN` parameter equals itself.
#[derive(Debug, Clone)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Float(f64),
}

impl PartialEq for ParamValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

impl Eq for ParamValue {}

impl ParamValue {
    /// An empty string is treated as "not provided".
    fn is_blank(&self) -> bool {
        matches!(self, Self::Str(s) if s.is_empty())
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

macro_rules! impl_from_int {
    ($($ty:ty),*) => {
        $(impl From<$ty> for ParamValue {
            fn from(value: $ty) -> Self {
                Self::Int(i64::from(value))
            }
        })*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// Named parameters substituted into a path template.
///
/// Ordered so that two maps with the same entries compare equal, which is
/// what consumers use to decide whether their parameters changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(BTreeMap<String, ParamValue>);

impl PathParams {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter, builder style.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(name.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for PathParams
where
    K: Into<String>,
    V: Into<ParamValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

fn resolve<'a>(params: &'a PathParams, name: &str) -> Option<&'a ParamValue> {
    params.get(name).filter(|value| !value.is_blank())
}

/// Substitutes `params` into `template`.
///
/// Placeholders without a matching (non-empty) parameter are left verbatim,
/// so a misspelled parameter name yields a URL that still contains `:name`.
/// Use [`compile_url_strict`] to turn that into an error instead.
///
/// # Example
///
/// ```
/// use snap_query::url::{PathParams, compile_url};
///
/// let params = PathParams::new().with("id", 1);
/// assert_eq!(compile_url("/todos/:id", &params), "/todos/1");
/// assert_eq!(compile_url("/todos/:id", &PathParams::new()), "/todos/:id");
/// ```
#[must_use]
pub fn compile_url(template: &str, params: &PathParams) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| match resolve(params, &caps[1]) {
            Some(value) => value.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Like [`compile_url`], but fails on the first unresolved placeholder.
///
/// # Errors
///
/// Returns [`UrlError::Unresolved`] naming the first placeholder that has no
/// (non-empty) parameter.
pub fn compile_url_strict(template: &str, params: &PathParams) -> Result<String, UrlError> {
    if let Some(missing) = PLACEHOLDER
        .captures_iter(template)
        .find(|caps| resolve(params, &caps[1]).is_none())
    {
        return Err(UrlError::Unresolved {
            name: missing[1].to_string(),
            template: template.to_string(),
        });
    }
    Ok(compile_url(template, params))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_substitutes_all_placeholders() {
        let params = PathParams::new().with("user", "alice").with("id", 7);
        assert_eq!(
            compile_url("https://api.test/users/:user/todos/:id", &params),
            "https://api.test/users/alice/todos/7"
        );
    }

    #[test]
    fn test_compile_keeps_unresolved_placeholder() {
        let params = PathParams::new().with("idd", 1);
        assert_eq!(compile_url("/todos/:id", &params), "/todos/:id");
    }

    #[test]
    fn test_empty_string_is_unresolved_but_zero_is_not() {
        let params = PathParams::new().with("id", "");
        assert_eq!(compile_url("/todos/:id", &params), "/todos/:id");

        let params = PathParams::new().with("id", 0);
        assert_eq!(compile_url("/todos/:id", &params), "/todos/0");
    }

    #[test]
    fn test_port_is_not_a_placeholder() {
        let params = PathParams::new().with("id", 3);
        assert_eq!(
            compile_url("http://localhost:8080/todos/:id", &params),
            "http://localhost:8080/todos/3"
        );
    }

    #[test]
    fn test_strict_reports_missing_parameter() {
        let err = compile_url_strict("/users/:user/todos/:id", &PathParams::new().with("id", 1))
            .unwrap_err();
        assert_eq!(
            err,
            UrlError::Unresolved {
                name: "user".to_string(),
                template: "/users/:user/todos/:id".to_string(),
            }
        );
        assert_eq!(
            err.to_string(),
            "Unresolved path parameter `user` in template `/users/:user/todos/:id`"
        );
    }

    #[test]
    fn test_strict_succeeds_when_resolved() {
        let params: PathParams = [("id", 5)].into_iter().collect();
        assert_eq!(
            compile_url_strict("/todos/:id", &params).as_deref(),
            Ok("/todos/5")
        );
    }

    #[test]
    fn test_nan_param_equals_itself() {
        let a = PathParams::new().with("ratio", f64::NAN);
        let b = PathParams::new().with("ratio", f64::NAN);
        assert_eq!(a, b);
        assert_ne!(ParamValue::Float(0.0), ParamValue::Int(0));
        assert_ne!(ParamValue::Float(1.5), ParamValue::Float(2.5));
    }

    #[test]
    fn test_params_equality_ignores_insertion_order() {
        let a = PathParams::new().with("a", 1).with("b", "x");
        let b = PathParams::new().with("b", "x").with("a", 1);
        assert_eq!(a, b);
    }
}
