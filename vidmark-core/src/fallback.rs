use std::fmt::Display;

/// Result of a best-effort step: either the real value or a substitute
/// carrying the reason the real value could not be obtained.
#[derive(Debug, Clone, PartialEq)]
pub enum Fallback<T> {
    Value(T),
    Degraded { value: T, reason: String },
}

impl<T> Fallback<T> {
    pub fn degraded(value: T, reason: impl Into<String>) -> Self {
        Fallback::Degraded {
            value,
            reason: reason.into(),
        }
    }

    /// Substitutes `default()` when `result` is an error.
    pub fn from_result<E, F>(result: Result<T, E>, default: F) -> Self
    where
        E: Display,
        F: FnOnce() -> T,
    {
        match result {
            Ok(value) => Fallback::Value(value),
            Err(err) => Fallback::degraded(default(), err.to_string()),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Fallback::Degraded { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Fallback::Value(_) => None,
            Fallback::Degraded { reason, .. } => Some(reason),
        }
    }

    pub fn value(&self) -> &T {
        match self {
            Fallback::Value(value) | Fallback::Degraded { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Fallback::Value(value) | Fallback::Degraded { value, .. } => value,
        }
    }
}
