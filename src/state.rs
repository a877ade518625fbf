//! The observable state of a resource.

use crate::error::FetchError;

/// The state of the most recent fetch attempt of a consumer.
///
/// `Loading` and `Error` keep the last successfully fetched value around so a
/// view can keep showing it while a refetch is pending or after it failed.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchState<T> {
    /// No request was ever started.
    Idle,
    /// A request is in flight.
    Loading {
        /// The value of the last successful attempt, if any.
        previous_data: Option<T>,
    },
    /// The last request settled successfully.
    Success {
        /// The validated response.
        data: T,
    },
    /// The last request failed.
    Error {
        /// Why the attempt failed.
        error: FetchError,
        /// The value of the last successful attempt, if any.
        previous_data: Option<T>,
    },
}

impl<T> Default for FetchState<T> {
    fn default() -> Self {
        Self::Idle
    }
}

impl<T> FetchState<T> {
    /// Returns the freshest value available: the data of a `Success`, or the
    /// value retained by `Loading`/`Error`.
    pub const fn data(&self) -> Option<&T> {
        match self {
            Self::Success { data } => Some(data),
            Self::Loading { previous_data } | Self::Error { previous_data, .. } => {
                previous_data.as_ref()
            }
            Self::Idle => None,
        }
    }

    /// Returns the error if the last attempt failed.
    pub const fn error(&self) -> Option<&FetchError> {
        match self {
            Self::Error { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Returns `true` if no attempt has started, or the state was reset.
    pub const fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Returns `true` if an attempt is in flight.
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading { .. })
    }

    /// Returns `true` if the last attempt succeeded.
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Returns `true` if the last attempt failed.
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Returns `true` once any attempt has produced data that is still held.
    pub const fn is_fetched(&self) -> bool {
        self.data().is_some()
    }

    /// Consumes the state and returns the value it holds or retains.
    pub fn into_data(self) -> Option<T> {
        match self {
            Self::Success { data } => Some(data),
            Self::Loading { previous_data } | Self::Error { previous_data, .. } => previous_data,
            Self::Idle => None,
        }
    }
}

impl<T: Clone> FetchState<T> {
    /// The value a new `Loading` or `Error` state must carry over.
    pub(crate) fn retained(&self) -> Option<T> {
        self.data().cloned()
    }
}
