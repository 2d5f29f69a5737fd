use std::{error::Error as StdError, io, path::PathBuf};

use parking_lot::Mutex;
use thiserror::Error;

use crate::TypeId;

pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Returned by [`ErrorSlot::get`] while the slot is empty.
pub const DEFAULT_ERROR_MESSAGE: &str = "unknown error (if any)";

/// Caller misuse of the boundary: an address that does not name a live
/// object of the expected type. Never stored in the error slot; the C
/// surface traps on it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UsageError {
    #[error("address {address:#x} does not name a live managed object")]
    Dangling { address: usize },
    #[error("expected a handle of type `{expected}`, got `{actual}`")]
    TypeMismatch { expected: String, actual: String },
    #[error("type {id} is not registered")]
    UnknownType { id: TypeId },
    #[error(
        "handle of type `{actual}` is compatible with `{expected}` but no \
         conversion into its representation was declared"
    )]
    Representation { expected: String, actual: String },
    #[error("address {address:#x} is not a managed string")]
    NotAString { address: usize },
    #[error("null handle passed where a `{expected}` is required")]
    NullHandle { expected: String },
    #[error("null callback")]
    NullCallback,
}

/// Descriptive failures the boundary itself produces.
#[derive(Debug, Error)]
pub enum BoundaryError {
    #[error("null string pointer")]
    NullString,
    #[error("text is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    #[error("plugin directory {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("plugin path entry {} is not a directory", .0.display())]
    NotADirectory(PathBuf),
    #[error("separator must not be empty")]
    EmptySeparator,
}

/// Process-wide "last error". Written on descriptive failures, never
/// cleared by a successful call.
pub struct ErrorSlot(Mutex<Option<BoxError>>);

impl ErrorSlot {
    pub const fn new() -> Self {
        Self(Mutex::new(None))
    }

    pub fn set(&self, error: impl Into<BoxError>) {
        let error = error.into();
        log::debug!("last error := {error}");
        *self.0.lock() = Some(error);
    }

    pub fn clear(&self) {
        *self.0.lock() = None;
    }

    pub fn get(&self) -> String {
        match &*self.0.lock() {
            Some(error) => error.to_string(),
            None => DEFAULT_ERROR_MESSAGE.to_string(),
        }
    }

    pub fn is_set(&self) -> bool {
        self.0.lock().is_some()
    }

    /// Runs `op`; on failure records the error and returns `None`. The
    /// description is only reachable through [`get`](Self::get).
    pub fn lift<T, E>(&self, op: impl FnOnce() -> Result<T, E>) -> Option<T>
    where
        E: Into<BoxError>,
    {
        match op() {
            Ok(value) => Some(value),
            Err(error) => {
                self.set(error);
                None
            }
        }
    }
}

impl Default for ErrorSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_slot_reports_default_message() {
        let slot = ErrorSlot::new();
        assert_eq!(slot.get(), DEFAULT_ERROR_MESSAGE);
        slot.set("boom");
        slot.clear();
        assert_eq!(slot.get(), DEFAULT_ERROR_MESSAGE);
        assert!(!slot.is_set());
    }

    #[test]
    fn last_error_wins() {
        let slot = ErrorSlot::new();
        slot.set("first");
        slot.set(BoundaryError::NullString);
        assert_eq!(slot.get(), "null string pointer");
    }

    #[test]
    fn success_does_not_clear_the_slot() {
        let slot = ErrorSlot::new();
        let failed: Option<u8> = slot.lift(|| Err("parse error at 3"));
        assert_eq!(failed, None);
        assert_eq!(slot.get(), "parse error at 3");

        let ok = slot.lift(|| Ok::<_, BoundaryError>(5));
        assert_eq!(ok, Some(5));
        assert_eq!(slot.get(), "parse error at 3");
    }

    #[test]
    fn lift_renders_error_sources_through_display() {
        let slot = ErrorSlot::new();
        let bytes = [0xffu8, 0xfe];
        let out = slot.lift(|| {
            std::str::from_utf8(&bytes).map_err(BoundaryError::from)
        });
        assert!(out.is_none());
        assert!(
            slot.get().starts_with("text is not valid UTF-8"),
            "got {}",
            slot.get()
        );
    }

    #[test]
    fn usage_errors_name_both_types() {
        let err = UsageError::TypeMismatch {
            expected: "point3d".into(),
            actual: "point".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("point3d") && msg.contains("`point`"));
    }
}
