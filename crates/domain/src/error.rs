//! Request validation errors.

use thiserror::Error;

/// A request was rejected before any resource was touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is absent or blank.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// A field is present but its value is not acceptable.
    #[error("Invalid value for '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// A combined booking request named no experience, lodging or transport.
    #[error("Booking request contains no experience, lodging or transport")]
    NothingToBook,
}

impl ValidationError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ValidationError::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}
