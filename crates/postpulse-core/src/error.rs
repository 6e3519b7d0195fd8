use thiserror::Error;

/// Input rejected before it reaches storage.
#[derive(Debug, Error, PartialEq)]
pub enum CoreError {
    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },

    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("invalid backfill cursor: {0}")]
    InvalidCursor(String),
}

impl CoreError {
    /// Name of the offending request field, when there is one.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            CoreError::EmptyField { field } | CoreError::OutOfRange { field, .. } => Some(field),
            CoreError::InvalidCursor(_) => None,
        }
    }
}
