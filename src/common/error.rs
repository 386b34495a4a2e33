//! Error types for filter operations

use std::fmt;

/// Errors that can occur while constructing or mutating a filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// The allocator could not satisfy a request for backing memory
    AllocationFailure {
        /// Number of bytes that were requested
        requested_bytes: u64,
    },

    /// A Taffy-Block filter ran past its 48-level cap
    CapacityExceeded {
        /// Number of levels already in use when the insert was attempted
        levels: usize,
    },

    /// Invalid parameter provided to a filter constructor
    InvalidParameter {
        /// Parameter name
        param: String,
        /// Invalid value provided
        value: String,
        /// Constraint that was violated
        constraint: String,
    },

    /// Error during serialization
    SerializationError(String),

    /// Error during deserialization
    DeserializationError(String),

    /// Attempted to merge, union, or compare incompatible filters
    IncompatibleFilters {
        /// Reason for incompatibility
        reason: String,
    },
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterError::AllocationFailure { requested_bytes } => {
                write!(f, "allocation failure requesting {} bytes", requested_bytes)
            }
            FilterError::CapacityExceeded { levels } => {
                write!(f, "capacity exceeded after {} levels", levels)
            }
            FilterError::InvalidParameter {
                param,
                value,
                constraint,
            } => {
                write!(
                    f,
                    "invalid parameter '{}': value '{}' {}",
                    param, value, constraint
                )
            }
            FilterError::SerializationError(msg) => write!(f, "serialization error: {}", msg),
            FilterError::DeserializationError(msg) => write!(f, "deserialization error: {}", msg),
            FilterError::IncompatibleFilters { reason } => {
                write!(f, "incompatible filters: {}", reason)
            }
        }
    }
}

impl std::error::Error for FilterError {}

/// Result type alias for filter operations
pub type Result<T> = std::result::Result<T, FilterError>;
