//! Store error types.

use thiserror::Error;

/// Store error type.
///
/// Lookups that find nothing are not errors: they return `None`, `false`
/// or an empty collection. Only configuration mistakes end up here.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EcsError {
    /// Every signature bit is already claimed by a registered component.
    #[error("component overflow: at most {limit} components can be registered")]
    ComponentOverflow {
        /// Maximum number of components a manager can hold.
        limit: u32,
    },
}

/// Result type for store operations.
pub type EcsResult<T> = Result<T, EcsError>;
