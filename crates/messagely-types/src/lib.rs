//! Types shared between the storage-facing services and the HTTP layer.

pub mod api;
pub mod models;

use thiserror::Error;

/// Rejected client input. The message is safe to show to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("username must be between {min} and {max} characters")]
    UsernameLength { min: usize, max: usize },
    #[error("username may only contain letters, digits, '_', '.' and '-'")]
    UsernameCharset,
    #[error("password must be at least {min} characters")]
    PasswordTooShort { min: usize },
    #[error("{field} is required")]
    Missing { field: &'static str },
}
