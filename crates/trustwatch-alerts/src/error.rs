use thiserror::Error;
use uuid::Uuid;

/// Errors from alert lifecycle actions at the action boundary.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AlertError {
    #[error("alert {0} not found")]
    AlertNotFound(Uuid),

    #[error("alert {0} is already resolved")]
    AlertAlreadyResolved(Uuid),
}
