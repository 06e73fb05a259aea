//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts via `#[from]`.

/// Top-level domain error.
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("validation error")]
    Validation(#[from] ValidationError),

    #[error("invalid address")]
    Address(#[from] AddressError),
}

/// Invariant violations detected while building domain values.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("message type must not be empty")]
    EmptyMessageType,

    #[error("protocol name must not be empty")]
    EmptyProtocol,

    #[error("missing required field `{0}`")]
    MissingField(&'static str),
}

/// Failure to parse the textual representation of an [`Address`](crate::address::Address).
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("address `{0}` has no namespace separator")]
    MissingNamespace(String),

    #[error("unknown address namespace `{0}`")]
    UnknownNamespace(String),

    #[error("address `{0}` is missing its group or id")]
    Incomplete(String),

    #[error("invalid device id in address")]
    InvalidDeviceId(#[source] uuid::Error),
}
