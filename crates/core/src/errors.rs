use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::domain::actor::{Role, UserId};
use crate::domain::demande::{DemandeId, DemandeStatus};
use crate::store::StoreError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("demande `{0}` not found")]
    NotFound(DemandeId),
    #[error("actor `{actor}` does not own demande `{demande}`")]
    NotOwner { actor: UserId, demande: DemandeId },
    #[error("role `{role}` is not allowed to {reason}")]
    Forbidden { role: Role, reason: String },
    #[error("invalid demande transition from {from} to {to}")]
    InvalidTransition { from: DemandeStatus, to: DemandeStatus },
    #[error("invalid `{field}`: {message}")]
    Validation { field: String, message: String },
    #[error("amount {requested} exceeds authorization limit {limit}")]
    AuthorizationLimitExceeded { limit: Decimal, requested: Decimal },
    #[error("demande `{0}` is already regularized")]
    AlreadyRegularized(DemandeId),
    #[error(transparent)]
    Unavailable(#[from] StoreError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    NotOwner,
    Forbidden,
    InvalidTransition,
    Validation,
    AuthorizationLimitExceeded,
    AlreadyRegularized,
    Unavailable,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::NotOwner => "not_owner",
            Self::Forbidden => "forbidden",
            Self::InvalidTransition => "invalid_transition",
            Self::Validation => "validation",
            Self::AuthorizationLimitExceeded => "authorization_limit_exceeded",
            Self::AlreadyRegularized => "already_regularized",
            Self::Unavailable => "unavailable",
        }
    }
}

impl LifecycleError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation { field: field.into(), message: message.into() }
    }

    pub fn forbidden(role: Role, reason: impl Into<String>) -> Self {
        Self::Forbidden { role, reason: reason.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::NotOwner { .. } => ErrorKind::NotOwner,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::AuthorizationLimitExceeded { .. } => ErrorKind::AuthorizationLimitExceeded,
            Self::AlreadyRegularized(_) => ErrorKind::AlreadyRegularized,
            Self::Unavailable(_) => ErrorKind::Unavailable,
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let message = match &self {
            // Backend details stay out of caller-facing payloads.
            Self::Unavailable(_) => "a backing service failed".to_string(),
            other => other.to_string(),
        };
        InterfaceError { kind: self.kind(), message, correlation_id: correlation_id.into() }
    }
}

/// Caller-facing shape of a [`LifecycleError`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InterfaceError {
    pub kind: ErrorKind,
    pub message: String,
    pub correlation_id: String,
}

impl InterfaceError {
    pub fn status_code(&self) -> u16 {
        match self.kind {
            ErrorKind::NotFound => 404,
            ErrorKind::NotOwner | ErrorKind::Forbidden => 403,
            ErrorKind::AuthorizationLimitExceeded => 403,
            ErrorKind::InvalidTransition | ErrorKind::AlreadyRegularized => 409,
            ErrorKind::Validation => 422,
            ErrorKind::Unavailable => 503,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self.kind {
            ErrorKind::NotFound => "The requested demande does not exist.",
            ErrorKind::NotOwner => "Only the client who created this demande can do that.",
            ErrorKind::Forbidden => "Your role does not allow this action.",
            ErrorKind::InvalidTransition => {
                "This action is not possible in the demande's current status."
            }
            ErrorKind::Validation => {
                "The request could not be processed. Check inputs and try again."
            }
            ErrorKind::AuthorizationLimitExceeded => {
                "The amount exceeds your approval limit. Escalate the demande instead."
            }
            ErrorKind::AlreadyRegularized => "This demande has already been regularized.",
            ErrorKind::Unavailable => {
                "The service is temporarily unavailable. Please retry shortly."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::domain::demande::DemandeStatus;
    use crate::errors::{ErrorKind, LifecycleError};
    use crate::store::StoreError;

    #[test]
    fn validation_error_maps_to_unprocessable_entity() {
        let interface = LifecycleError::validation("amount", "must be greater than zero")
            .into_interface("req-1");

        assert_eq!(interface.kind, ErrorKind::Validation);
        assert_eq!(interface.correlation_id, "req-1");
        assert_eq!(interface.status_code(), 422);
        assert!(interface.message.contains("amount"));
    }

    #[test]
    fn limit_error_carries_both_values() {
        let error = LifecycleError::AuthorizationLimitExceeded {
            limit: Decimal::from(1_000_000),
            requested: Decimal::from(5_000_000),
        };
        assert_eq!(error.to_string(), "amount 5000000 exceeds authorization limit 1000000");
        assert_eq!(error.into_interface("req-2").status_code(), 403);
    }

    #[test]
    fn invalid_transition_maps_to_conflict() {
        let interface = LifecycleError::InvalidTransition {
            from: DemandeStatus::Validated,
            to: DemandeStatus::Rejected,
        }
        .into_interface("req-3");

        assert_eq!(interface.status_code(), 409);
        assert_eq!(interface.message, "invalid demande transition from VALIDATED to REJECTED");
    }

    #[test]
    fn store_failures_hide_backend_detail() {
        let interface = LifecycleError::from(StoreError::Backend("database lock timeout".into()))
            .into_interface("req-4");

        assert_eq!(interface.kind, ErrorKind::Unavailable);
        assert_eq!(interface.status_code(), 503);
        assert!(!interface.message.contains("lock"));
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }
}
