use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::actor::UserId;
use crate::domain::demande::{DemandeDetails, OperationType};
use crate::errors::LifecycleError;

/// Tunables for creation and update validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LifecyclePolicy {
    /// Days between creation and the regularization due date.
    pub due_days: i64,
    pub motive_min_chars: usize,
    pub motive_max_chars: usize,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self { due_days: 15, motive_min_chars: 10, motive_max_chars: 500 }
    }
}

impl LifecyclePolicy {
    pub(crate) fn check_amount(&self, field: &str, amount: Decimal) -> Result<(), LifecycleError> {
        if amount <= Decimal::ZERO {
            return Err(LifecycleError::validation(field, "must be greater than zero"));
        }
        Ok(())
    }

    pub(crate) fn check_motive(&self, motive: &str) -> Result<String, LifecycleError> {
        let trimmed = motive.trim();
        let length = trimmed.chars().count();
        if length < self.motive_min_chars || length > self.motive_max_chars {
            return Err(LifecycleError::validation(
                "motive",
                format!(
                    "must be between {} and {} characters (got {length})",
                    self.motive_min_chars, self.motive_max_chars
                ),
            ));
        }
        Ok(trimmed.to_string())
    }

    pub(crate) fn check_operation_type(
        &self,
        value: &str,
    ) -> Result<OperationType, LifecycleError> {
        OperationType::parse(value).ok_or_else(|| {
            LifecycleError::validation(
                "operation_type",
                format!("`{value}` is not one of transfer|debit|check|card|withdrawal|other"),
            )
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewDemande {
    pub operation_type: String,
    pub amount: Decimal,
    pub motive: String,
    #[serde(default)]
    pub details: DemandeDetails,
}

/// Fields a client may never set through `update`.
pub const PROTECTED_FIELDS: &[&str] = &[
    "id",
    "reference",
    "status",
    "risk_score",
    "priority",
    "history",
    "due_date",
    "client_id",
    "agency_id",
    "advisor_id",
    "responsible_id",
    "authorized_amount",
    "regularized",
    "regularized_at",
    "processed_at",
    "processing_comment",
    "conditions",
    "version",
    "created_at",
    "updated_at",
];

/// Draft edits. Only these four fields exist, so lifecycle state cannot be patched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DemandePatch {
    pub operation_type: Option<String>,
    pub amount: Option<Decimal>,
    pub motive: Option<String>,
    pub details: Option<DemandeDetails>,
}

impl DemandePatch {
    /// Parses an untrusted JSON patch, naming the first protected field it touches.
    pub fn from_json(value: serde_json::Value) -> Result<Self, LifecycleError> {
        let Some(object) = value.as_object() else {
            return Err(LifecycleError::validation("patch", "must be a JSON object"));
        };

        if let Some(field) = PROTECTED_FIELDS.iter().find(|field| object.contains_key(**field)) {
            return Err(LifecycleError::validation(
                *field,
                "cannot be modified through an update",
            ));
        }

        serde_json::from_value(value)
            .map_err(|error| LifecycleError::validation("patch", error.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.operation_type.is_none()
            && self.amount.is_none()
            && self.motive.is_none()
            && self.details.is_none()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionAction {
    Validate,
    Reject,
    RequestInfo,
}

impl DecisionAction {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "VALIDATE" | "VALIDER" => Some(Self::Validate),
            "REJECT" | "REJETER" | "REFUSER" => Some(Self::Reject),
            "REQUEST_INFO" | "DEMANDER_INFO" => Some(Self::RequestInfo),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecisionData {
    /// Amount granted on validation; defaults to the requested amount.
    #[serde(alias = "montantAutorise")]
    pub authorized_amount: Option<Decimal>,
    pub comment: Option<String>,
    pub conditions: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EscalationData {
    pub responsible_id: Option<UserId>,
    pub note: Option<String>,
}
