use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::actor::{Actor, AgencyId, Role, UserId};
use crate::errors::LifecycleError;
use crate::risk;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DemandeId(pub String);

impl fmt::Display for DemandeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Human-readable reference, `FRC-<year>-<sequence>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceCode(pub String);

impl ReferenceCode {
    pub fn new(year: i32, sequence: u64) -> Self {
        Self(format!("FRC-{year}-{sequence:06}"))
    }
}

impl fmt::Display for ReferenceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Transfer,
    Debit,
    Check,
    Card,
    Withdrawal,
    Other,
}

impl OperationType {
    pub const ALL: [OperationType; 6] = [
        OperationType::Transfer,
        OperationType::Debit,
        OperationType::Check,
        OperationType::Card,
        OperationType::Withdrawal,
        OperationType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transfer => "transfer",
            Self::Debit => "debit",
            Self::Check => "check",
            Self::Card => "card",
            Self::Withdrawal => "withdrawal",
            Self::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "transfer" | "virement" => Some(Self::Transfer),
            "debit" | "prelevement" | "prélèvement" => Some(Self::Debit),
            "check" | "cheque" | "chèque" => Some(Self::Check),
            "card" | "carte" => Some(Self::Card),
            "withdrawal" | "retrait" => Some(Self::Withdrawal),
            "other" | "autre" => Some(Self::Other),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DemandeStatus {
    Draft,
    Submitted,
    UnderReview,
    UnderValidation,
    Validated,
    Rejected,
    Cancelled,
}

impl DemandeStatus {
    pub const ALL: [DemandeStatus; 7] = [
        DemandeStatus::Draft,
        DemandeStatus::Submitted,
        DemandeStatus::UnderReview,
        DemandeStatus::UnderValidation,
        DemandeStatus::Validated,
        DemandeStatus::Rejected,
        DemandeStatus::Cancelled,
    ];

    /// Statuses still waiting on staff.
    pub const OPEN: [DemandeStatus; 3] =
        [DemandeStatus::Submitted, DemandeStatus::UnderReview, DemandeStatus::UnderValidation];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Submitted => "SUBMITTED",
            Self::UnderReview => "UNDER_REVIEW",
            Self::UnderValidation => "UNDER_VALIDATION",
            Self::Validated => "VALIDATED",
            Self::Rejected => "REJECTED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "DRAFT" | "BROUILLON" => Some(Self::Draft),
            "SUBMITTED" | "SOUMISE" => Some(Self::Submitted),
            "UNDER_REVIEW" | "EN_COURS" => Some(Self::UnderReview),
            "UNDER_VALIDATION" | "EN_VALIDATION" => Some(Self::UnderValidation),
            "VALIDATED" | "VALIDEE" => Some(Self::Validated),
            "REJECTED" | "REFUSEE" => Some(Self::Rejected),
            "CANCELLED" | "ANNULEE" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// The transition table. Nothing else decides legality.
    pub fn can_transition_to(&self, next: DemandeStatus) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Submitted)
                | (Self::Draft, Self::Cancelled)
                | (Self::Submitted, Self::UnderReview)
                | (Self::Submitted, Self::Cancelled)
                | (Self::UnderReview, Self::UnderValidation)
                | (Self::UnderReview, Self::Rejected)
                | (Self::UnderValidation, Self::Validated)
                | (Self::UnderValidation, Self::Rejected)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Validated | Self::Rejected | Self::Cancelled)
    }
}

impl fmt::Display for DemandeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskScore {
    Faible,
    Moyen,
    Eleve,
    Critique,
}

impl RiskScore {
    pub const ALL: [RiskScore; 4] =
        [RiskScore::Faible, RiskScore::Moyen, RiskScore::Eleve, RiskScore::Critique];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Faible => "FAIBLE",
            Self::Moyen => "MOYEN",
            Self::Eleve => "ELEVE",
            Self::Critique => "CRITIQUE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "FAIBLE" | "LOW" => Some(Self::Faible),
            "MOYEN" | "MEDIUM" => Some(Self::Moyen),
            "ELEVE" | "ÉLEVÉ" | "HIGH" => Some(Self::Eleve),
            "CRITIQUE" | "CRITICAL" => Some(Self::Critique),
            _ => None,
        }
    }

    /// Every level at or above `self`.
    pub fn at_least(&self) -> Vec<RiskScore> {
        Self::ALL.into_iter().filter(|level| level >= self).collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Urgente,
    Normale,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Urgente => "URGENTE",
            Self::Normale => "NORMALE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "URGENTE" => Some(Self::Urgente),
            "NORMALE" => Some(Self::Normale),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryAction {
    Creation,
    Update,
    Submission,
    Cancellation,
    TakeOver,
    Escalation,
    Validation,
    Rejection,
    InfoRequest,
    Regularization,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creation => "CREATION",
            Self::Update => "UPDATE",
            Self::Submission => "SUBMISSION",
            Self::Cancellation => "CANCELLATION",
            Self::TakeOver => "TAKE_OVER",
            Self::Escalation => "ESCALATION",
            Self::Validation => "VALIDATION",
            Self::Rejection => "REJECTION",
            Self::InfoRequest => "INFO_REQUEST",
            Self::Regularization => "REGULARIZATION",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "CREATION" => Some(Self::Creation),
            "UPDATE" => Some(Self::Update),
            "SUBMISSION" => Some(Self::Submission),
            "CANCELLATION" => Some(Self::Cancellation),
            "TAKE_OVER" => Some(Self::TakeOver),
            "ESCALATION" => Some(Self::Escalation),
            "VALIDATION" => Some(Self::Validation),
            "REJECTION" => Some(Self::Rejection),
            "INFO_REQUEST" => Some(Self::InfoRequest),
            "REGULARIZATION" => Some(Self::Regularization),
            _ => None,
        }
    }
}

/// One audit-trail line. The history vector is append-only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub action: HistoryAction,
    pub actor_id: UserId,
    pub actor_role: Role,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

pub const MAX_DETAIL_EXTRAS: usize = 16;
pub const MAX_DETAIL_KEY_CHARS: usize = 64;
pub const MAX_DETAIL_VALUE_CHARS: usize = 512;

/// Operation details: known fields plus a bounded opaque map.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DemandeDetails {
    pub beneficiary: Option<String>,
    pub account_number: Option<String>,
    pub supporting_documents: Vec<String>,
    pub extra: BTreeMap<String, String>,
}

impl DemandeDetails {
    pub fn validate(&self) -> Result<(), LifecycleError> {
        if self.extra.len() > MAX_DETAIL_EXTRAS {
            return Err(LifecycleError::validation(
                "details.extra",
                format!("at most {MAX_DETAIL_EXTRAS} entries are allowed"),
            ));
        }

        for (key, value) in &self.extra {
            if key.trim().is_empty() || key.chars().count() > MAX_DETAIL_KEY_CHARS {
                return Err(LifecycleError::validation(
                    "details.extra",
                    format!("keys must be 1..={MAX_DETAIL_KEY_CHARS} characters"),
                ));
            }
            if value.chars().count() > MAX_DETAIL_VALUE_CHARS {
                return Err(LifecycleError::validation(
                    "details.extra",
                    format!("value for `{key}` exceeds {MAX_DETAIL_VALUE_CHARS} characters"),
                ));
            }
        }

        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Demande {
    pub id: DemandeId,
    pub reference: ReferenceCode,
    pub client_id: UserId,
    pub advisor_id: Option<UserId>,
    pub responsible_id: Option<UserId>,
    pub agency_id: AgencyId,
    pub operation_type: OperationType,
    pub amount: Decimal,
    pub authorized_amount: Option<Decimal>,
    pub motive: String,
    pub details: DemandeDetails,
    pub status: DemandeStatus,
    pub risk_score: RiskScore,
    pub priority: Priority,
    pub due_date: DateTime<Utc>,
    pub regularized: bool,
    pub regularized_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub processing_comment: Option<String>,
    pub conditions: Option<String>,
    pub history: Vec<HistoryEntry>,
    /// Bumped on every persisted mutation; the store only writes when it still matches.
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Demande {
    pub fn is_owned_by(&self, user: &UserId) -> bool {
        &self.client_id == user
    }

    pub fn can_transition_to(&self, next: DemandeStatus) -> bool {
        self.status.can_transition_to(next)
    }

    pub fn transition_to(&mut self, next: DemandeStatus) -> Result<(), LifecycleError> {
        if self.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(LifecycleError::InvalidTransition { from: self.status, to: next })
    }

    pub(crate) fn record(
        &mut self,
        action: HistoryAction,
        actor: &Actor,
        note: Option<String>,
        at: DateTime<Utc>,
    ) {
        self.history.push(HistoryEntry {
            action,
            actor_id: actor.id.clone(),
            actor_role: actor.role,
            note: note.filter(|value| !value.trim().is_empty()),
            occurred_at: at,
        });
        self.updated_at = at;
    }

    /// Priority as of `now`, derived from stored fields only.
    pub fn current_priority(&self, now: DateTime<Utc>) -> Priority {
        risk::compute_priority(self.risk_score, self.amount, self.created_at, now)
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && now > self.due_date
    }

    pub fn check_invariants(&self) -> Result<(), String> {
        let validated = self.status == DemandeStatus::Validated;
        if validated != self.authorized_amount.is_some() {
            return Err(format!(
                "authorized amount presence does not match status {}",
                self.status
            ));
        }
        if self.regularized && !validated {
            return Err("only validated demandes can be regularized".to_string());
        }
        if self.regularized != self.regularized_at.is_some() {
            return Err("regularization flag and timestamp disagree".to_string());
        }
        if self.history.is_empty() {
            return Err("history must start with a creation entry".to_string());
        }
        if self.history.windows(2).any(|pair| pair[1].occurred_at < pair[0].occurred_at) {
            return Err("history entries are out of order".to_string());
        }
        Ok(())
    }
}
