use std::cmp::Ordering;
use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::actor::UserId;
use crate::domain::client::{ClientHistoryEntry, ClientRiskProfile};
use crate::domain::demande::{Demande, DemandeId};
use crate::scope::DemandeFilter;

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage backend failure: {0}")]
    Backend(String),
    #[error("stored record could not be decoded: {0}")]
    Decode(String),
}

/// Result of a conditional write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    Applied,
    /// The stored version moved since the caller read it; nothing was written.
    Conflict,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateField {
    Status,
    OperationType,
    RiskScore,
    Agency,
}

impl AggregateField {
    pub fn bucket(&self, demande: &Demande) -> String {
        match self {
            Self::Status => demande.status.as_str().to_string(),
            Self::OperationType => demande.operation_type.as_str().to_string(),
            Self::RiskScore => demande.risk_score.as_str().to_string(),
            Self::Agency => demande.agency_id.0.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, per_page: DEFAULT_PER_PAGE }
    }
}

impl Pagination {
    pub fn is_valid(&self) -> bool {
        self.page >= 1 && (1..=MAX_PER_PAGE).contains(&self.per_page)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    CreatedAt,
    Amount,
    DueDate,
}

impl SortField {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "created_at" | "createdat" => Some(Self::CreatedAt),
            "amount" | "montant" => Some(Self::Amount),
            "due_date" | "duedate" => Some(Self::DueDate),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOrder {
    pub field: SortField,
    pub direction: SortDirection,
}

impl Default for SortOrder {
    fn default() -> Self {
        Self { field: SortField::CreatedAt, direction: SortDirection::Desc }
    }
}

impl SortOrder {
    /// Ordering with the reference code as tie-breaker, so pages are stable.
    pub fn compare(&self, left: &Demande, right: &Demande) -> Ordering {
        let primary = match self.field {
            SortField::CreatedAt => left.created_at.cmp(&right.created_at),
            SortField::Amount => left.amount.cmp(&right.amount),
            SortField::DueDate => left.due_date.cmp(&right.due_date),
        }
        .then_with(|| left.reference.0.cmp(&right.reference.0));

        match self.direction {
            SortDirection::Asc => primary,
            SortDirection::Desc => primary.reverse(),
        }
    }
}

/// Persistence collaborator for demandes.
#[async_trait]
pub trait DemandeStore: Send + Sync {
    async fn find_by_id(&self, id: &DemandeId) -> Result<Option<Demande>, StoreError>;

    async fn find_many(
        &self,
        filter: &DemandeFilter,
        pagination: Pagination,
        sort: SortOrder,
    ) -> Result<Vec<Demande>, StoreError>;

    async fn count_by_filter(&self, filter: &DemandeFilter) -> Result<u64, StoreError>;

    async fn aggregate_by_field(
        &self,
        filter: &DemandeFilter,
        field: AggregateField,
    ) -> Result<BTreeMap<String, u64>, StoreError>;

    async fn insert(&self, demande: &Demande) -> Result<(), StoreError>;

    /// Writes `demande` (status, fields and new history entries together) only
    /// if the stored version still equals `expected_version`.
    async fn save(
        &self,
        demande: &Demande,
        expected_version: u32,
    ) -> Result<SaveOutcome, StoreError>;

    async fn next_reference_sequence(&self, year: i32) -> Result<u64, StoreError>;
}

/// Source of client risk attributes and past outcomes.
#[async_trait]
pub trait ClientProfileProvider: Send + Sync {
    async fn risk_profile(&self, client: &UserId) -> Result<Option<ClientRiskProfile>, StoreError>;

    async fn history(&self, client: &UserId) -> Result<Vec<ClientHistoryEntry>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::{Pagination, SortField};

    #[test]
    fn pagination_bounds() {
        assert!(Pagination::default().is_valid());
        assert!(!Pagination { page: 0, per_page: 10 }.is_valid());
        assert!(!Pagination { page: 1, per_page: 101 }.is_valid());
        assert_eq!(Pagination { page: 3, per_page: 20 }.offset(), 40);
    }

    #[test]
    fn sort_field_accepts_french_alias() {
        assert_eq!(SortField::parse("montant"), Some(SortField::Amount));
        assert_eq!(SortField::parse("risk"), None);
    }
}
