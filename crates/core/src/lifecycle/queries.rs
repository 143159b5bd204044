use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{ensure_visible, DemandeLifecycle};
use crate::domain::actor::{Actor, Role};
use crate::domain::demande::{Demande, DemandeId, DemandeStatus};
use crate::errors::LifecycleError;
use crate::permissions::{has_capability, Capability};
use crate::scope::{scope_for, RequestedFilters};
use crate::store::{AggregateField, Pagination, SortOrder, MAX_PER_PAGE};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListQuery {
    pub filters: RequestedFilters,
    pub pagination: Pagination,
    pub sort: SortOrder,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub items: Vec<Demande>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemandeStatistics {
    pub total: u64,
    pub by_status: BTreeMap<String, u64>,
    pub by_operation_type: BTreeMap<String, u64>,
    /// Present only for actors holding `VIEW_RISK_STATS`.
    pub by_risk_score: Option<BTreeMap<String, u64>>,
    pub open: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemandeAction {
    Update,
    Submit,
    Cancel,
    TakeOver,
    Escalate,
    Validate,
    Reject,
    RequestInfo,
    Regularize,
}

impl DemandeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::Submit => "submit",
            Self::Cancel => "cancel",
            Self::TakeOver => "take_over",
            Self::Escalate => "escalate",
            Self::Validate => "validate",
            Self::Reject => "reject",
            Self::RequestInfo => "request_info",
            Self::Regularize => "regularize",
        }
    }
}

impl DemandeLifecycle {
    pub async fn list(&self, actor: &Actor, query: ListQuery) -> Result<Page, LifecycleError> {
        if !query.pagination.is_valid() {
            return Err(LifecycleError::validation(
                "pagination",
                format!("page must be >= 1 and per_page within 1..={MAX_PER_PAGE}"),
            ));
        }

        let filter = scope_for(actor, query.filters);
        let total = self.store.count_by_filter(&filter).await?;
        let items = self.store.find_many(&filter, query.pagination, query.sort).await?;

        Ok(Page { items, total, page: query.pagination.page, per_page: query.pagination.per_page })
    }

    pub async fn get_by_id(
        &self,
        actor: &Actor,
        id: &DemandeId,
    ) -> Result<Demande, LifecycleError> {
        let demande = self.load(id).await?;
        ensure_visible(actor, &demande)?;
        Ok(demande)
    }

    pub async fn statistics(
        &self,
        actor: &Actor,
        filters: RequestedFilters,
    ) -> Result<DemandeStatistics, LifecycleError> {
        let filter = scope_for(actor, filters);

        let total = self.store.count_by_filter(&filter).await?;
        let by_status = self.store.aggregate_by_field(&filter, AggregateField::Status).await?;
        let by_operation_type =
            self.store.aggregate_by_field(&filter, AggregateField::OperationType).await?;
        let by_risk_score = if has_capability(actor.role, Capability::ViewRiskStats) {
            Some(self.store.aggregate_by_field(&filter, AggregateField::RiskScore).await?)
        } else {
            None
        };

        let open = DemandeStatus::OPEN
            .iter()
            .filter_map(|status| by_status.get(status.as_str()))
            .sum();

        Ok(DemandeStatistics { total, by_status, by_operation_type, by_risk_score, open })
    }

    /// Operations the actor could attempt next on `demande`. The ceiling is not
    /// considered, since the granted amount is only known at decision time.
    pub fn available_actions(&self, actor: &Actor, demande: &Demande) -> Vec<DemandeAction> {
        let mut actions = Vec::new();

        if actor.role == Role::Client {
            if !demande.is_owned_by(&actor.id) {
                return actions;
            }
            if demande.status == DemandeStatus::Draft {
                actions.push(DemandeAction::Update);
            }
            if demande.can_transition_to(DemandeStatus::Submitted) {
                actions.push(DemandeAction::Submit);
            }
            if demande.can_transition_to(DemandeStatus::Cancelled) {
                actions.push(DemandeAction::Cancel);
            }
            return actions;
        }

        if ensure_visible(actor, demande).is_err() {
            return actions;
        }

        let can = |capability| has_capability(actor.role, capability);
        let submitted = demande.status == DemandeStatus::Submitted;
        let in_review = demande.status == DemandeStatus::UnderReview;
        let in_validation = demande.status == DemandeStatus::UnderValidation;

        if can(Capability::ReviewDemande) && (submitted || in_review) {
            actions.push(DemandeAction::TakeOver);
        }
        if can(Capability::EscalateDemande) && in_review {
            actions.push(DemandeAction::Escalate);
        }
        if can(Capability::ValidateDemande) {
            if in_validation {
                actions.push(DemandeAction::Validate);
            }
            if in_review || in_validation {
                actions.push(DemandeAction::Reject);
            }
        }
        if can(Capability::ReviewDemande) && (in_review || in_validation) {
            actions.push(DemandeAction::RequestInfo);
        }
        if can(Capability::RegularizeDemande)
            && demande.status == DemandeStatus::Validated
            && !demande.regularized
        {
            actions.push(DemandeAction::Regularize);
        }

        actions
    }
}
