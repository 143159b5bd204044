//! Data-visibility boundary applied before any listing or statistics read.
//!
//! Caller filters are always ANDed with the role boundary, so they can only
//! narrow what an actor sees.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::actor::{Actor, AgencyId, Role, UserId};
use crate::domain::demande::{Demande, DemandeStatus, OperationType, RiskScore};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Visibility {
    Owner { client_id: UserId },
    ReviewerOrAgency { reviewer_id: UserId, agency_id: AgencyId },
    Agency { agency_id: AgencyId },
    Global,
}

impl Visibility {
    pub fn permits(&self, demande: &Demande) -> bool {
        match self {
            Self::Owner { client_id } => &demande.client_id == client_id,
            Self::ReviewerOrAgency { reviewer_id, agency_id } => {
                demande.advisor_id.as_ref() == Some(reviewer_id) || &demande.agency_id == agency_id
            }
            Self::Agency { agency_id } => &demande.agency_id == agency_id,
            Self::Global => true,
        }
    }
}

/// Optional narrowing criteria supplied by the caller.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestedFilters {
    pub statuses: Vec<DemandeStatus>,
    pub operation_types: Vec<OperationType>,
    pub min_risk: Option<RiskScore>,
    /// Inclusive lower bound on creation time.
    pub created_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on creation time.
    pub created_to: Option<DateTime<Utc>>,
    pub agency_id: Option<AgencyId>,
    pub client_id: Option<UserId>,
}

impl RequestedFilters {
    pub fn matches(&self, demande: &Demande) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&demande.status) {
            return false;
        }
        if !self.operation_types.is_empty()
            && !self.operation_types.contains(&demande.operation_type)
        {
            return false;
        }
        if let Some(min_risk) = self.min_risk {
            if demande.risk_score < min_risk {
                return false;
            }
        }
        if let Some(from) = self.created_from {
            if demande.created_at < from {
                return false;
            }
        }
        if let Some(to) = self.created_to {
            if demande.created_at >= to {
                return false;
            }
        }
        if let Some(agency_id) = &self.agency_id {
            if &demande.agency_id != agency_id {
                return false;
            }
        }
        if let Some(client_id) = &self.client_id {
            if &demande.client_id != client_id {
                return false;
            }
        }
        true
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemandeFilter {
    pub visibility: Visibility,
    pub criteria: RequestedFilters,
}

impl DemandeFilter {
    pub fn matches(&self, demande: &Demande) -> bool {
        self.visibility.permits(demande) && self.criteria.matches(demande)
    }
}

pub fn visibility_for(actor: &Actor) -> Visibility {
    match actor.role {
        Role::Client => Visibility::Owner { client_id: actor.id.clone() },
        Role::Conseiller => Visibility::ReviewerOrAgency {
            reviewer_id: actor.id.clone(),
            agency_id: actor.agency_id.clone(),
        },
        Role::Rm | Role::Dce | Role::Adg => {
            Visibility::Agency { agency_id: actor.agency_id.clone() }
        }
        Role::Dga | Role::Risques | Role::Admin => Visibility::Global,
    }
}

pub fn scope_for(actor: &Actor, filters: RequestedFilters) -> DemandeFilter {
    DemandeFilter { visibility: visibility_for(actor), criteria: filters }
}
