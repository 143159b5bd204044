//! Forcing-request lifecycle.
//!
//! Every mutating operation follows the same shape: load, authorize, apply the
//! transition and its history entry to a copy, then hand the copy to the store
//! as a conditional write on the version that was read. The event is published
//! only after the write is applied, so a failed call has no effect at all.

mod payload;
mod queries;

use std::sync::Arc;

use chrono::{Datelike, Duration, Utc};
use uuid::Uuid;

use crate::domain::actor::{Actor, Role};
use crate::domain::demande::{
    Demande, DemandeId, DemandeStatus, HistoryAction, Priority, ReferenceCode,
};
use crate::errors::LifecycleError;
use crate::events::{DemandeEvent, DemandeEventKind, EventSink};
use crate::permissions::{bypasses_authorization_ceiling, has_capability, Capability};
use crate::risk;
use crate::scope::visibility_for;
use crate::store::{ClientProfileProvider, DemandeStore, SaveOutcome};

pub use payload::{
    DecisionAction, DecisionData, DemandePatch, EscalationData, LifecyclePolicy, NewDemande,
    PROTECTED_FIELDS,
};
pub use queries::{DemandeAction, DemandeStatistics, ListQuery, Page};

#[derive(Clone)]
pub struct DemandeLifecycle {
    store: Arc<dyn DemandeStore>,
    profiles: Arc<dyn ClientProfileProvider>,
    events: Arc<dyn EventSink>,
    policy: LifecyclePolicy,
}

impl DemandeLifecycle {
    pub fn new(
        store: Arc<dyn DemandeStore>,
        profiles: Arc<dyn ClientProfileProvider>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self { store, profiles, events, policy: LifecyclePolicy::default() }
    }

    pub fn with_policy(mut self, policy: LifecyclePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &LifecyclePolicy {
        &self.policy
    }

    pub async fn create(
        &self,
        actor: &Actor,
        payload: NewDemande,
    ) -> Result<Demande, LifecycleError> {
        if !has_capability(actor.role, Capability::CreateDemande) {
            return Err(LifecycleError::forbidden(actor.role, "create a demande"));
        }

        let operation_type = self.policy.check_operation_type(&payload.operation_type)?;
        self.policy.check_amount("amount", payload.amount)?;
        let motive = self.policy.check_motive(&payload.motive)?;
        payload.details.validate()?;

        let profile = self
            .profiles
            .risk_profile(&actor.id)
            .await?
            .ok_or_else(|| LifecycleError::validation("client", "no risk profile on file"))?;
        let history = self.profiles.history(&actor.id).await?;
        let assessment = risk::compute_risk(&profile, payload.amount, &history);

        let now = Utc::now();
        let sequence = self.store.next_reference_sequence(now.year()).await?;

        let mut demande = Demande {
            id: DemandeId(Uuid::new_v4().to_string()),
            reference: ReferenceCode::new(now.year(), sequence),
            client_id: actor.id.clone(),
            advisor_id: profile.advisor_id.clone(),
            responsible_id: None,
            agency_id: profile.agency_id.clone(),
            operation_type,
            amount: payload.amount,
            authorized_amount: None,
            motive,
            details: payload.details,
            status: DemandeStatus::Draft,
            risk_score: assessment.score,
            priority: Priority::Normale,
            due_date: now + Duration::days(self.policy.due_days),
            regularized: false,
            regularized_at: None,
            processed_at: None,
            processing_comment: None,
            conditions: None,
            history: Vec::new(),
            version: 1,
            created_at: now,
            updated_at: now,
        };
        demande.priority = demande.current_priority(now);
        demande.record(
            HistoryAction::Creation,
            actor,
            Some(format!("risk {} ({} points)", assessment.score.as_str(), assessment.points)),
            now,
        );

        self.store.insert(&demande).await?;
        self.events.publish(DemandeEvent::new(DemandeEventKind::RequestCreated, &demande, actor));
        Ok(demande)
    }

    pub async fn submit(&self, actor: &Actor, id: &DemandeId) -> Result<Demande, LifecycleError> {
        let current = self.load(id).await?;
        ensure_owner(actor, &current)?;

        let mut next = current.clone();
        next.transition_to(DemandeStatus::Submitted)?;
        next.record(HistoryAction::Submission, actor, None, Utc::now());
        self.commit(actor, &current, next, HistoryAction::Submission, DemandeStatus::Submitted)
            .await
    }

    pub async fn cancel(&self, actor: &Actor, id: &DemandeId) -> Result<Demande, LifecycleError> {
        let current = self.load(id).await?;
        ensure_owner(actor, &current)?;

        let mut next = current.clone();
        next.transition_to(DemandeStatus::Cancelled)?;
        next.record(HistoryAction::Cancellation, actor, None, Utc::now());
        self.commit(actor, &current, next, HistoryAction::Cancellation, DemandeStatus::Cancelled)
            .await
    }

    /// Assigns the actor as reviewer. A demande already under review is reassigned in place.
    pub async fn take_over(
        &self,
        actor: &Actor,
        id: &DemandeId,
        note: Option<String>,
    ) -> Result<Demande, LifecycleError> {
        ensure_capability(actor, Capability::ReviewDemande, "review demandes")?;
        let current = self.load(id).await?;
        ensure_visible(actor, &current)?;

        let mut next = current.clone();
        match current.status {
            DemandeStatus::Submitted => next.transition_to(DemandeStatus::UnderReview)?,
            DemandeStatus::UnderReview => {}
            from => {
                return Err(LifecycleError::InvalidTransition {
                    from,
                    to: DemandeStatus::UnderReview,
                })
            }
        }
        next.advisor_id = Some(actor.id.clone());
        next.record(HistoryAction::TakeOver, actor, note, Utc::now());
        self.commit(actor, &current, next, HistoryAction::TakeOver, DemandeStatus::UnderReview)
            .await
    }

    /// Hands a reviewed demande to a higher responsible for the final decision.
    pub async fn escalate(
        &self,
        actor: &Actor,
        id: &DemandeId,
        data: EscalationData,
    ) -> Result<Demande, LifecycleError> {
        ensure_capability(actor, Capability::EscalateDemande, "escalate demandes")?;
        let current = self.load(id).await?;
        ensure_visible(actor, &current)?;

        let mut next = current.clone();
        next.transition_to(DemandeStatus::UnderValidation)?;
        if let Some(responsible_id) = data.responsible_id {
            next.responsible_id = Some(responsible_id);
        }
        next.record(HistoryAction::Escalation, actor, data.note, Utc::now());
        self.commit(
            actor,
            &current,
            next,
            HistoryAction::Escalation,
            DemandeStatus::UnderValidation,
        )
        .await
    }

    pub async fn decide(
        &self,
        actor: &Actor,
        id: &DemandeId,
        action: DecisionAction,
        data: DecisionData,
    ) -> Result<Demande, LifecycleError> {
        match action {
            DecisionAction::Validate | DecisionAction::Reject => {
                ensure_capability(actor, Capability::ValidateDemande, "decide on demandes")?
            }
            DecisionAction::RequestInfo => {
                ensure_capability(actor, Capability::ReviewDemande, "request information")?
            }
        }
        let current = self.load(id).await?;
        ensure_visible(actor, &current)?;

        let now = Utc::now();
        let mut next = current.clone();
        let (history_action, target) = match action {
            DecisionAction::Validate => {
                if !current.can_transition_to(DemandeStatus::Validated) {
                    return Err(LifecycleError::InvalidTransition {
                        from: current.status,
                        to: DemandeStatus::Validated,
                    });
                }
                let granted = data.authorized_amount.unwrap_or(current.amount);
                self.policy.check_amount("authorized_amount", granted)?;
                if !bypasses_authorization_ceiling(actor.role) && granted > actor.ceiling() {
                    return Err(LifecycleError::AuthorizationLimitExceeded {
                        limit: actor.ceiling(),
                        requested: granted,
                    });
                }

                next.transition_to(DemandeStatus::Validated)?;
                next.authorized_amount = Some(granted);
                next.processed_at = Some(now);
                next.processing_comment = data.comment.clone();
                next.conditions = data.conditions;
                (HistoryAction::Validation, DemandeStatus::Validated)
            }
            DecisionAction::Reject => {
                next.transition_to(DemandeStatus::Rejected)?;
                next.processed_at = Some(now);
                next.processing_comment = data.comment.clone();
                (HistoryAction::Rejection, DemandeStatus::Rejected)
            }
            DecisionAction::RequestInfo => {
                if !matches!(
                    current.status,
                    DemandeStatus::UnderReview | DemandeStatus::UnderValidation
                ) {
                    return Err(LifecycleError::InvalidTransition {
                        from: current.status,
                        to: DemandeStatus::UnderReview,
                    });
                }
                (HistoryAction::InfoRequest, current.status)
            }
        };

        next.record(history_action, actor, data.comment, now);
        self.commit(actor, &current, next, history_action, target).await
    }

    pub async fn regularize(
        &self,
        actor: &Actor,
        id: &DemandeId,
        note: Option<String>,
    ) -> Result<Demande, LifecycleError> {
        ensure_capability(actor, Capability::RegularizeDemande, "regularize demandes")?;
        let current = self.load(id).await?;
        ensure_visible(actor, &current)?;

        if current.status != DemandeStatus::Validated {
            return Err(LifecycleError::InvalidTransition {
                from: current.status,
                to: DemandeStatus::Validated,
            });
        }
        if current.regularized {
            return Err(LifecycleError::AlreadyRegularized(current.id.clone()));
        }

        let now = Utc::now();
        let mut next = current.clone();
        next.regularized = true;
        next.regularized_at = Some(now);
        next.record(HistoryAction::Regularization, actor, note, now);
        self.commit(actor, &current, next, HistoryAction::Regularization, DemandeStatus::Validated)
            .await
    }

    /// Edits a draft. Risk is deliberately left as stamped at creation.
    pub async fn update(
        &self,
        actor: &Actor,
        id: &DemandeId,
        patch: DemandePatch,
    ) -> Result<Demande, LifecycleError> {
        let current = self.load(id).await?;
        ensure_owner(actor, &current)?;
        if current.status != DemandeStatus::Draft {
            return Err(LifecycleError::InvalidTransition {
                from: current.status,
                to: DemandeStatus::Draft,
            });
        }
        if patch.is_empty() {
            return Err(LifecycleError::validation("patch", "nothing to update"));
        }

        let mut next = current.clone();
        let mut changed = Vec::new();
        if let Some(operation_type) = &patch.operation_type {
            next.operation_type = self.policy.check_operation_type(operation_type)?;
            changed.push("operation_type");
        }
        if let Some(amount) = patch.amount {
            self.policy.check_amount("amount", amount)?;
            next.amount = amount;
            changed.push("amount");
        }
        if let Some(motive) = &patch.motive {
            next.motive = self.policy.check_motive(motive)?;
            changed.push("motive");
        }
        if let Some(details) = patch.details {
            details.validate()?;
            next.details = details;
            changed.push("details");
        }

        next.record(HistoryAction::Update, actor, Some(changed.join(", ")), Utc::now());
        self.commit(actor, &current, next, HistoryAction::Update, DemandeStatus::Draft).await
    }

    async fn load(&self, id: &DemandeId) -> Result<Demande, LifecycleError> {
        self.store.find_by_id(id).await?.ok_or_else(|| LifecycleError::NotFound(id.clone()))
    }

    async fn commit(
        &self,
        actor: &Actor,
        current: &Demande,
        mut next: Demande,
        action: HistoryAction,
        target: DemandeStatus,
    ) -> Result<Demande, LifecycleError> {
        next.version = current.version + 1;

        match self.store.save(&next, current.version).await? {
            SaveOutcome::Applied => {
                self.events.publish(DemandeEvent::new(
                    DemandeEventKind::for_action(action),
                    &next,
                    actor,
                ));
                Ok(next)
            }
            SaveOutcome::Conflict => {
                let latest = self.load(&current.id).await?;
                if action == HistoryAction::Regularization && latest.regularized {
                    return Err(LifecycleError::AlreadyRegularized(latest.id));
                }
                Err(LifecycleError::InvalidTransition { from: latest.status, to: target })
            }
        }
    }
}

fn ensure_capability(
    actor: &Actor,
    capability: Capability,
    reason: &str,
) -> Result<(), LifecycleError> {
    if has_capability(actor.role, capability) {
        Ok(())
    } else {
        Err(LifecycleError::forbidden(actor.role, reason))
    }
}

fn ensure_owner(actor: &Actor, demande: &Demande) -> Result<(), LifecycleError> {
    if actor.role == Role::Client && demande.is_owned_by(&actor.id) {
        Ok(())
    } else {
        Err(LifecycleError::NotOwner { actor: actor.id.clone(), demande: demande.id.clone() })
    }
}

fn ensure_visible(actor: &Actor, demande: &Demande) -> Result<(), LifecycleError> {
    if visibility_for(actor).permits(demande) {
        return Ok(());
    }
    if actor.role.is_staff() {
        Err(LifecycleError::forbidden(actor.role, "access demandes outside its scope"))
    } else {
        Err(LifecycleError::NotOwner { actor: actor.id.clone(), demande: demande.id.clone() })
    }
}
