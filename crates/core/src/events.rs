use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::actor::{Actor, Role, UserId};
use crate::domain::demande::{Demande, DemandeId, DemandeStatus, HistoryAction, ReferenceCode};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DemandeEventKind {
    RequestCreated,
    RequestUpdated,
    RequestSubmitted,
    RequestCancelled,
    RequestAssigned,
    RequestEscalated,
    RequestInfoRequested,
    RequestValidated,
    RequestRejected,
    RequestRegularized,
}

impl DemandeEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestCreated => "request.created",
            Self::RequestUpdated => "request.updated",
            Self::RequestSubmitted => "request.submitted",
            Self::RequestCancelled => "request.cancelled",
            Self::RequestAssigned => "request.assigned",
            Self::RequestEscalated => "request.escalated",
            Self::RequestInfoRequested => "request.info_requested",
            Self::RequestValidated => "request.validated",
            Self::RequestRejected => "request.rejected",
            Self::RequestRegularized => "request.regularized",
        }
    }

    pub fn for_action(action: HistoryAction) -> Self {
        match action {
            HistoryAction::Creation => Self::RequestCreated,
            HistoryAction::Update => Self::RequestUpdated,
            HistoryAction::Submission => Self::RequestSubmitted,
            HistoryAction::Cancellation => Self::RequestCancelled,
            HistoryAction::TakeOver => Self::RequestAssigned,
            HistoryAction::Escalation => Self::RequestEscalated,
            HistoryAction::Validation => Self::RequestValidated,
            HistoryAction::Rejection => Self::RequestRejected,
            HistoryAction::InfoRequest => Self::RequestInfoRequested,
            HistoryAction::Regularization => Self::RequestRegularized,
        }
    }
}

/// Published after a lifecycle operation has been committed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemandeEvent {
    pub event_id: String,
    pub kind: DemandeEventKind,
    pub demande_id: DemandeId,
    pub reference: ReferenceCode,
    pub client_id: UserId,
    pub actor_id: UserId,
    pub actor_role: Role,
    pub status: DemandeStatus,
    pub amount: Decimal,
    pub authorized_amount: Option<Decimal>,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl DemandeEvent {
    pub fn new(kind: DemandeEventKind, demande: &Demande, actor: &Actor) -> Self {
        let note = demande.history.last().and_then(|entry| entry.note.clone());
        Self {
            event_id: Uuid::new_v4().to_string(),
            kind,
            demande_id: demande.id.clone(),
            reference: demande.reference.clone(),
            client_id: demande.client_id.clone(),
            actor_id: actor.id.clone(),
            actor_role: actor.role,
            status: demande.status,
            amount: demande.amount,
            authorized_amount: demande.authorized_amount,
            note,
            occurred_at: demande.updated_at,
        }
    }
}

/// Subscriber side is asynchronous; `publish` must not block the caller.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: DemandeEvent);
}

#[derive(Clone, Default)]
pub struct InMemoryEventSink {
    events: Arc<Mutex<Vec<DemandeEvent>>>,
}

impl InMemoryEventSink {
    pub fn events(&self) -> Vec<DemandeEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn kinds(&self) -> Vec<DemandeEventKind> {
        self.events().into_iter().map(|event| event.kind).collect()
    }
}

impl EventSink for InMemoryEventSink {
    fn publish(&self, event: DemandeEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
