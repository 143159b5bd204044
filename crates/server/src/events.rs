use forcage_core::{DemandeEvent, EventSink};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Hands committed events to the audit subscriber without waiting on it.
#[derive(Clone)]
pub struct ChannelEventSink {
    sender: mpsc::UnboundedSender<DemandeEvent>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DemandeEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelEventSink {
    fn publish(&self, event: DemandeEvent) {
        if let Err(error) = self.sender.send(event) {
            warn!(
                event_name = "system.audit.dropped",
                correlation_id = %error.0.event_id,
                demande_ref = %error.0.reference,
                kind = error.0.kind.as_str(),
                "audit subscriber is gone; event dropped"
            );
        }
    }
}

/// Logs every event until all senders are dropped.
pub fn spawn_audit_subscriber(
    mut receiver: mpsc::UnboundedReceiver<DemandeEvent>,
) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut seen = 0;
        while let Some(event) = receiver.recv().await {
            seen += 1;
            info!(
                event_name = event.kind.as_str(),
                correlation_id = %event.event_id,
                demande_ref = %event.reference,
                demande_id = %event.demande_id,
                actor_id = %event.actor_id,
                actor_role = event.actor_role.as_str(),
                status = event.status.as_str(),
                amount = %event.amount,
                authorized_amount = ?event.authorized_amount,
                note = ?event.note,
                occurred_at = %event.occurred_at,
                "demande audit event"
            );
        }
        seen
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use forcage_core::{
        Actor, Demande, DemandeDetails, DemandeEvent, DemandeEventKind, DemandeId, DemandeStatus,
        EventSink, OperationType, Priority, ReferenceCode, Role, RiskScore,
    };

    use super::{spawn_audit_subscriber, ChannelEventSink};

    fn event(kind: DemandeEventKind) -> DemandeEvent {
        let now = Utc::now();
        let client = Actor::new("cli-1", Role::Client, "AG-01");
        let demande = Demande {
            id: DemandeId("d-1".to_string()),
            reference: ReferenceCode::new(2026, 7),
            client_id: client.id.clone(),
            advisor_id: None,
            responsible_id: None,
            agency_id: client.agency_id.clone(),
            operation_type: OperationType::Debit,
            amount: Decimal::from(10_000),
            authorized_amount: None,
            motive: "Prélèvement assurance".to_string(),
            details: DemandeDetails::default(),
            status: DemandeStatus::Submitted,
            risk_score: RiskScore::Faible,
            priority: Priority::Normale,
            due_date: now,
            regularized: false,
            regularized_at: None,
            processed_at: None,
            processing_comment: None,
            conditions: None,
            history: Vec::new(),
            version: 2,
            created_at: now,
            updated_at: now,
        };
        DemandeEvent::new(kind, &demande, &client)
    }

    #[tokio::test]
    async fn subscriber_drains_every_event_then_stops() {
        let (sink, receiver) = ChannelEventSink::new();
        let subscriber = spawn_audit_subscriber(receiver);

        sink.publish(event(DemandeEventKind::RequestCreated));
        sink.publish(event(DemandeEventKind::RequestSubmitted));
        drop(sink);

        assert_eq!(subscriber.await.expect("subscriber task"), 2);
    }

    #[tokio::test]
    async fn publishing_after_subscriber_exit_does_not_panic() {
        let (sink, receiver) = ChannelEventSink::new();
        drop(receiver);

        sink.publish(event(DemandeEventKind::RequestCancelled));
    }
}
