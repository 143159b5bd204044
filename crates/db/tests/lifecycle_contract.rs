//! Whole-lifecycle behaviour, run once against the in-memory repositories and
//! once against SQLite.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::json;
use tokio::sync::Barrier;

use forcage_core::{
    Actor, AgencyId, AggregateField, ClientClassification, ClientProfileProvider, ClientRating,
    ClientRiskProfile, DecisionAction, DecisionData, Demande, DemandeEventKind, DemandeFilter,
    DemandeId, DemandeLifecycle, DemandePatch, DemandeStatus, DemandeStore, EscalationData,
    InMemoryEventSink, LifecycleError, ListQuery, NewDemande, Pagination, RequestedFilters, Role,
    SaveOutcome, SortOrder, StoreError, UserId,
};
use forcage_db::{
    connect_with_settings, migrations, InMemoryClientProfileRepository,
    InMemoryDemandeRepository, SqlClientProfileRepository, SqlDemandeRepository,
};

enum Profiles {
    Memory(Arc<InMemoryClientProfileRepository>),
    Sql(Arc<SqlClientProfileRepository>),
}

struct Harness {
    lifecycle: DemandeLifecycle,
    events: InMemoryEventSink,
    profiles: Profiles,
    store: Arc<dyn DemandeStore>,
    provider: Arc<dyn ClientProfileProvider>,
}

impl Harness {
    async fn memory() -> Self {
        let profiles = Arc::new(InMemoryClientProfileRepository::default());
        let store: Arc<dyn DemandeStore> = Arc::new(InMemoryDemandeRepository::default());
        Self::assemble(store, profiles.clone(), Profiles::Memory(profiles)).await
    }

    async fn sqlite() -> Self {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let profiles = Arc::new(SqlClientProfileRepository::new(pool.clone()));
        let store: Arc<dyn DemandeStore> = Arc::new(SqlDemandeRepository::new(pool));
        Self::assemble(store, profiles.clone(), Profiles::Sql(profiles)).await
    }

    async fn assemble(
        store: Arc<dyn DemandeStore>,
        provider: Arc<dyn ClientProfileProvider>,
        profiles: Profiles,
    ) -> Self {
        let events = InMemoryEventSink::default();
        let lifecycle =
            DemandeLifecycle::new(store.clone(), provider.clone(), Arc::new(events.clone()));
        let harness = Self { lifecycle, events, profiles, store, provider };
        harness.seed_profiles().await;
        harness
    }

    /// A second lifecycle over the same data whose next two loads wait for
    /// each other, so both callers act on the same version.
    fn racing(&self) -> (DemandeLifecycle, Arc<LockstepStore>) {
        let store = Arc::new(LockstepStore::new(self.store.clone()));
        let lifecycle = DemandeLifecycle::new(
            store.clone(),
            self.provider.clone(),
            Arc::new(self.events.clone()),
        );
        (lifecycle, store)
    }

    async fn seed_profiles(&self) {
        for (client, agency) in [("cli-1", "AG-01"), ("cli-2", "AG-01"), ("cli-3", "AG-02")] {
            let profile = ClientRiskProfile {
                client_id: UserId(client.to_string()),
                agency_id: AgencyId(agency.to_string()),
                advisor_id: Some(UserId(format!("adv-{agency}"))),
                rating: ClientRating::B,
                classification: ClientClassification::Normal,
                balance: Decimal::from(1_000_000),
                overdraft_limit: Decimal::from(500_000),
            };
            match &self.profiles {
                Profiles::Memory(repo) => repo.save(profile).await,
                Profiles::Sql(repo) => repo.save(&profile).await.expect("save profile"),
            }
        }
    }

    async fn draft(&self, client: &Actor, amount: i64) -> Demande {
        self.lifecycle
            .create(
                client,
                NewDemande {
                    operation_type: "transfer".to_string(),
                    amount: Decimal::from(amount),
                    motive: "Virement fournisseur en attente de provision".to_string(),
                    details: Default::default(),
                },
            )
            .await
            .expect("create demande")
    }

    /// A demande walked up to UNDER_VALIDATION by the agency advisor.
    async fn under_validation(&self, amount: i64) -> Demande {
        let demande = self.draft(&client("cli-1"), amount).await;
        self.lifecycle.submit(&client("cli-1"), &demande.id).await.expect("submit");
        self.lifecycle.take_over(&advisor(), &demande.id, None).await.expect("take over");
        self.lifecycle
            .escalate(
                &advisor(),
                &demande.id,
                EscalationData { responsible_id: Some(director().id), note: None },
            )
            .await
            .expect("escalate")
    }

    async fn reload(&self, id: &DemandeId) -> Demande {
        self.lifecycle.get_by_id(&admin(), id).await.expect("reload")
    }
}

struct LockstepStore {
    inner: Arc<dyn DemandeStore>,
    barrier: Barrier,
    gated_loads: AtomicUsize,
    conflicts: AtomicUsize,
}

impl LockstepStore {
    fn new(inner: Arc<dyn DemandeStore>) -> Self {
        Self {
            inner,
            barrier: Barrier::new(2),
            gated_loads: AtomicUsize::new(2),
            conflicts: AtomicUsize::new(0),
        }
    }

    fn conflicts(&self) -> usize {
        self.conflicts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DemandeStore for LockstepStore {
    async fn find_by_id(&self, id: &DemandeId) -> Result<Option<Demande>, StoreError> {
        let found = self.inner.find_by_id(id).await?;
        let gated = self
            .gated_loads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if gated {
            self.barrier.wait().await;
        }
        Ok(found)
    }

    async fn find_many(
        &self,
        filter: &DemandeFilter,
        page: Pagination,
        order: SortOrder,
    ) -> Result<Vec<Demande>, StoreError> {
        self.inner.find_many(filter, page, order).await
    }

    async fn count_by_filter(&self, filter: &DemandeFilter) -> Result<u64, StoreError> {
        self.inner.count_by_filter(filter).await
    }

    async fn aggregate_by_field(
        &self,
        filter: &DemandeFilter,
        field: AggregateField,
    ) -> Result<BTreeMap<String, u64>, StoreError> {
        self.inner.aggregate_by_field(filter, field).await
    }

    async fn insert(&self, demande: &Demande) -> Result<(), StoreError> {
        self.inner.insert(demande).await
    }

    async fn save(
        &self,
        demande: &Demande,
        expected_version: u32,
    ) -> Result<SaveOutcome, StoreError> {
        let outcome = self.inner.save(demande, expected_version).await?;
        if outcome == SaveOutcome::Conflict {
            self.conflicts.fetch_add(1, Ordering::SeqCst);
        }
        Ok(outcome)
    }

    async fn next_reference_sequence(&self, year: i32) -> Result<u64, StoreError> {
        self.inner.next_reference_sequence(year).await
    }
}

fn client(id: &str) -> Actor {
    let agency = if id == "cli-3" { "AG-02" } else { "AG-01" };
    Actor::new(id, Role::Client, agency)
}

fn advisor() -> Actor {
    Actor::new("adv-AG-01", Role::Conseiller, "AG-01").with_ceiling(Decimal::from(1_000_000))
}

fn director() -> Actor {
    Actor::new("dce-AG-01", Role::Dce, "AG-01").with_ceiling(Decimal::from(10_000_000))
}

fn admin() -> Actor {
    Actor::new("root", Role::Admin, "HQ")
}

fn validate(amount: Option<i64>) -> DecisionData {
    DecisionData {
        authorized_amount: amount.map(Decimal::from),
        comment: Some("Accord".to_string()),
        conditions: None,
    }
}

fn invalid_field<T>(result: &Result<T, LifecycleError>) -> Option<&str> {
    match result {
        Err(LifecycleError::Validation { field, .. }) => Some(field.as_str()),
        _ => None,
    }
}

macro_rules! contract_tests {
    ($($name:ident),* $(,)?) => {
        mod memory {
            $(
                #[tokio::test]
                async fn $name() {
                    super::$name(super::Harness::memory().await).await;
                }
            )*
        }

        mod sqlite {
            $(
                #[tokio::test]
                async fn $name() {
                    super::$name(super::Harness::sqlite().await).await;
                }
            )*
        }
    };
}

contract_tests!(
    full_path_ends_regularized_once,
    ceiling_breach_leaves_demande_untouched,
    cancelling_someone_elses_demande_is_refused,
    concurrent_decisions_have_a_single_winner,
    racing_decisions_lose_on_the_version_check,
    racing_regularizations_report_already_regularized,
    illegal_transitions_are_refused,
    staff_outside_scope_cannot_act,
    drafts_are_editable_by_owner_only,
    creation_validates_input_and_profile,
    request_info_keeps_status,
    listing_and_statistics_follow_scope,
);

async fn full_path_ends_regularized_once(h: Harness) {
    let demande = h.under_validation(400_000).await;
    assert_eq!(demande.responsible_id, Some(director().id));
    assert_eq!(demande.advisor_id, Some(advisor().id));

    let validated = h
        .lifecycle
        .decide(&director(), &demande.id, DecisionAction::Validate, validate(Some(350_000)))
        .await
        .expect("validate");
    assert_eq!(validated.status, DemandeStatus::Validated);
    assert_eq!(validated.authorized_amount, Some(Decimal::from(350_000)));
    assert!(validated.processed_at.is_some());

    h.lifecycle.regularize(&advisor(), &demande.id, None).await.expect("regularize");
    let first = h.reload(&demande.id).await;
    let again = h.lifecycle.regularize(&advisor(), &demande.id, None).await;
    assert!(matches!(again, Err(LifecycleError::AlreadyRegularized(_))));

    let stored = h.reload(&demande.id).await;
    assert!(stored.regularized);
    assert_eq!(stored.regularized_at, first.regularized_at);
    assert_eq!(stored.history.len(), 6);
    assert_eq!(stored.version, 6);
    assert!(stored.check_invariants().is_ok());
    assert!(stored.reference.0.starts_with("FRC-"));

    assert_eq!(
        h.events.kinds(),
        vec![
            DemandeEventKind::RequestCreated,
            DemandeEventKind::RequestSubmitted,
            DemandeEventKind::RequestAssigned,
            DemandeEventKind::RequestEscalated,
            DemandeEventKind::RequestValidated,
            DemandeEventKind::RequestRegularized,
        ]
    );
}

async fn ceiling_breach_leaves_demande_untouched(h: Harness) {
    let demande = h.under_validation(5_000_000).await;
    let before = h.reload(&demande.id).await;
    let published = h.events.events().len();

    let result = h
        .lifecycle
        .decide(&advisor(), &demande.id, DecisionAction::Validate, validate(Some(5_000_000)))
        .await;

    assert_eq!(
        result,
        Err(LifecycleError::AuthorizationLimitExceeded {
            limit: Decimal::from(1_000_000),
            requested: Decimal::from(5_000_000),
        })
    );
    assert_eq!(h.reload(&demande.id).await, before);
    assert_eq!(h.events.events().len(), published);

    // Admins are not held to a ceiling.
    let validated = h
        .lifecycle
        .decide(&admin(), &demande.id, DecisionAction::Validate, validate(None))
        .await
        .expect("admin validates");
    assert_eq!(validated.authorized_amount, Some(Decimal::from(5_000_000)));
}

async fn cancelling_someone_elses_demande_is_refused(h: Harness) {
    let demande = h.draft(&client("cli-1"), 100_000).await;
    let before = h.reload(&demande.id).await;

    let result = h.lifecycle.cancel(&client("cli-2"), &demande.id).await;
    assert!(matches!(result, Err(LifecycleError::NotOwner { .. })));
    assert_eq!(h.reload(&demande.id).await, before);

    let staff = h.lifecycle.submit(&advisor(), &demande.id).await;
    assert!(matches!(staff, Err(LifecycleError::NotOwner { .. })));

    let cancelled = h.lifecycle.cancel(&client("cli-1"), &demande.id).await.expect("cancel");
    assert_eq!(cancelled.status, DemandeStatus::Cancelled);
}

async fn concurrent_decisions_have_a_single_winner(h: Harness) {
    let demande = h.under_validation(300_000).await;
    let history_before = h.reload(&demande.id).await.history.len();

    let reject = DecisionData { comment: Some("Refus".to_string()), ..Default::default() };
    let director = director();
    let (validated, rejected) = tokio::join!(
        h.lifecycle.decide(&director, &demande.id, DecisionAction::Validate, validate(None)),
        h.lifecycle.decide(&director, &demande.id, DecisionAction::Reject, reject),
    );

    let outcomes = [&validated, &rejected];
    assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 1);
    let loser = outcomes.iter().find_map(|outcome| outcome.as_ref().err()).expect("one loser");
    assert!(
        matches!(loser, LifecycleError::InvalidTransition { .. }),
        "loser must see the state change, got {loser:?}"
    );

    let stored = h.reload(&demande.id).await;
    let expected =
        if validated.is_ok() { DemandeStatus::Validated } else { DemandeStatus::Rejected };
    assert_eq!(stored.status, expected);
    assert_eq!(stored.history.len(), history_before + 1);
    assert!(stored.check_invariants().is_ok());

    let decisions = h
        .events
        .kinds()
        .into_iter()
        .filter(|kind| {
            matches!(kind, DemandeEventKind::RequestValidated | DemandeEventKind::RequestRejected)
        })
        .count();
    assert_eq!(decisions, 1);
}

async fn racing_decisions_lose_on_the_version_check(h: Harness) {
    let demande = h.under_validation(300_000).await;
    let history_before = h.reload(&demande.id).await.history.len();
    let (lifecycle, store) = h.racing();

    let reject = DecisionData { comment: Some("Refus".to_string()), ..Default::default() };
    let director = director();
    let (validated, rejected) = tokio::join!(
        lifecycle.decide(&director, &demande.id, DecisionAction::Validate, validate(None)),
        lifecycle.decide(&director, &demande.id, DecisionAction::Reject, reject),
    );

    assert_eq!(store.conflicts(), 1, "both decisions must reach the conditional save");
    let stored = h.reload(&demande.id).await;
    let (winner, loser, target) = match (&validated, &rejected) {
        (Ok(winner), Err(loser)) => (winner, loser, DemandeStatus::Rejected),
        (Err(loser), Ok(winner)) => (winner, loser, DemandeStatus::Validated),
        other => panic!("expected exactly one winner, got {other:?}"),
    };
    assert_eq!(
        loser,
        &LifecycleError::InvalidTransition { from: winner.status, to: target }
    );
    assert_eq!(stored.status, winner.status);
    assert_eq!(stored.version, winner.version);
    assert_eq!(stored.history.len(), history_before + 1);

    let decisions = h
        .events
        .kinds()
        .into_iter()
        .filter(|kind| {
            matches!(kind, DemandeEventKind::RequestValidated | DemandeEventKind::RequestRejected)
        })
        .count();
    assert_eq!(decisions, 1);
}

async fn racing_regularizations_report_already_regularized(h: Harness) {
    let demande = h.under_validation(300_000).await;
    h.lifecycle
        .decide(&director(), &demande.id, DecisionAction::Validate, validate(None))
        .await
        .expect("validate");
    let history_before = h.reload(&demande.id).await.history.len();
    let (lifecycle, store) = h.racing();

    let advisor = advisor();
    let (first, second) = tokio::join!(
        lifecycle.regularize(&advisor, &demande.id, None),
        lifecycle.regularize(&advisor, &demande.id, Some("relance".to_string())),
    );

    assert_eq!(store.conflicts(), 1);
    let loser = match (&first, &second) {
        (Ok(_), Err(loser)) | (Err(loser), Ok(_)) => loser,
        other => panic!("expected exactly one winner, got {other:?}"),
    };
    assert_eq!(loser, &LifecycleError::AlreadyRegularized(demande.id.clone()));

    let stored = h.reload(&demande.id).await;
    assert!(stored.regularized);
    assert_eq!(stored.history.len(), history_before + 1);
    let regularized = h
        .events
        .kinds()
        .into_iter()
        .filter(|kind| *kind == DemandeEventKind::RequestRegularized)
        .count();
    assert_eq!(regularized, 1);
}

async fn illegal_transitions_are_refused(h: Harness) {
    let owner = client("cli-1");
    let demande = h.draft(&owner, 150_000).await;

    let early = h.lifecycle.take_over(&advisor(), &demande.id, None).await;
    assert_eq!(
        early,
        Err(LifecycleError::InvalidTransition {
            from: DemandeStatus::Draft,
            to: DemandeStatus::UnderReview,
        })
    );

    h.lifecycle.submit(&owner, &demande.id).await.expect("submit");
    let twice = h.lifecycle.submit(&owner, &demande.id).await;
    assert_eq!(
        twice,
        Err(LifecycleError::InvalidTransition {
            from: DemandeStatus::Submitted,
            to: DemandeStatus::Submitted,
        })
    );

    h.lifecycle.take_over(&advisor(), &demande.id, None).await.expect("take over");
    let premature = h
        .lifecycle
        .decide(&director(), &demande.id, DecisionAction::Validate, validate(None))
        .await;
    assert_eq!(
        premature,
        Err(LifecycleError::InvalidTransition {
            from: DemandeStatus::UnderReview,
            to: DemandeStatus::Validated,
        })
    );

    let rejected = h
        .lifecycle
        .decide(&advisor(), &demande.id, DecisionAction::Reject, DecisionData::default())
        .await
        .expect("reject from review");
    assert_eq!(rejected.status, DemandeStatus::Rejected);
    assert_eq!(rejected.authorized_amount, None);

    let regularize = h.lifecycle.regularize(&advisor(), &demande.id, None).await;
    assert_eq!(
        regularize,
        Err(LifecycleError::InvalidTransition {
            from: DemandeStatus::Rejected,
            to: DemandeStatus::Validated,
        })
    );
    let cancel = h.lifecycle.cancel(&owner, &demande.id).await;
    assert!(matches!(cancel, Err(LifecycleError::InvalidTransition { .. })));

    let missing = h.lifecycle.submit(&owner, &DemandeId("nope".to_string())).await;
    assert!(matches!(missing, Err(LifecycleError::NotFound(_))));
}

async fn staff_outside_scope_cannot_act(h: Harness) {
    let demande = h.draft(&client("cli-1"), 200_000).await;
    h.lifecycle.submit(&client("cli-1"), &demande.id).await.expect("submit");

    let foreign = Actor::new("adv-AG-02", Role::Conseiller, "AG-02");
    let result = h.lifecycle.take_over(&foreign, &demande.id, None).await;
    assert!(matches!(result, Err(LifecycleError::Forbidden { .. })));

    let read = h.lifecycle.get_by_id(&client("cli-2"), &demande.id).await;
    assert!(matches!(read, Err(LifecycleError::NotOwner { .. })));

    let taken = h.lifecycle.take_over(&director(), &demande.id, None).await.expect("in agency");
    assert_eq!(taken.advisor_id, Some(director().id));
    let reassigned =
        h.lifecycle.take_over(&advisor(), &demande.id, None).await.expect("reassign in review");
    assert_eq!(reassigned.status, DemandeStatus::UnderReview);
    assert_eq!(reassigned.advisor_id, Some(advisor().id));

    let escalate = h
        .lifecycle
        .escalate(&client("cli-1"), &demande.id, EscalationData::default())
        .await;
    assert!(matches!(escalate, Err(LifecycleError::Forbidden { .. })));
}

async fn drafts_are_editable_by_owner_only(h: Harness) {
    let owner = client("cli-1");
    let created = h.draft(&owner, 100_000).await;
    let demande = h.reload(&created.id).await;

    let protected = DemandePatch::from_json(json!({ "status": "VALIDATED" }));
    assert_eq!(invalid_field(&protected), Some("status"));

    let patch = DemandePatch::from_json(json!({ "amount": "900000" })).expect("patch");
    let updated = h.lifecycle.update(&owner, &demande.id, patch.clone()).await.expect("update");
    assert_eq!(updated.amount, Decimal::from(900_000));
    assert_eq!(updated.risk_score, demande.risk_score, "risk is fixed at creation");
    assert_eq!(updated.due_date, demande.due_date);

    let stranger = h.lifecycle.update(&client("cli-2"), &demande.id, patch.clone()).await;
    assert!(matches!(stranger, Err(LifecycleError::NotOwner { .. })));

    let empty = h.lifecycle.update(&owner, &demande.id, DemandePatch::default()).await;
    assert!(matches!(empty, Err(LifecycleError::Validation { .. })));

    h.lifecycle.submit(&owner, &demande.id).await.expect("submit");
    let late = h.lifecycle.update(&owner, &demande.id, patch).await;
    assert_eq!(
        late,
        Err(LifecycleError::InvalidTransition {
            from: DemandeStatus::Submitted,
            to: DemandeStatus::Draft,
        })
    );
    assert!(h.events.kinds().contains(&DemandeEventKind::RequestUpdated));
}

async fn creation_validates_input_and_profile(h: Harness) {
    let payload = |amount: i64, motive: &str| NewDemande {
        operation_type: "card".to_string(),
        amount: Decimal::from(amount),
        motive: motive.to_string(),
        details: Default::default(),
    };

    let zero = h.lifecycle.create(&client("cli-1"), payload(0, "Paiement carte refusé")).await;
    assert_eq!(invalid_field(&zero), Some("amount"));

    let short = h.lifecycle.create(&client("cli-1"), payload(10, "court")).await;
    assert_eq!(invalid_field(&short), Some("motive"));

    let unknown = h.lifecycle.create(&client("cli-9"), payload(10, "Paiement carte refusé")).await;
    assert_eq!(invalid_field(&unknown), Some("client"));

    let staff = h.lifecycle.create(&advisor(), payload(10, "Paiement carte refusé")).await;
    assert!(matches!(staff, Err(LifecycleError::Forbidden { .. })));
    let admin_draft = h.lifecycle.create(&admin(), payload(10, "Paiement carte refusé")).await;
    assert!(matches!(admin_draft, Err(LifecycleError::Forbidden { .. })));
    assert!(h.events.events().is_empty());

    let first = h.draft(&client("cli-1"), 50_000).await;
    let second = h.draft(&client("cli-3"), 50_000).await;
    assert_ne!(first.reference, second.reference);
    assert_eq!(second.agency_id, AgencyId("AG-02".to_string()));
    assert_eq!(second.advisor_id, Some(UserId("adv-AG-02".to_string())));
    assert_eq!(first.status, DemandeStatus::Draft);
    assert_eq!(first.history.len(), 1);
}

async fn request_info_keeps_status(h: Harness) {
    let demande = h.under_validation(250_000).await;
    let asked = h
        .lifecycle
        .decide(
            &advisor(),
            &demande.id,
            DecisionAction::RequestInfo,
            DecisionData {
                comment: Some("Justificatif manquant".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("request info");

    assert_eq!(asked.status, DemandeStatus::UnderValidation);
    assert_eq!(
        asked.history.last().and_then(|entry| entry.note.clone()),
        Some("Justificatif manquant".to_string())
    );
    assert_eq!(h.events.kinds().last(), Some(&DemandeEventKind::RequestInfoRequested));
}

async fn listing_and_statistics_follow_scope(h: Harness) {
    for owner in ["cli-1", "cli-1", "cli-2", "cli-3"] {
        let demande = h.draft(&client(owner), 100_000).await;
        h.lifecycle.submit(&client(owner), &demande.id).await.expect("submit");
    }

    let mine = h.lifecycle.list(&client("cli-1"), ListQuery::default()).await.expect("list");
    assert_eq!(mine.total, 2);
    assert!(mine.items.iter().all(|demande| demande.client_id.0 == "cli-1"));

    let agency = h.lifecycle.list(&director(), ListQuery::default()).await.expect("list");
    assert_eq!(agency.total, 3);

    // A caller filter cannot widen the role boundary.
    let widened = ListQuery {
        filters: RequestedFilters {
            agency_id: Some(AgencyId("AG-02".to_string())),
            ..Default::default()
        },
        ..Default::default()
    };
    let nothing = h.lifecycle.list(&director(), widened).await.expect("list");
    assert_eq!(nothing.total, 0);

    let global = h.lifecycle.statistics(&admin(), RequestedFilters::default()).await.expect("s");
    assert_eq!(global.total, 4);
    assert_eq!(global.open, 4);
    assert!(global.by_risk_score.is_some());

    let local = h.lifecycle.statistics(&director(), RequestedFilters::default()).await.expect("s");
    assert_eq!(local.total, 3);
    assert_eq!(local.by_status.get("SUBMITTED"), Some(&3));
    assert!(local.by_risk_score.is_none());

    let mut bad = ListQuery::default();
    bad.pagination.per_page = 0;
    let invalid = h.lifecycle.list(&admin(), bad).await;
    assert!(matches!(invalid, Err(LifecycleError::Validation { .. })));
}
