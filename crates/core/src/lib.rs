pub mod config;
pub mod domain;
pub mod errors;
pub mod events;
pub mod lifecycle;
pub mod permissions;
pub mod risk;
pub mod scope;
pub mod store;

pub use domain::actor::{Actor, AgencyId, Role, UserId};
pub use domain::client::{
    ClientClassification, ClientHistoryEntry, ClientRating, ClientRiskProfile,
};
pub use domain::demande::{
    Demande, DemandeDetails, DemandeId, DemandeStatus, HistoryAction, HistoryEntry,
    OperationType, Priority, ReferenceCode, RiskScore,
};
pub use errors::{ErrorKind, InterfaceError, LifecycleError};
pub use events::{DemandeEvent, DemandeEventKind, EventSink, InMemoryEventSink};
pub use lifecycle::{
    DecisionAction, DecisionData, DemandeAction, DemandeLifecycle, DemandePatch,
    DemandeStatistics, EscalationData, LifecyclePolicy, ListQuery, NewDemande, Page,
};
pub use permissions::{capabilities_for, has_capability, Capability};
pub use risk::{compute_priority, compute_risk, RiskAssessment};
pub use scope::{scope_for, DemandeFilter, RequestedFilters, Visibility};
pub use store::{
    AggregateField, ClientProfileProvider, DemandeStore, Pagination, SaveOutcome, SortDirection,
    SortField, SortOrder, StoreError,
};
