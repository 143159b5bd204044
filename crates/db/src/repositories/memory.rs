use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use forcage_core::domain::actor::UserId;
use forcage_core::domain::client::{ClientHistoryEntry, ClientRiskProfile};
use forcage_core::domain::demande::{Demande, DemandeId};
use forcage_core::scope::DemandeFilter;
use forcage_core::store::{
    AggregateField, ClientProfileProvider, DemandeStore, Pagination, SaveOutcome, SortOrder,
    StoreError,
};

#[derive(Default)]
pub struct InMemoryDemandeRepository {
    demandes: RwLock<HashMap<String, Demande>>,
    sequences: RwLock<HashMap<i32, u64>>,
}

#[async_trait]
impl DemandeStore for InMemoryDemandeRepository {
    async fn find_by_id(&self, id: &DemandeId) -> Result<Option<Demande>, StoreError> {
        let demandes = self.demandes.read().await;
        Ok(demandes.get(&id.0).cloned())
    }

    async fn find_many(
        &self,
        filter: &DemandeFilter,
        pagination: Pagination,
        sort: SortOrder,
    ) -> Result<Vec<Demande>, StoreError> {
        let demandes = self.demandes.read().await;
        let mut matching: Vec<&Demande> =
            demandes.values().filter(|demande| filter.matches(demande)).collect();
        matching.sort_by(|left, right| sort.compare(left, right));

        let offset = usize::try_from(pagination.offset()).unwrap_or(usize::MAX);
        let per_page = usize::try_from(pagination.per_page).unwrap_or(usize::MAX);
        Ok(matching.into_iter().skip(offset).take(per_page).cloned().collect())
    }

    async fn count_by_filter(&self, filter: &DemandeFilter) -> Result<u64, StoreError> {
        let demandes = self.demandes.read().await;
        let count = demandes.values().filter(|demande| filter.matches(demande)).count();
        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }

    async fn aggregate_by_field(
        &self,
        filter: &DemandeFilter,
        field: AggregateField,
    ) -> Result<BTreeMap<String, u64>, StoreError> {
        let demandes = self.demandes.read().await;
        let mut buckets = BTreeMap::new();
        for demande in demandes.values().filter(|demande| filter.matches(demande)) {
            *buckets.entry(field.bucket(demande)).or_insert(0) += 1;
        }
        Ok(buckets)
    }

    async fn insert(&self, demande: &Demande) -> Result<(), StoreError> {
        let mut demandes = self.demandes.write().await;
        if demandes.contains_key(&demande.id.0) {
            return Err(StoreError::Backend(format!("demande {} already exists", demande.id)));
        }
        demandes.insert(demande.id.0.clone(), demande.clone());
        Ok(())
    }

    async fn save(
        &self,
        demande: &Demande,
        expected_version: u32,
    ) -> Result<SaveOutcome, StoreError> {
        let mut demandes = self.demandes.write().await;
        match demandes.get_mut(&demande.id.0) {
            Some(stored) if stored.version == expected_version => {
                *stored = demande.clone();
                Ok(SaveOutcome::Applied)
            }
            Some(_) => Ok(SaveOutcome::Conflict),
            None => Err(StoreError::Backend(format!("demande {} does not exist", demande.id))),
        }
    }

    async fn next_reference_sequence(&self, year: i32) -> Result<u64, StoreError> {
        let mut sequences = self.sequences.write().await;
        let next = sequences.entry(year).or_insert(0);
        *next += 1;
        Ok(*next)
    }
}

#[derive(Default)]
pub struct InMemoryClientProfileRepository {
    profiles: RwLock<HashMap<String, ClientRiskProfile>>,
    history: RwLock<HashMap<String, Vec<ClientHistoryEntry>>>,
}

impl InMemoryClientProfileRepository {
    pub async fn save(&self, profile: ClientRiskProfile) {
        let mut profiles = self.profiles.write().await;
        profiles.insert(profile.client_id.0.clone(), profile);
    }

    /// Replaces the recorded past outcomes of `client`.
    pub async fn with_history(&self, client: &UserId, entries: Vec<ClientHistoryEntry>) {
        let mut history = self.history.write().await;
        history.insert(client.0.clone(), entries);
    }
}

#[async_trait]
impl ClientProfileProvider for InMemoryClientProfileRepository {
    async fn risk_profile(&self, client: &UserId) -> Result<Option<ClientRiskProfile>, StoreError> {
        let profiles = self.profiles.read().await;
        Ok(profiles.get(&client.0).cloned())
    }

    async fn history(&self, client: &UserId) -> Result<Vec<ClientHistoryEntry>, StoreError> {
        let history = self.history.read().await;
        Ok(history.get(&client.0).cloned().unwrap_or_default())
    }
}
