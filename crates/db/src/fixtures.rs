use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Client profiles shipped with the demo dataset.
const SEED_PROFILES: &[SeedProfileContract] = &[
    SeedProfileContract {
        client_id: "cli-dkr-001",
        agency_id: "AG-DKR-01",
        rating: "A",
        classification: "normal",
    },
    SeedProfileContract {
        client_id: "cli-dkr-002",
        agency_id: "AG-DKR-01",
        rating: "C",
        classification: "sensible",
    },
    SeedProfileContract {
        client_id: "cli-dkr-003",
        agency_id: "AG-DKR-01",
        rating: "E",
        classification: "defaut",
    },
    SeedProfileContract {
        client_id: "cli-ths-001",
        agency_id: "AG-THS-01",
        rating: "B",
        classification: "normal",
    },
    SeedProfileContract {
        client_id: "cli-ths-002",
        agency_id: "AG-THS-01",
        rating: "D",
        classification: "restructure",
    },
];

/// Settled demandes that give `cli-dkr-002` a track record.
const SEED_DEMANDES: &[SeedDemandeContract] = &[
    SeedDemandeContract {
        id: "seed-dem-0001",
        reference: "FRC-2025-000001",
        status: "VALIDATED",
        history_len: 6,
    },
    SeedDemandeContract {
        id: "seed-dem-0002",
        reference: "FRC-2025-000002",
        status: "REJECTED",
        history_len: 4,
    },
];

const SEED_AGENCIES: &[&str] = &["AG-DKR-01", "AG-THS-01"];

/// Deterministic demo dataset: agencies, client risk profiles and a short track record.
pub struct SeedDataset;

impl SeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/seed_data.sql");

    /// Loads the dataset. Rows that already exist are left untouched.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            agencies: SEED_AGENCIES.to_vec(),
            profiles_seeded: SEED_PROFILES.iter().map(|profile| profile.client_id).collect(),
            demandes_seeded: SEED_DEMANDES.iter().map(|demande| demande.reference).collect(),
        })
    }

    /// Checks that every seeded row is present with the expected shape.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for profile in SEED_PROFILES {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM client_profile
                               WHERE client_id = ?1 AND agency_id = ?2
                                 AND rating = ?3 AND classification = ?4)",
            )
            .bind(profile.client_id)
            .bind(profile.agency_id)
            .bind(profile.rating)
            .bind(profile.classification)
            .fetch_one(pool)
            .await?;
            checks.push((profile.client_id, present == 1));
        }

        for demande in SEED_DEMANDES {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM demande
                               WHERE id = ?1 AND reference = ?2 AND status = ?3)",
            )
            .bind(demande.id)
            .bind(demande.reference)
            .bind(demande.status)
            .fetch_one(pool)
            .await?;
            checks.push((demande.reference, present == 1));

            let history_len: i64 =
                sqlx::query_scalar("SELECT COUNT(1) FROM demande_history WHERE demande_id = ?1")
                    .bind(demande.id)
                    .fetch_one(pool)
                    .await?;
            checks.push((demande.history_label(), history_len == demande.history_len));
        }

        let counter: Option<i64> =
            sqlx::query_scalar("SELECT value FROM reference_counter WHERE year = 2025")
                .fetch_optional(pool)
                .await?;
        let seeded = i64::try_from(SEED_DEMANDES.len()).unwrap_or(i64::MAX);
        checks.push(("reference-counter-2025", counter.is_some_and(|value| value >= seeded)));

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes the seeded rows. History rows go with their demande.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        for demande in SEED_DEMANDES {
            sqlx::query("DELETE FROM demande_history WHERE demande_id = ?1")
                .bind(demande.id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM demande WHERE id = ?1")
                .bind(demande.id)
                .execute(&mut *tx)
                .await?;
        }
        for profile in SEED_PROFILES {
            sqlx::query("DELETE FROM client_profile WHERE client_id = ?1")
                .bind(profile.client_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedProfileContract {
    client_id: &'static str,
    agency_id: &'static str,
    rating: &'static str,
    classification: &'static str,
}

#[derive(Debug, Clone, Copy)]
struct SeedDemandeContract {
    id: &'static str,
    reference: &'static str,
    status: &'static str,
    history_len: i64,
}

impl SeedDemandeContract {
    fn history_label(&self) -> &'static str {
        match self.id {
            "seed-dem-0001" => "history-seed-dem-0001",
            _ => "history-seed-dem-0002",
        }
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub agencies: Vec<&'static str>,
    pub profiles_seeded: Vec<&'static str>,
    pub demandes_seeded: Vec<&'static str>,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use forcage_core::domain::actor::UserId;
    use forcage_core::domain::demande::{DemandeId, DemandeStatus};
    use forcage_core::store::{ClientProfileProvider, DemandeStore};

    use super::*;
    use crate::repositories::{SqlClientProfileRepository, SqlDemandeRepository};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    #[test]
    fn sql_fixture_is_valid() {
        assert!(!SeedDataset::SQL.is_empty());
    }

    #[tokio::test]
    async fn verify_seed_contract_and_idempotency() {
        let pool = setup().await;

        let first = SeedDataset::load(&pool).await.expect("load seed fixtures");
        let first_verification = SeedDataset::verify(&pool).await.expect("verify seed fixtures");
        assert!(first_verification.all_present, "{:?}", first_verification.checks);
        assert_eq!(first.profiles_seeded.len(), 5);
        assert_eq!(first.agencies, vec!["AG-DKR-01", "AG-THS-01"]);

        SeedDataset::load(&pool).await.expect("reload seed fixtures");
        let second_verification = SeedDataset::verify(&pool).await.expect("re-verify");
        assert_eq!(first_verification.checks, second_verification.checks);
    }

    #[tokio::test]
    async fn seeded_rows_decode_through_repositories() {
        let pool = setup().await;
        SeedDataset::load(&pool).await.expect("load seed fixtures");

        let demandes = SqlDemandeRepository::new(pool.clone());
        let validated = demandes
            .find_by_id(&DemandeId("seed-dem-0001".to_string()))
            .await
            .expect("find")
            .expect("seeded demande");
        assert_eq!(validated.status, DemandeStatus::Validated);
        assert!(validated.regularized);
        assert_eq!(validated.history.len(), 6);
        assert!(validated.check_invariants().is_ok());

        assert_eq!(
            demandes.next_reference_sequence(2025).await.expect("sequence"),
            3,
            "allocation continues after the seeded references"
        );

        let profiles = SqlClientProfileRepository::new(pool);
        let client = UserId("cli-dkr-002".to_string());
        assert!(profiles.risk_profile(&client).await.expect("profile").is_some());
        assert_eq!(profiles.history(&client).await.expect("history").len(), 2);
    }

    #[tokio::test]
    async fn clean_removes_seeded_rows() {
        let pool = setup().await;
        SeedDataset::load(&pool).await.expect("load seed fixtures");
        SeedDataset::clean(&pool).await.expect("clean");

        let verification = SeedDataset::verify(&pool).await.expect("verify");
        assert!(!verification.all_present);
        let remaining: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM demande").fetch_one(&pool).await.expect("n");
        assert_eq!(remaining, 0);
    }
}
