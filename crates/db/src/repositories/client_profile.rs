use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use forcage_core::domain::actor::{AgencyId, UserId};
use forcage_core::domain::client::{
    ClientClassification, ClientHistoryEntry, ClientRating, ClientRiskProfile,
};
use forcage_core::domain::demande::{DemandeStatus, ReferenceCode};
use forcage_core::store::{ClientProfileProvider, StoreError};

use super::{decode_decimal, decode_enum, decode_timestamp, encode_timestamp, RepositoryError};
use crate::DbPool;

/// Client risk profiles, plus past outcomes read back from the `demande` table.
pub struct SqlClientProfileRepository {
    pool: DbPool,
}

impl SqlClientProfileRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find(
        &self,
        client: &UserId,
    ) -> Result<Option<ClientRiskProfile>, RepositoryError> {
        let row = sqlx::query(
            "SELECT client_id, agency_id, advisor_id, rating, classification, balance,
                    overdraft_limit
             FROM client_profile WHERE client_id = ?",
        )
        .bind(&client.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref row) => Ok(Some(row_to_profile(row)?)),
            None => Ok(None),
        }
    }

    pub async fn save(&self, profile: &ClientRiskProfile) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO client_profile (client_id, agency_id, advisor_id, rating, classification,
                                         balance, overdraft_limit, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(client_id) DO UPDATE SET
                 agency_id = excluded.agency_id,
                 advisor_id = excluded.advisor_id,
                 rating = excluded.rating,
                 classification = excluded.classification,
                 balance = excluded.balance,
                 overdraft_limit = excluded.overdraft_limit,
                 updated_at = excluded.updated_at",
        )
        .bind(&profile.client_id.0)
        .bind(&profile.agency_id.0)
        .bind(profile.advisor_id.as_ref().map(|id| id.0.clone()))
        .bind(profile.rating.as_str())
        .bind(profile.classification.as_str())
        .bind(profile.balance.to_string())
        .bind(profile.overdraft_limit.to_string())
        .bind(encode_timestamp(&Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn count(&self) -> Result<u64, RepositoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM client_profile").fetch_one(&self.pool).await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn outcomes(&self, client: &UserId) -> Result<Vec<ClientHistoryEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT reference, status, amount, created_at
             FROM demande
             WHERE client_id = ?
             ORDER BY created_at ASC",
        )
        .bind(&client.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_history_entry).collect()
    }
}

#[async_trait]
impl ClientProfileProvider for SqlClientProfileRepository {
    async fn risk_profile(
        &self,
        client: &UserId,
    ) -> Result<Option<ClientRiskProfile>, StoreError> {
        Ok(self.find(client).await?)
    }

    async fn history(&self, client: &UserId) -> Result<Vec<ClientHistoryEntry>, StoreError> {
        Ok(self.outcomes(client).await?)
    }
}

fn row_to_profile(row: &SqliteRow) -> Result<ClientRiskProfile, RepositoryError> {
    let rating: String = row.try_get("rating")?;
    let classification: String = row.try_get("classification")?;
    let balance: String = row.try_get("balance")?;
    let overdraft_limit: String = row.try_get("overdraft_limit")?;

    Ok(ClientRiskProfile {
        client_id: UserId(row.try_get("client_id")?),
        agency_id: AgencyId(row.try_get("agency_id")?),
        advisor_id: row.try_get::<Option<String>, _>("advisor_id")?.map(UserId),
        rating: decode_enum("rating", &rating, ClientRating::parse)?,
        classification: decode_enum(
            "classification",
            &classification,
            ClientClassification::parse,
        )?,
        balance: decode_decimal("balance", &balance)?,
        overdraft_limit: decode_decimal("overdraft_limit", &overdraft_limit)?,
    })
}

fn row_to_history_entry(row: &SqliteRow) -> Result<ClientHistoryEntry, RepositoryError> {
    let status: String = row.try_get("status")?;
    let amount: String = row.try_get("amount")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(ClientHistoryEntry {
        reference: ReferenceCode(row.try_get("reference")?),
        status: decode_enum("status", &status, DemandeStatus::parse)?,
        amount: decode_decimal("amount", &amount)?,
        created_at: decode_timestamp("created_at", &created_at)?,
    })
}
