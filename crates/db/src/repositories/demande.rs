use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};

use forcage_core::domain::actor::{AgencyId, Role, UserId};
use forcage_core::domain::demande::{
    Demande, DemandeDetails, DemandeId, DemandeStatus, HistoryAction, HistoryEntry,
    OperationType, Priority, ReferenceCode, RiskScore,
};
use forcage_core::scope::{DemandeFilter, Visibility};
use forcage_core::store::{
    AggregateField, DemandeStore, Pagination, SaveOutcome, SortDirection, SortField, SortOrder,
    StoreError,
};

use super::{
    decode_decimal, decode_enum, decode_optional_timestamp, decode_timestamp, encode_timestamp,
    RepositoryError,
};
use crate::DbPool;

const DEMANDE_COLUMNS: &str = "id, reference, client_id, advisor_id, responsible_id, agency_id,
    operation_type, amount, authorized_amount, motive, details_json, status, risk_score,
    priority, due_date, regularized, regularized_at, processed_at, processing_comment,
    conditions, version, created_at, updated_at";

pub struct SqlDemandeRepository {
    pool: DbPool,
}

impl SqlDemandeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Row and history come from one read transaction, so they describe the
    /// same version even while a save commits on another connection.
    async fn load(&self, id: &DemandeId) -> Result<Option<Demande>, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let demande = match fetch_row(&mut tx, id).await? {
            Some(mut demande) => {
                demande.history = fetch_history(&mut tx, &demande.id).await?;
                Some(demande)
            }
            None => None,
        };
        tx.commit().await?;
        Ok(demande)
    }

    async fn load_page(
        &self,
        filter: &DemandeFilter,
        pagination: Pagination,
        sort: SortOrder,
    ) -> Result<Vec<Demande>, RepositoryError> {
        let mut builder =
            QueryBuilder::<Sqlite>::new(format!("SELECT {DEMANDE_COLUMNS} FROM demande"));
        push_filter(&mut builder, filter);
        push_order(&mut builder, sort);
        builder.push(" LIMIT ");
        builder.push_bind(i64::from(pagination.per_page));
        builder.push(" OFFSET ");
        builder.push_bind(i64::try_from(pagination.offset()).unwrap_or(i64::MAX));

        let mut tx = self.pool.begin().await?;
        let rows = builder.build().fetch_all(&mut *tx).await?;
        let mut demandes = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut demande = row_to_demande(row)?;
            demande.history = fetch_history(&mut tx, &demande.id).await?;
            demandes.push(demande);
        }
        tx.commit().await?;
        Ok(demandes)
    }

    async fn count(&self, filter: &DemandeFilter) -> Result<u64, RepositoryError> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM demande");
        push_filter(&mut builder, filter);

        let count: i64 = builder.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn aggregate(
        &self,
        filter: &DemandeFilter,
        field: AggregateField,
    ) -> Result<BTreeMap<String, u64>, RepositoryError> {
        let column = match field {
            AggregateField::Status => "status",
            AggregateField::OperationType => "operation_type",
            AggregateField::RiskScore => "risk_score",
            AggregateField::Agency => "agency_id",
        };

        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {column} AS bucket, COUNT(*) AS count FROM demande"
        ));
        push_filter(&mut builder, filter);
        builder.push(" GROUP BY bucket");

        let rows = builder.build().fetch_all(&self.pool).await?;
        let mut buckets = BTreeMap::new();
        for row in &rows {
            let bucket: String = row.try_get("bucket")?;
            let count: i64 = row.try_get("count")?;
            buckets.insert(bucket, u64::try_from(count).unwrap_or_default());
        }
        Ok(buckets)
    }

    async fn insert_row(&self, demande: &Demande) -> Result<(), RepositoryError> {
        let details_json = encode_details(&demande.details)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "INSERT INTO demande ({DEMANDE_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&demande.id.0)
        .bind(&demande.reference.0)
        .bind(&demande.client_id.0)
        .bind(demande.advisor_id.as_ref().map(|id| id.0.clone()))
        .bind(demande.responsible_id.as_ref().map(|id| id.0.clone()))
        .bind(&demande.agency_id.0)
        .bind(demande.operation_type.as_str())
        .bind(demande.amount.to_string())
        .bind(demande.authorized_amount.map(|amount| amount.to_string()))
        .bind(&demande.motive)
        .bind(details_json)
        .bind(demande.status.as_str())
        .bind(demande.risk_score.as_str())
        .bind(demande.priority.as_str())
        .bind(encode_timestamp(&demande.due_date))
        .bind(demande.regularized)
        .bind(demande.regularized_at.as_ref().map(encode_timestamp))
        .bind(demande.processed_at.as_ref().map(encode_timestamp))
        .bind(&demande.processing_comment)
        .bind(&demande.conditions)
        .bind(i64::from(demande.version))
        .bind(encode_timestamp(&demande.created_at))
        .bind(encode_timestamp(&demande.updated_at))
        .execute(&mut *tx)
        .await?;

        insert_history(&mut tx, &demande.id, &demande.history, 0).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn save_row(
        &self,
        demande: &Demande,
        expected_version: u32,
    ) -> Result<SaveOutcome, RepositoryError> {
        let details_json = encode_details(&demande.details)?;
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE demande SET
                 advisor_id = ?, responsible_id = ?, operation_type = ?, amount = ?,
                 authorized_amount = ?, motive = ?, details_json = ?, status = ?,
                 priority = ?, regularized = ?, regularized_at = ?, processed_at = ?,
                 processing_comment = ?, conditions = ?, version = ?, updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(demande.advisor_id.as_ref().map(|id| id.0.clone()))
        .bind(demande.responsible_id.as_ref().map(|id| id.0.clone()))
        .bind(demande.operation_type.as_str())
        .bind(demande.amount.to_string())
        .bind(demande.authorized_amount.map(|amount| amount.to_string()))
        .bind(&demande.motive)
        .bind(details_json)
        .bind(demande.status.as_str())
        .bind(demande.priority.as_str())
        .bind(demande.regularized)
        .bind(demande.regularized_at.as_ref().map(encode_timestamp))
        .bind(demande.processed_at.as_ref().map(encode_timestamp))
        .bind(&demande.processing_comment)
        .bind(&demande.conditions)
        .bind(i64::from(demande.version))
        .bind(encode_timestamp(&demande.updated_at))
        .bind(&demande.id.0)
        .bind(i64::from(expected_version))
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(SaveOutcome::Conflict);
        }

        let stored: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM demande_history WHERE demande_id = ?")
                .bind(&demande.id.0)
                .fetch_one(&mut *tx)
                .await?;
        let stored = usize::try_from(stored).unwrap_or_default();
        if stored > demande.history.len() {
            tx.rollback().await?;
            return Err(RepositoryError::Decode(format!(
                "demande {} would lose history entries ({} stored, {} given)",
                demande.id,
                stored,
                demande.history.len()
            )));
        }

        insert_history(&mut tx, &demande.id, &demande.history[stored..], stored).await?;

        tx.commit().await?;
        Ok(SaveOutcome::Applied)
    }

    async fn allocate_sequence(&self, year: i32) -> Result<u64, RepositoryError> {
        let value: i64 = sqlx::query_scalar(
            "INSERT INTO reference_counter (year, value) VALUES (?, 1)
             ON CONFLICT(year) DO UPDATE SET value = value + 1
             RETURNING value",
        )
        .bind(year)
        .fetch_one(&self.pool)
        .await?;

        u64::try_from(value)
            .map_err(|_| RepositoryError::Decode(format!("negative reference sequence {value}")))
    }
}

#[async_trait]
impl DemandeStore for SqlDemandeRepository {
    async fn find_by_id(&self, id: &DemandeId) -> Result<Option<Demande>, StoreError> {
        Ok(self.load(id).await?)
    }

    async fn find_many(
        &self,
        filter: &DemandeFilter,
        pagination: Pagination,
        sort: SortOrder,
    ) -> Result<Vec<Demande>, StoreError> {
        Ok(self.load_page(filter, pagination, sort).await?)
    }

    async fn count_by_filter(&self, filter: &DemandeFilter) -> Result<u64, StoreError> {
        Ok(self.count(filter).await?)
    }

    async fn aggregate_by_field(
        &self,
        filter: &DemandeFilter,
        field: AggregateField,
    ) -> Result<BTreeMap<String, u64>, StoreError> {
        Ok(self.aggregate(filter, field).await?)
    }

    async fn insert(&self, demande: &Demande) -> Result<(), StoreError> {
        Ok(self.insert_row(demande).await?)
    }

    async fn save(
        &self,
        demande: &Demande,
        expected_version: u32,
    ) -> Result<SaveOutcome, StoreError> {
        Ok(self.save_row(demande, expected_version).await?)
    }

    async fn next_reference_sequence(&self, year: i32) -> Result<u64, StoreError> {
        Ok(self.allocate_sequence(year).await?)
    }
}

/// The demande row alone; `history` is left empty.
async fn fetch_row(
    conn: &mut SqliteConnection,
    id: &DemandeId,
) -> Result<Option<Demande>, RepositoryError> {
    let row = sqlx::query(&format!("SELECT {DEMANDE_COLUMNS} FROM demande WHERE id = ?"))
        .bind(&id.0)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(row_to_demande).transpose()
}

async fn fetch_history(
    conn: &mut SqliteConnection,
    id: &DemandeId,
) -> Result<Vec<HistoryEntry>, RepositoryError> {
    let rows = sqlx::query(
        "SELECT action, actor_id, actor_role, note, occurred_at
         FROM demande_history
         WHERE demande_id = ?
         ORDER BY seq ASC",
    )
    .bind(&id.0)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(row_to_history_entry).collect()
}

async fn insert_history(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    demande_id: &DemandeId,
    entries: &[HistoryEntry],
    first_seq: usize,
) -> Result<(), RepositoryError> {
    for (offset, entry) in entries.iter().enumerate() {
        let seq = i64::try_from(first_seq + offset)
            .map_err(|_| RepositoryError::Decode("history sequence overflow".to_string()))?;
        sqlx::query(
            "INSERT INTO demande_history
                 (demande_id, seq, action, actor_id, actor_role, note, occurred_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&demande_id.0)
        .bind(seq)
        .bind(entry.action.as_str())
        .bind(&entry.actor_id.0)
        .bind(entry.actor_role.as_str())
        .bind(&entry.note)
        .bind(encode_timestamp(&entry.occurred_at))
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &DemandeFilter) {
    builder.push(" WHERE 1 = 1");

    match &filter.visibility {
        Visibility::Owner { client_id } => {
            builder.push(" AND client_id = ");
            builder.push_bind(client_id.0.clone());
        }
        Visibility::ReviewerOrAgency { reviewer_id, agency_id } => {
            builder.push(" AND (advisor_id = ");
            builder.push_bind(reviewer_id.0.clone());
            builder.push(" OR agency_id = ");
            builder.push_bind(agency_id.0.clone());
            builder.push(")");
        }
        Visibility::Agency { agency_id } => {
            builder.push(" AND agency_id = ");
            builder.push_bind(agency_id.0.clone());
        }
        Visibility::Global => {}
    }

    let criteria = &filter.criteria;
    if !criteria.statuses.is_empty() {
        builder.push(" AND status IN (");
        let mut values = builder.separated(", ");
        for status in &criteria.statuses {
            values.push_bind(status.as_str());
        }
        values.push_unseparated(")");
    }
    if !criteria.operation_types.is_empty() {
        builder.push(" AND operation_type IN (");
        let mut values = builder.separated(", ");
        for operation_type in &criteria.operation_types {
            values.push_bind(operation_type.as_str());
        }
        values.push_unseparated(")");
    }
    if let Some(min_risk) = criteria.min_risk {
        builder.push(" AND risk_score IN (");
        let mut values = builder.separated(", ");
        for risk in min_risk.at_least() {
            values.push_bind(risk.as_str());
        }
        values.push_unseparated(")");
    }
    if let Some(from) = &criteria.created_from {
        builder.push(" AND created_at >= ");
        builder.push_bind(encode_timestamp(from));
    }
    if let Some(to) = &criteria.created_to {
        builder.push(" AND created_at < ");
        builder.push_bind(encode_timestamp(to));
    }
    if let Some(agency_id) = &criteria.agency_id {
        builder.push(" AND agency_id = ");
        builder.push_bind(agency_id.0.clone());
    }
    if let Some(client_id) = &criteria.client_id {
        builder.push(" AND client_id = ");
        builder.push_bind(client_id.0.clone());
    }
}

fn push_order(builder: &mut QueryBuilder<'_, Sqlite>, sort: SortOrder) {
    let column = match sort.field {
        SortField::CreatedAt => "created_at",
        SortField::Amount => "CAST(amount AS REAL)",
        SortField::DueDate => "due_date",
    };
    let direction = match sort.direction {
        SortDirection::Asc => "ASC",
        SortDirection::Desc => "DESC",
    };
    builder.push(format!(" ORDER BY {column} {direction}, reference {direction}"));
}

fn encode_details(details: &DemandeDetails) -> Result<String, RepositoryError> {
    serde_json::to_string(details).map_err(|error| RepositoryError::Decode(error.to_string()))
}

fn row_to_demande(row: &SqliteRow) -> Result<Demande, RepositoryError> {
    let optional_user = |column: &str| -> Result<Option<UserId>, RepositoryError> {
        Ok(row.try_get::<Option<String>, _>(column)?.map(UserId))
    };

    let operation_type: String = row.try_get("operation_type")?;
    let status: String = row.try_get("status")?;
    let risk_score: String = row.try_get("risk_score")?;
    let priority: String = row.try_get("priority")?;
    let amount: String = row.try_get("amount")?;
    let authorized_amount: Option<String> = row.try_get("authorized_amount")?;
    let details_json: String = row.try_get("details_json")?;
    let due_date: String = row.try_get("due_date")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    let version: i64 = row.try_get("version")?;

    Ok(Demande {
        id: DemandeId(row.try_get("id")?),
        reference: ReferenceCode(row.try_get("reference")?),
        client_id: UserId(row.try_get("client_id")?),
        advisor_id: optional_user("advisor_id")?,
        responsible_id: optional_user("responsible_id")?,
        agency_id: AgencyId(row.try_get("agency_id")?),
        operation_type: decode_enum("operation_type", &operation_type, OperationType::parse)?,
        amount: decode_decimal("amount", &amount)?,
        authorized_amount: authorized_amount
            .map(|raw| decode_decimal("authorized_amount", &raw))
            .transpose()?,
        motive: row.try_get("motive")?,
        details: serde_json::from_str(&details_json)
            .map_err(|error| RepositoryError::Decode(format!("details_json: {error}")))?,
        status: decode_enum("status", &status, DemandeStatus::parse)?,
        risk_score: decode_enum("risk_score", &risk_score, RiskScore::parse)?,
        priority: decode_enum("priority", &priority, Priority::parse)?,
        due_date: decode_timestamp("due_date", &due_date)?,
        regularized: row.try_get("regularized")?,
        regularized_at: decode_optional_timestamp(
            "regularized_at",
            row.try_get("regularized_at")?,
        )?,
        processed_at: decode_optional_timestamp("processed_at", row.try_get("processed_at")?)?,
        processing_comment: row.try_get("processing_comment")?,
        conditions: row.try_get("conditions")?,
        history: Vec::new(),
        version: u32::try_from(version)
            .map_err(|_| RepositoryError::Decode(format!("version: out of range {version}")))?,
        created_at: decode_timestamp("created_at", &created_at)?,
        updated_at: decode_timestamp("updated_at", &updated_at)?,
    })
}

fn row_to_history_entry(row: &SqliteRow) -> Result<HistoryEntry, RepositoryError> {
    let action: String = row.try_get("action")?;
    let actor_role: String = row.try_get("actor_role")?;
    let occurred_at: String = row.try_get("occurred_at")?;

    Ok(HistoryEntry {
        action: decode_enum("action", &action, HistoryAction::parse)?,
        actor_id: UserId(row.try_get("actor_id")?),
        actor_role: decode_enum("actor_role", &actor_role, Role::parse)?,
        note: row.try_get("note")?,
        occurred_at: decode_timestamp("occurred_at", &occurred_at)?,
    })
}
