//! Postgres store: connection pool, migrations, and the capital call tables.
//!
//! Each write runs in one transaction. `update` is
//! `UPDATE ... WHERE id = $1 AND version = $2`; zero rows affected is a
//! version conflict if the row still exists and `NotFound` otherwise.
//! Breakdowns are replaced with DELETE + INSERT inside the same transaction.
//!
//! Reads take a REPEATABLE READ snapshot, so a call's version always
//! matches the breakdown list returned with it.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use super::CapitalCallStore;
use crate::error::{Error, Result};
use crate::model::{
    Audit, Breakdown, CapitalCall, CapitalCallId, Lock, NewCapitalCallRecord, Page, Queue,
    QueueCountFilter, SearchFilter, SearchQuery, SortDirection, SortField,
};

const CALL_COLUMNS: &str = "id, batch_id, from_date, to_date, day_type, total_amount, \
     workflow_status, queue, locked_by, locked_at, client_name, asset_description, \
     reference_id, is_sensitive, version, created_at, created_by, modified_at, modified_by";

/// Database handle. Owns the connection pool.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to Postgres and create a connection pool.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Begin a read-only snapshot, so a call row and its breakdowns are
    /// read at the same version.
    async fn read_snapshot(&self) -> Result<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }
}

async fn load_breakdowns(
    tx: &mut Transaction<'_, Postgres>,
    ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<Breakdown>>> {
    let rows: Vec<BreakdownRow> = sqlx::query_as(
        "SELECT capital_call_id, category, percentage, calculated_amount
         FROM capital_call_breakdowns
         WHERE capital_call_id = ANY($1)
         ORDER BY capital_call_id, position",
    )
    .bind(ids)
    .fetch_all(&mut **tx)
    .await?;

    let mut grouped: HashMap<Uuid, Vec<Breakdown>> = HashMap::new();
    for row in rows {
        let owner = row.capital_call_id;
        grouped.entry(owner).or_default().push(row.try_into_breakdown()?);
    }
    Ok(grouped)
}

async fn insert_breakdowns(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    breakdowns: &[Breakdown],
) -> Result<()> {
    for (position, b) in breakdowns.iter().enumerate() {
        sqlx::query(
            "INSERT INTO capital_call_breakdowns (capital_call_id, position, category, percentage, calculated_amount)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(position as i32)
        .bind(b.category.as_str())
        .bind(b.percentage)
        .bind(b.calculated_amount)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

#[async_trait]
impl CapitalCallStore for PgStore {
    async fn find_by_id(&self, id: CapitalCallId) -> Result<Option<CapitalCall>> {
        let mut tx = self.read_snapshot().await?;
        let row: Option<CapitalCallRow> = sqlx::query_as(&format!(
            "SELECT {CALL_COLUMNS} FROM capital_calls WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };
        let mut breakdowns = load_breakdowns(&mut tx, &[id.0]).await?;
        tx.commit().await?;
        let owned = breakdowns.remove(&id.0).unwrap_or_default();
        row.try_into_capital_call(owned).map(Some)
    }

    async fn insert(&self, record: NewCapitalCallRecord) -> Result<CapitalCall> {
        let id = Uuid::new_v4();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO capital_calls (id, batch_id, from_date, to_date, day_type, total_amount,
                 workflow_status, queue, locked_by, locked_at, client_name, asset_description,
                 reference_id, is_sensitive, version, created_at, created_by, modified_at, modified_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, 0, $15, $16, $17, $18)",
        )
        .bind(id)
        .bind(&record.batch_id)
        .bind(record.from_date)
        .bind(record.to_date)
        .bind(&record.day_type)
        .bind(record.total_amount)
        .bind(record.workflow_status.as_str())
        .bind(record.queue.as_str())
        .bind(record.lock.as_ref().map(|l| l.holder.as_str()))
        .bind(record.lock.as_ref().map(|l| l.acquired_at))
        .bind(&record.client_name)
        .bind(&record.asset_description)
        .bind(&record.reference_id)
        .bind(record.is_sensitive)
        .bind(record.audit.created_at)
        .bind(&record.audit.created_by)
        .bind(record.audit.modified_at)
        .bind(&record.audit.modified_by)
        .execute(&mut *tx)
        .await?;

        insert_breakdowns(&mut tx, id, &record.breakdowns).await?;
        tx.commit().await?;

        Ok(CapitalCall {
            id: CapitalCallId(id),
            batch_id: record.batch_id,
            from_date: record.from_date,
            to_date: record.to_date,
            day_type: record.day_type,
            total_amount: record.total_amount,
            workflow_status: record.workflow_status,
            queue: record.queue,
            lock: record.lock,
            client_name: record.client_name,
            asset_description: record.asset_description,
            reference_id: record.reference_id,
            is_sensitive: record.is_sensitive,
            breakdowns: record.breakdowns,
            version: 0,
            audit: record.audit,
        })
    }

    async fn update(&self, call: &CapitalCall) -> Result<CapitalCall> {
        let mut tx = self.pool.begin().await?;

        let rows_affected = sqlx::query(
            "UPDATE capital_calls SET batch_id = $3, from_date = $4, to_date = $5, day_type = $6,
                 total_amount = $7, workflow_status = $8, queue = $9, locked_by = $10, locked_at = $11,
                 client_name = $12, asset_description = $13, reference_id = $14, is_sensitive = $15,
                 modified_at = $16, modified_by = $17, version = version + 1
             WHERE id = $1 AND version = $2",
        )
        .bind(call.id.0)
        .bind(call.version)
        .bind(&call.batch_id)
        .bind(call.from_date)
        .bind(call.to_date)
        .bind(&call.day_type)
        .bind(call.total_amount)
        .bind(call.workflow_status.as_str())
        .bind(call.queue.as_str())
        .bind(call.lock.as_ref().map(|l| l.holder.as_str()))
        .bind(call.lock.as_ref().map(|l| l.acquired_at))
        .bind(&call.client_name)
        .bind(&call.asset_description)
        .bind(&call.reference_id)
        .bind(call.is_sensitive)
        .bind(call.audit.modified_at)
        .bind(&call.audit.modified_by)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            let exists: Option<(i64,)> =
                sqlx::query_as("SELECT version FROM capital_calls WHERE id = $1")
                    .bind(call.id.0)
                    .fetch_optional(&mut *tx)
                    .await?;
            return Err(match exists {
                Some(_) => Error::VersionConflict {
                    id: call.id,
                    expected: call.version,
                },
                None => Error::NotFound(call.id.to_string()),
            });
        }

        sqlx::query("DELETE FROM capital_call_breakdowns WHERE capital_call_id = $1")
            .bind(call.id.0)
            .execute(&mut *tx)
            .await?;
        insert_breakdowns(&mut tx, call.id.0, &call.breakdowns).await?;

        tx.commit().await?;

        let mut stored = call.clone();
        stored.version = call.version + 1;
        Ok(stored)
    }

    async fn count_by_queue(&self, queue: Queue, filter: &QueueCountFilter) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM capital_calls
             WHERE queue = $1
               AND ($2::date IS NULL OR from_date >= $2)
               AND ($3::date IS NULL OR to_date <= $3)
               AND ($4::text IS NULL OR batch_id = $4)
               AND ($5::text IS NULL OR reference_id = $5)",
        )
        .bind(queue.as_str())
        .bind(filter.date_from)
        .bind(filter.date_to)
        .bind(&filter.batch_id)
        .bind(&filter.reference_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u64)
    }

    async fn search(&self, query: &SearchQuery) -> Result<Page<CapitalCall>> {
        let mut count_qb =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM capital_calls WHERE TRUE");
        push_filters(&mut count_qb, &query.filters);

        let mut tx = self.read_snapshot().await?;
        let total: i64 = count_qb.build_query_scalar().fetch_one(&mut *tx).await?;

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {CALL_COLUMNS} FROM capital_calls WHERE TRUE"
        ));
        push_filters(&mut qb, &query.filters);

        qb.push(" ORDER BY ");
        for sort in query.effective_sort() {
            qb.push(sort_column(sort.field));
            qb.push(match sort.direction {
                SortDirection::Asc => " ASC NULLS LAST, ",
                SortDirection::Desc => " DESC NULLS LAST, ",
            });
        }
        qb.push("created_at ASC, id ASC");

        let size = query.pagination.size_or_default();
        qb.push(" LIMIT ").push_bind(i64::from(size));
        qb.push(" OFFSET ")
            .push_bind(i64::try_from(query.pagination.offset()).unwrap_or(i64::MAX));

        let rows: Vec<CapitalCallRow> = qb.build_query_as().fetch_all(&mut *tx).await?;
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut breakdowns = load_breakdowns(&mut tx, &ids).await?;
        tx.commit().await?;

        let items = rows
            .into_iter()
            .map(|row| {
                let owned = breakdowns.remove(&row.id).unwrap_or_default();
                row.try_into_capital_call(owned)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Page {
            items,
            page: query.pagination.page_or_default(),
            size,
            total: total.max(0) as u64,
        })
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filters: &[SearchFilter]) {
    for filter in filters {
        match filter {
            SearchFilter::BatchIdContains(s) => {
                qb.push(" AND strpos(batch_id, ").push_bind(s.clone()).push(") > 0");
            }
            SearchFilter::ReferenceContains(s) => {
                qb.push(" AND strpos(reference_id, ")
                    .push_bind(s.clone())
                    .push(") > 0");
            }
            SearchFilter::WorkflowStatus(status) => {
                qb.push(" AND workflow_status = ").push_bind(status.as_str());
            }
            SearchFilter::ClientNameContains(s) => {
                qb.push(" AND strpos(lower(client_name), lower(")
                    .push_bind(s.clone())
                    .push(")) > 0");
            }
            SearchFilter::FromDateOnOrAfter(d) => {
                qb.push(" AND from_date >= ").push_bind(*d);
            }
            SearchFilter::ToDateOnOrBefore(d) => {
                qb.push(" AND to_date <= ").push_bind(*d);
            }
            SearchFilter::DayType(s) => {
                qb.push(" AND day_type = ").push_bind(s.clone());
            }
            SearchFilter::Queue(q) => {
                qb.push(" AND queue = ").push_bind(q.as_str());
            }
            SearchFilter::LockedBy(s) => {
                qb.push(" AND locked_by = ").push_bind(s.clone());
            }
        }
    }
}

fn sort_column(field: SortField) -> &'static str {
    match field {
        SortField::BatchId => "batch_id",
        SortField::TotalAmount => "total_amount",
        SortField::FromDate => "from_date",
        SortField::ToDate => "to_date",
        SortField::CreatedAt => "created_at",
        SortField::WorkflowStatus => "workflow_status",
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[derive(sqlx::FromRow)]
struct CapitalCallRow {
    id: Uuid,
    batch_id: String,
    from_date: Option<NaiveDate>,
    to_date: Option<NaiveDate>,
    day_type: Option<String>,
    total_amount: Decimal,
    workflow_status: String,
    queue: String,
    locked_by: Option<String>,
    locked_at: Option<DateTime<Utc>>,
    client_name: Option<String>,
    asset_description: Option<String>,
    reference_id: Option<String>,
    is_sensitive: bool,
    version: i64,
    created_at: DateTime<Utc>,
    created_by: String,
    modified_at: Option<DateTime<Utc>>,
    modified_by: Option<String>,
}

impl CapitalCallRow {
    fn try_into_capital_call(self, breakdowns: Vec<Breakdown>) -> Result<CapitalCall> {
        let lock = match (self.locked_by, self.locked_at) {
            (Some(holder), Some(acquired_at)) => Some(Lock {
                holder,
                acquired_at,
            }),
            _ => None,
        };
        Ok(CapitalCall {
            id: CapitalCallId(self.id),
            batch_id: self.batch_id,
            from_date: self.from_date,
            to_date: self.to_date,
            day_type: self.day_type,
            total_amount: self.total_amount,
            workflow_status: self.workflow_status.parse()?,
            queue: self.queue.parse()?,
            lock,
            client_name: self.client_name,
            asset_description: self.asset_description,
            reference_id: self.reference_id,
            is_sensitive: self.is_sensitive,
            breakdowns,
            version: self.version,
            audit: Audit {
                created_at: self.created_at,
                created_by: self.created_by,
                modified_at: self.modified_at,
                modified_by: self.modified_by,
            },
        })
    }
}

#[derive(sqlx::FromRow)]
struct BreakdownRow {
    capital_call_id: Uuid,
    category: String,
    percentage: Decimal,
    calculated_amount: Option<Decimal>,
}

impl BreakdownRow {
    fn try_into_breakdown(self) -> Result<Breakdown> {
        Ok(Breakdown {
            category: self.category.parse()?,
            percentage: self.percentage,
            calculated_amount: self.calculated_amount,
        })
    }
}
