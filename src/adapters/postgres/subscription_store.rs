//! PostgreSQL implementation of `SubscriptionStore`.
//!
//! Every unit of work is one database transaction. Subscription rows are
//! read with `SELECT ... FOR UPDATE`, so two units of work touching the
//! same subscription serialize on the row lock. Dropping a
//! `PostgresUnitOfWork` without committing rolls the transaction back.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::domain::foundation::{
    DomainError, ErrorCode, EventId, PaymentId, PlanId, SubscriptionId, Timestamp, UserId,
};
use crate::domain::subscription::{
    Plan, PlanStatus, ProcessedEvent, Subscription, SubscriptionStatus,
};
use crate::ports::{
    PlanCatalog, ProcessedEventLedger, SubscriptionRepository, SubscriptionStore, UnitOfWork,
};

/// Primary key constraint of the processed-event ledger.
const PROCESSED_EVENTS_PKEY: &str = "processed_events_pkey";

/// PostgreSQL-backed subscription store.
#[derive(Clone)]
pub struct PostgresSubscriptionStore {
    pool: PgPool,
}

impl PostgresSubscriptionStore {
    /// Creates a store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a pool from configuration.
    ///
    /// Each connection gets a `lock_timeout`, so a unit of work waiting on a
    /// subscription row lock fails instead of hanging.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DomainError> {
        let options = PgConnectOptions::from_str(&config.url)
            .map_err(|e| DomainError::database(format!("Invalid database URL: {}", e)))?
            .options([(
                "lock_timeout",
                format!("{}ms", config.lock_timeout().as_millis()),
            )]);

        let pool = PgPoolOptions::new()
            .min_connections(config.min_connections)
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .idle_timeout(config.idle_timeout())
            .connect_with(options)
            .await
            .map_err(|e| DomainError::database(format!("Failed to connect to database: {}", e)))?;

        tracing::info!(
            max_connections = config.max_connections,
            "Connected to subscription database"
        );
        Ok(Self { pool })
    }

    /// Applies pending schema migrations.
    pub async fn migrate(&self) -> Result<(), DomainError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Migration failed: {}", e)))?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SubscriptionStore for PostgresSubscriptionStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, DomainError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DomainError::database(format!("Failed to begin transaction: {}", e)))?;
        Ok(Box::new(PostgresUnitOfWork { tx }))
    }
}

/// An open transaction against the subscription schema.
pub struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Row mapping
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, sqlx::FromRow)]
struct PlanRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    amount: Decimal,
    currency: String,
    period_days: i32,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PlanRow> for Plan {
    type Error = DomainError;

    fn try_from(row: PlanRow) -> Result<Self, Self::Error> {
        let status = PlanStatus::parse(&row.status).ok_or_else(|| {
            DomainError::database(format!("Invalid plan status value: {}", row.status))
        })?;
        let period_days = u32::try_from(row.period_days).map_err(|_| {
            DomainError::database(format!("Invalid period_days value: {}", row.period_days))
        })?;

        Ok(Plan {
            id: PlanId::from_uuid(row.id),
            name: row.name,
            description: row.description,
            amount: row.amount,
            currency: row.currency,
            period_days,
            status,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    user_id: Uuid,
    plan_id: Uuid,
    status: String,
    payment_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let status = SubscriptionStatus::parse(&row.status).ok_or_else(|| {
            DomainError::database(format!("Invalid subscription status value: {}", row.status))
        })?;

        Ok(Subscription {
            id: SubscriptionId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            plan_id: PlanId::from_uuid(row.plan_id),
            status,
            payment_id: row.payment_id.map(PaymentId::from_uuid),
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

fn db_error(context: &str, e: sqlx::Error) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, format!("{}: {}", context, e))
}

// ════════════════════════════════════════════════════════════════════════════════
// Ports
// ════════════════════════════════════════════════════════════════════════════════

#[async_trait]
impl PlanCatalog for PostgresUnitOfWork {
    async fn find_plan(&mut self, id: &PlanId) -> Result<Option<Plan>, DomainError> {
        let row: Option<PlanRow> = sqlx::query_as(
            r#"
            SELECT id, name, description, amount, currency, period_days, status,
                   created_at, updated_at
            FROM plans
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to fetch plan", e))?;

        row.map(Plan::try_from).transpose()
    }
}

#[async_trait]
impl SubscriptionRepository for PostgresUnitOfWork {
    async fn find_for_update(
        &mut self,
        id: &SubscriptionId,
    ) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, plan_id, status, payment_id, created_at, updated_at
            FROM subscriptions
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to fetch subscription", e))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn insert(&mut self, subscription: &Subscription) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, user_id, plan_id, status, payment_id, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.user_id.as_uuid())
        .bind(subscription.plan_id.as_uuid())
        .bind(subscription.status.as_str())
        .bind(subscription.payment_id.map(|p| *p.as_uuid()))
        .bind(subscription.created_at.as_datetime())
        .bind(subscription.updated_at.as_datetime())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to insert subscription", e))?;

        Ok(())
    }

    async fn update(&mut self, subscription: &Subscription) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions SET
                status = $2,
                payment_id = $3,
                updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.status.as_str())
        .bind(subscription.payment_id.map(|p| *p.as_uuid()))
        .bind(subscription.updated_at.as_datetime())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to update subscription", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::SubscriptionNotFound,
                format!("Subscription not found: {}", subscription.id),
            ));
        }

        Ok(())
    }

    async fn list_by_user(&mut self, user_id: &UserId) -> Result<Vec<Subscription>, DomainError> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, plan_id, status, payment_id, created_at, updated_at
            FROM subscriptions
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to list subscriptions", e))?;

        rows.into_iter().map(Subscription::try_from).collect()
    }
}

#[async_trait]
impl ProcessedEventLedger for PostgresUnitOfWork {
    async fn contains(&mut self, event_id: &EventId) -> Result<bool, DomainError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM processed_events WHERE id = $1)")
                .bind(event_id.as_uuid())
                .fetch_one(&mut *self.tx)
                .await
                .map_err(|e| db_error("Failed to check processed event", e))?;

        Ok(exists)
    }

    async fn record(&mut self, event: &ProcessedEvent) -> Result<(), DomainError> {
        sqlx::query("INSERT INTO processed_events (id, processed_at) VALUES ($1, $2)")
            .bind(event.id.as_uuid())
            .bind(event.processed_at.as_datetime())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(db_err) = &e {
                    if db_err.constraint() == Some(PROCESSED_EVENTS_PKEY) {
                        return DomainError::new(
                            ErrorCode::DuplicateEvent,
                            format!("Event {} already recorded", event.id),
                        );
                    }
                }
                db_error("Failed to record processed event", e)
            })?;

        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        self.tx
            .commit()
            .await
            .map_err(|e| db_error("Failed to commit transaction", e))
    }
}
