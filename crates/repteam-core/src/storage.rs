//! Rep and sale persistence backends.
//!
//! `RepStoreConfig` selects between an in-memory store (default, carries the
//! test suite) and PostgreSQL. Both enforce handle uniqueness at the storage
//! layer: the duplicate-handle error from `insert_rep` is the authoritative
//! duplicate signal, so two near-simultaneous submissions for one handle
//! cannot both insert even though the pipeline's pre-check is not atomic
//! with the insert.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::RepError;
use crate::types::{Experience, NewRep, Rep, RepStatus, Sale, SaleKind};

/// Persistence backend configuration.
#[derive(Debug, Clone)]
pub enum RepStoreConfig {
    /// Keep reps and sales in process memory only.
    Memory,
    /// Persist in PostgreSQL, creating the schema on startup.
    Postgres {
        database_url: String,
        max_connections: u32,
    },
}

impl RepStoreConfig {
    pub fn memory() -> Self {
        Self::Memory
    }

    pub fn postgres(database_url: impl Into<String>, max_connections: u32) -> Self {
        Self::Postgres {
            database_url: database_url.into(),
            max_connections,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Postgres { .. } => "postgres",
        }
    }

    pub async fn bootstrap(self) -> Result<Arc<dyn RepStore>, RepError> {
        match self {
            Self::Memory => Ok(Arc::new(MemoryRepStore::new())),
            Self::Postgres {
                database_url,
                max_connections,
            } => {
                let store = PostgresRepStore::connect(&database_url, max_connections).await?;
                store.ensure_schema().await?;
                Ok(Arc::new(store))
            }
        }
    }
}

impl Default for RepStoreConfig {
    fn default() -> Self {
        Self::Memory
    }
}

/// Storage operations the pipeline and read views depend on.
///
/// Handles passed in are already normalized; stores do not re-normalize.
#[async_trait]
pub trait RepStore: Send + Sync {
    fn backend(&self) -> &'static str;

    async fn find_rep(&self, handle: &str) -> Result<Option<Rep>, RepError>;

    /// Insert a new pending application.
    ///
    /// Returns `RepError::DuplicateHandle` when the handle is already on
    /// file; callers treat that as the duplicate outcome.
    async fn insert_rep(&self, new_rep: NewRep) -> Result<Rep, RepError>;

    /// Look up a rep only if approved. Pending and rejected reps are
    /// indistinguishable from absent ones.
    async fn find_approved_rep(&self, handle: &str) -> Result<Option<Rep>, RepError>;

    /// All sales for one handle, newest first.
    async fn sales_for(&self, handle: &str) -> Result<Vec<Sale>, RepError>;

    async fn approved_reps(&self) -> Result<Vec<Rep>, RepError>;

    async fn all_sales(&self) -> Result<Vec<Sale>, RepError>;
}

fn rep_from_new(new_rep: NewRep) -> Rep {
    Rep {
        id: Uuid::new_v4(),
        handle: new_rep.handle,
        full_name: new_rep.full_name,
        phone: new_rep.phone,
        university: new_rep.university,
        promo_plan: new_rep.promo_plan,
        prev_experience: new_rep.prev_experience,
        status: RepStatus::Pending,
        applied_at: Utc::now(),
        approved_at: None,
        crm_contact_id: None,
    }
}

/// In-memory store. Enforces handle uniqueness under its write lock.
#[derive(Default)]
pub struct MemoryRepStore {
    reps: RwLock<HashMap<String, Rep>>,
    sales: RwLock<Vec<Sale>>,
}

impl MemoryRepStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a rep directly, bypassing the pipeline. Test seeding surface.
    pub async fn seed_rep(&self, rep: Rep) {
        self.reps.write().await.insert(rep.handle.clone(), rep);
    }

    /// Record a sale directly. Sales normally arrive from an external
    /// ingestion path, so the service itself never writes them.
    pub async fn seed_sale(&self, sale: Sale) {
        self.sales.write().await.push(sale);
    }

    pub async fn rep_count(&self) -> usize {
        self.reps.read().await.len()
    }
}

#[async_trait]
impl RepStore for MemoryRepStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn find_rep(&self, handle: &str) -> Result<Option<Rep>, RepError> {
        Ok(self.reps.read().await.get(handle).cloned())
    }

    async fn insert_rep(&self, new_rep: NewRep) -> Result<Rep, RepError> {
        let mut reps = self.reps.write().await;
        if reps.contains_key(&new_rep.handle) {
            return Err(RepError::DuplicateHandle(new_rep.handle));
        }
        let rep = rep_from_new(new_rep);
        reps.insert(rep.handle.clone(), rep.clone());
        Ok(rep)
    }

    async fn find_approved_rep(&self, handle: &str) -> Result<Option<Rep>, RepError> {
        Ok(self
            .reps
            .read()
            .await
            .get(handle)
            .filter(|rep| rep.status == RepStatus::Approved)
            .cloned())
    }

    async fn sales_for(&self, handle: &str) -> Result<Vec<Sale>, RepError> {
        let mut sales: Vec<Sale> = self
            .sales
            .read()
            .await
            .iter()
            .filter(|sale| sale.rep_handle == handle)
            .cloned()
            .collect();
        sales.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        Ok(sales)
    }

    async fn approved_reps(&self) -> Result<Vec<Rep>, RepError> {
        Ok(self
            .reps
            .read()
            .await
            .values()
            .filter(|rep| rep.status == RepStatus::Approved)
            .cloned()
            .collect())
    }

    async fn all_sales(&self) -> Result<Vec<Sale>, RepError> {
        Ok(self.sales.read().await.clone())
    }
}

/// PostgreSQL-backed store.
#[derive(Debug, Clone)]
pub struct PostgresRepStore {
    pool: PgPool,
}

impl PostgresRepStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, RepError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await
            .map_err(|e| RepError::Store(format!("postgres connect failed: {e}")))?;

        Ok(Self { pool })
    }

    pub async fn ensure_schema(&self) -> Result<(), RepError> {
        // Handle uniqueness lives here, not in the application pre-check.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS reps (
                id UUID PRIMARY KEY,
                handle TEXT NOT NULL UNIQUE,
                full_name TEXT NOT NULL,
                phone TEXT NOT NULL,
                university TEXT NULL,
                promo_plan TEXT NOT NULL,
                prev_experience TEXT NOT NULL,
                status TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL,
                approved_at TIMESTAMPTZ NULL,
                crm_contact_id TEXT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| RepError::Store(format!("postgres schema create failed: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sales (
                id UUID PRIMARY KEY,
                rep_handle TEXT NOT NULL,
                kind TEXT NOT NULL,
                quantity INTEGER NOT NULL CHECK (quantity > 0),
                amount BIGINT NULL,
                source TEXT NULL,
                external_order_id TEXT NULL,
                recorded_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| RepError::Store(format!("postgres schema create failed: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sales_rep_handle ON sales (rep_handle)")
            .execute(&self.pool)
            .await
            .map_err(|e| RepError::Store(format!("postgres index create failed: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_reps_status ON reps (status)")
            .execute(&self.pool)
            .await
            .map_err(|e| RepError::Store(format!("postgres index create failed: {e}")))?;

        Ok(())
    }

    fn rep_from_row(row: &sqlx::postgres::PgRow) -> Result<Rep, RepError> {
        let status_str: String = row
            .try_get("status")
            .map_err(|e| RepError::Store(format!("postgres decode status failed: {e}")))?;
        let experience_str: String = row
            .try_get("prev_experience")
            .map_err(|e| RepError::Store(format!("postgres decode prev_experience failed: {e}")))?;

        Ok(Rep {
            id: row
                .try_get("id")
                .map_err(|e| RepError::Store(format!("postgres decode id failed: {e}")))?,
            handle: row
                .try_get("handle")
                .map_err(|e| RepError::Store(format!("postgres decode handle failed: {e}")))?,
            full_name: row
                .try_get("full_name")
                .map_err(|e| RepError::Store(format!("postgres decode full_name failed: {e}")))?,
            phone: row
                .try_get("phone")
                .map_err(|e| RepError::Store(format!("postgres decode phone failed: {e}")))?,
            university: row
                .try_get("university")
                .map_err(|e| RepError::Store(format!("postgres decode university failed: {e}")))?,
            promo_plan: row
                .try_get("promo_plan")
                .map_err(|e| RepError::Store(format!("postgres decode promo_plan failed: {e}")))?,
            prev_experience: Experience::parse(&experience_str),
            status: RepStatus::parse(&status_str)?,
            applied_at: row
                .try_get("applied_at")
                .map_err(|e| RepError::Store(format!("postgres decode applied_at failed: {e}")))?,
            approved_at: row
                .try_get("approved_at")
                .map_err(|e| RepError::Store(format!("postgres decode approved_at failed: {e}")))?,
            crm_contact_id: row.try_get("crm_contact_id").map_err(|e| {
                RepError::Store(format!("postgres decode crm_contact_id failed: {e}"))
            })?,
        })
    }

    fn sale_from_row(row: &sqlx::postgres::PgRow) -> Result<Sale, RepError> {
        let kind_str: String = row
            .try_get("kind")
            .map_err(|e| RepError::Store(format!("postgres decode kind failed: {e}")))?;
        let quantity: i32 = row
            .try_get("quantity")
            .map_err(|e| RepError::Store(format!("postgres decode quantity failed: {e}")))?;

        Ok(Sale {
            id: row
                .try_get("id")
                .map_err(|e| RepError::Store(format!("postgres decode id failed: {e}")))?,
            rep_handle: row
                .try_get("rep_handle")
                .map_err(|e| RepError::Store(format!("postgres decode rep_handle failed: {e}")))?,
            kind: SaleKind::parse(&kind_str)?,
            quantity: quantity
                .try_into()
                .map_err(|_| RepError::Store("negative sale quantity in storage".to_string()))?,
            amount: row
                .try_get("amount")
                .map_err(|e| RepError::Store(format!("postgres decode amount failed: {e}")))?,
            source: row
                .try_get("source")
                .map_err(|e| RepError::Store(format!("postgres decode source failed: {e}")))?,
            external_order_id: row.try_get("external_order_id").map_err(|e| {
                RepError::Store(format!("postgres decode external_order_id failed: {e}"))
            })?,
            recorded_at: row
                .try_get("recorded_at")
                .map_err(|e| RepError::Store(format!("postgres decode recorded_at failed: {e}")))?,
        })
    }
}

#[async_trait]
impl RepStore for PostgresRepStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn find_rep(&self, handle: &str) -> Result<Option<Rep>, RepError> {
        let row = sqlx::query("SELECT * FROM reps WHERE handle = $1")
            .bind(handle)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepError::Store(format!("postgres lookup failed: {e}")))?;

        row.as_ref().map(Self::rep_from_row).transpose()
    }

    async fn insert_rep(&self, new_rep: NewRep) -> Result<Rep, RepError> {
        let rep = rep_from_new(new_rep);

        let result = sqlx::query(
            r#"
            INSERT INTO reps (
                id, handle, full_name, phone, university,
                promo_plan, prev_experience, status, applied_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(rep.id)
        .bind(&rep.handle)
        .bind(&rep.full_name)
        .bind(&rep.phone)
        .bind(&rep.university)
        .bind(&rep.promo_plan)
        .bind(rep.prev_experience.as_str())
        .bind(rep.status.as_str())
        .bind(rep.applied_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(rep),
            Err(err) => {
                let unique_violation = err
                    .as_database_error()
                    .map(|db| db.is_unique_violation())
                    .unwrap_or(false);
                if unique_violation {
                    Err(RepError::DuplicateHandle(rep.handle))
                } else {
                    Err(RepError::Store(format!("postgres insert failed: {err}")))
                }
            }
        }
    }

    async fn find_approved_rep(&self, handle: &str) -> Result<Option<Rep>, RepError> {
        let row = sqlx::query("SELECT * FROM reps WHERE handle = $1 AND status = 'approved'")
            .bind(handle)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepError::Store(format!("postgres lookup failed: {e}")))?;

        row.as_ref().map(Self::rep_from_row).transpose()
    }

    async fn sales_for(&self, handle: &str) -> Result<Vec<Sale>, RepError> {
        let rows = sqlx::query("SELECT * FROM sales WHERE rep_handle = $1 ORDER BY recorded_at DESC")
            .bind(handle)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepError::Store(format!("postgres load failed: {e}")))?;

        rows.iter().map(Self::sale_from_row).collect()
    }

    async fn approved_reps(&self) -> Result<Vec<Rep>, RepError> {
        let rows = sqlx::query("SELECT * FROM reps WHERE status = 'approved'")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepError::Store(format!("postgres load failed: {e}")))?;

        rows.iter().map(Self::rep_from_row).collect()
    }

    async fn all_sales(&self) -> Result<Vec<Sale>, RepError> {
        let rows = sqlx::query("SELECT * FROM sales")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepError::Store(format!("postgres load failed: {e}")))?;

        rows.iter().map(Self::sale_from_row).collect()
    }
}
