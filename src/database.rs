//! database (db) union structure.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::FromRef;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::AppState;
use crate::config::Schema;
use crate::error::{Result, ServerError};

pub const DEFAULT_CREDENTIALS: &str = "postgres";
pub const DEFAULT_DATABASE_NAME: &str = "ftpadmin";
pub const DEFAULT_POOL_SIZE: u32 = 10;
pub const DEFAULT_STATEMENT_TIMEOUT_SECS: u64 = 5;

/// One of the two logical daemon tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Users,
    Groups,
}

impl Table {
    pub fn resolve<'a>(&self, schema: &'a Schema) -> &'a str {
        match self {
            Table::Users => &schema.table_users,
            Table::Groups => &schema.table_groups,
        }
    }
}

/// A bindable probe value for [`Database::check_exists`].
#[derive(Debug, Clone, Copy)]
pub enum Value<'a> {
    Int(i64),
    Text(&'a str),
}

/// Custom db structure to pass to Axum.
#[derive(Clone)]
pub struct Database {
    pub postgres: PgPool,
    pub schema: Arc<Schema>,
    timeout: Duration,
}

impl Database {
    /// Init database connections.
    pub async fn new(
        hostname: &str,
        username: &str,
        password: &str,
        db: &str,
        pool: u32,
        schema: Schema,
        timeout_secs: u64,
    ) -> Result<Self> {
        let addr = format!("postgres://{username}:{password}@{hostname}/{db}");
        let pool = PgPoolOptions::new().max_connections(pool);
        let postgres = pool.connect(&addr).await?;

        tracing::info!(%hostname, %db, "postgres connected");

        Ok(Self {
            postgres,
            schema: Arc::new(schema),
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// Run a storage future under the configured statement timeout so a
    /// stalled connection surfaces as an error instead of hanging the
    /// request.
    pub(crate) async fn bounded<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(ServerError::from),
            Err(_) => Err(ServerError::StorageTimeout(self.timeout.as_secs())),
        }
    }

    /// Generalized existence probe: does `table` hold a row whose
    /// `field` equals `value`?
    pub async fn check_exists(
        &self,
        table: Table,
        field: &str,
        value: Value<'_>,
    ) -> Result<bool> {
        let query = format!(
            "SELECT 1 FROM {} WHERE {field} = $1 LIMIT 1",
            table.resolve(&self.schema)
        );

        let row = match value {
            Value::Int(int) => {
                self.bounded(
                    sqlx::query(&query).bind(int).fetch_optional(&self.postgres),
                )
                .await?
            },
            Value::Text(text) => {
                self.bounded(
                    sqlx::query(&query)
                        .bind(text)
                        .fetch_optional(&self.postgres),
                )
                .await?
            },
        };

        Ok(row.is_some())
    }
}

impl FromRef<AppState> for Database {
    fn from_ref(app_state: &AppState) -> Database {
        app_state.db.clone()
    }
}
