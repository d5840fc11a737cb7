//! Postgres-backed repository implementations.

mod news;
mod util;

pub use news::push_news_select;
pub use util::map_sqlx_error;

use std::time::Duration;

use apalis_sql::postgres::PostgresStorage;
use sqlx::{
    Postgres, Transaction,
    postgres::{PgPool, PgPoolOptions},
    migrate::MigrateError,
    query,
};

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: PgPool,
    timeout: Duration,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn begin(&self) -> Result<Transaction<'_, Postgres>, sqlx::Error> {
        self.pool.begin().await
    }

    pub async fn connect(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await
    }

    /// Apply the job queue tables and the item store schema.
    ///
    /// Both migrators share the `_sqlx_migrations` ledger, so each ignores the other's entries.
    pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrateError> {
        let mut queue = PostgresStorage::<()>::migrations();
        queue.set_ignore_missing(true);
        queue.run(pool).await?;

        let mut store = sqlx::migrate!("./migrations");
        store.set_ignore_missing(true);
        store.run(pool).await?;
        Ok(())
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }
}
