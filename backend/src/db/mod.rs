pub mod schema;

use anyhow::Context;
use sqlx::AnyPool;
use sqlx::any::AnyPoolOptions;
use tracing::info;

/// Pool shared by the quote series, trading sessions and signal records.
#[derive(Clone)]
pub struct Db {
    pub pool: AnyPool,
}

impl Db {
    /// Connects and brings the schema up to date.
    pub async fn open(database_url: &str) -> anyhow::Result<Self> {
        sqlx::any::install_default_drivers();

        // SQLite has a single writer.
        let max_connections = if database_url.starts_with("sqlite:") { 4 } else { 16 };

        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .with_context(|| format!("connecting to {database_url}"))?;

        schema::migrate(&pool).await.context("running migrations")?;
        info!(max_connections, "database ready");

        Ok(Self { pool })
    }
}
