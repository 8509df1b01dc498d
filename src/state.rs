use crate::backup::tool::{DumpTool, PgTools};
use crate::config::AppConfig;
use crate::storage::{ProofStore, S3Bucket};
use anyhow::Context;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub proofs: ProofStore,
    pub dump_tool: Arc<dyn DumpTool>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        let proofs = ProofStore::new(Arc::new(S3Bucket::connect(&config).await));

        let dump_tool = Arc::new(PgTools::from_url(
            &config.backup.pg_dump_bin,
            &config.backup.psql_bin,
            &config.database_url,
        )?) as Arc<dyn DumpTool>;

        Ok(Self {
            db,
            config,
            proofs,
            dump_tool,
        })
    }
}
