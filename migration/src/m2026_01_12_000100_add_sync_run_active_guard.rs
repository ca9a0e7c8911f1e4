//! Adds a partial unique index preventing two in-progress sync runs for the
//! same campaign. This makes the per-campaign mutual exclusion durable across
//! process restarts and multiple server instances; the in-memory guard set is
//! only the fast path.

use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::{DatabaseBackend, Statement};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();
        match backend {
            DatabaseBackend::Postgres => manager
                .get_connection()
                .execute(Statement::from_string(
                    backend,
                    "DO $$\nBEGIN\n    IF NOT EXISTS (\n        SELECT 1 FROM pg_indexes\n        WHERE schemaname = current_schema()\n          AND indexname = 'idx_sync_runs_active_per_campaign'\n    ) THEN\n        CREATE UNIQUE INDEX idx_sync_runs_active_per_campaign\n            ON sync_runs (campaign_id)\n            WHERE status = 'in_progress';\n    END IF;\nEND\n$$;"
                        .to_string(),
                ))
                .await
                .map(|_| ()),
            _ => manager
                .get_connection()
                .execute(Statement::from_string(
                    backend,
                    "CREATE UNIQUE INDEX IF NOT EXISTS idx_sync_runs_active_per_campaign \
                     ON sync_runs (campaign_id) \
                     WHERE status = 'in_progress'"
                        .to_string(),
                ))
                .await
                .map(|_| ()),
        }
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "DROP INDEX IF EXISTS idx_sync_runs_active_per_campaign",
            ))
            .await
            .map(|_| ())
    }
}
