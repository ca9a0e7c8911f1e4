//! Database migrations for Patreonizer.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2026_01_10_000100_create_users;
mod m2026_01_10_000200_create_connected_accounts;
mod m2026_01_10_000300_create_campaigns;
mod m2026_01_10_000400_create_patrons;
mod m2026_01_10_000500_create_posts;
mod m2026_01_10_000600_create_revenue_snapshots;
mod m2026_01_10_000700_create_sync_runs;
mod m2026_01_12_000100_add_sync_run_active_guard;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2026_01_10_000100_create_users::Migration),
            Box::new(m2026_01_10_000200_create_connected_accounts::Migration),
            Box::new(m2026_01_10_000300_create_campaigns::Migration),
            Box::new(m2026_01_10_000400_create_patrons::Migration),
            Box::new(m2026_01_10_000500_create_posts::Migration),
            Box::new(m2026_01_10_000600_create_revenue_snapshots::Migration),
            Box::new(m2026_01_10_000700_create_sync_runs::Migration),
            Box::new(m2026_01_12_000100_add_sync_run_active_guard::Migration),
        ]
    }
}
