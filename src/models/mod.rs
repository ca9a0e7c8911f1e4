//! # Data Models
//!
//! This module contains all the SeaORM entity models used throughout
//! Patreonizer.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod campaign;
pub mod connected_account;
pub mod patron;
pub mod post;
pub mod revenue_snapshot;
pub mod sync_run;
pub mod user;

pub use campaign::Entity as Campaign;
pub use connected_account::Entity as ConnectedAccount;
pub use patron::Entity as Patron;
pub use post::Entity as Post;
pub use revenue_snapshot::Entity as RevenueSnapshot;
pub use sync_run::Entity as SyncRun;
pub use user::Entity as User;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "patreonizer".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
