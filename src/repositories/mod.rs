//! Persistence gateway: repository structs wrapping SeaORM operations.
//!
//! All upserts are idempotent on their documented natural keys (second
//! application wins), and every list/aggregate query is scoped through the
//! requesting user's connected accounts.

pub mod campaign;
pub mod connected_account;
pub mod metrics;
pub mod patron;
pub mod post;
pub mod revenue_snapshot;
pub mod sync_run;

pub use campaign::CampaignRepository;
pub use connected_account::ConnectedAccountRepository;
pub use metrics::MetricsRepository;
pub use patron::PatronRepository;
pub use post::PostRepository;
pub use revenue_snapshot::RevenueSnapshotRepository;
pub use sync_run::SyncRunRepository;
