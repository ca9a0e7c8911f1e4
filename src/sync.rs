//! Sync Orchestrator
//!
//! Runs the full campaign synchronization pipeline: claim the campaign,
//! refresh credentials, page through members and posts, recompute
//! aggregates, and write the daily revenue snapshot. Each run is a
//! detached tokio task reporting progress through its SyncRun row.
//!
//! Concurrency control is two-layered: an in-memory set of campaign ids
//! rejects duplicate triggers on this instance, and the partial unique
//! index on sync_runs(campaign_id) WHERE status = 'in_progress' rejects
//! them across instances.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use chrono::Utc;
use metrics::{counter, histogram};
use scopeguard::defer;
use sea_orm::Set;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::error::ApiError;
use crate::models::{campaign, connected_account, revenue_snapshot, sync_run};
use crate::patreon::mapping::{map_patron, map_post};
use crate::patreon::resource::Document;
use crate::patreon::{PatreonApi, PatreonError};
use crate::repositories::{
    CampaignRepository, ConnectedAccountRepository, PatronRepository, PostRepository,
    RevenueSnapshotRepository, SyncRunRepository,
};
use crate::repositories::sync_run::ClaimOutcome;

/// Refresh the access token when it expires within this window.
const TOKEN_EXPIRY_MARGIN_SECONDS: i64 = 60;

/// Which resource collection a page fetch belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Members,
    Posts,
}

enum PageError {
    Timeout,
    Patreon(PatreonError),
}

/// Orchestrates sync runs across campaigns.
#[derive(Clone)]
pub struct SyncService {
    api: Arc<dyn PatreonApi>,
    accounts: ConnectedAccountRepository,
    campaigns: CampaignRepository,
    patrons: PatronRepository,
    posts: PostRepository,
    snapshots: RevenueSnapshotRepository,
    runs: SyncRunRepository,
    config: SyncConfig,
    active_campaigns: Arc<Mutex<HashSet<Uuid>>>,
}

impl SyncService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        api: Arc<dyn PatreonApi>,
        accounts: ConnectedAccountRepository,
        campaigns: CampaignRepository,
        patrons: PatronRepository,
        posts: PostRepository,
        snapshots: RevenueSnapshotRepository,
        runs: SyncRunRepository,
        config: SyncConfig,
    ) -> Self {
        Self {
            api,
            accounts,
            campaigns,
            patrons,
            posts,
            snapshots,
            runs,
            config,
            active_campaigns: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Trigger a sync for one campaign. Returns the pending run immediately;
    /// the work continues as a detached task. A campaign already syncing is
    /// rejected with 409.
    pub async fn trigger_campaign(
        &self,
        user_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<sync_run::Model, ApiError> {
        let campaign = self
            .campaigns
            .get_owned(user_id, campaign_id)
            .await?
            .ok_or_else(|| crate::error::not_found("Campaign not found"))?;

        self.start_run(campaign).await
    }

    /// Trigger syncs for every campaign under one connected account.
    /// Campaigns already syncing are skipped rather than failing the batch.
    pub async fn trigger_account(
        &self,
        user_id: Uuid,
        account_id: Uuid,
    ) -> Result<Vec<sync_run::Model>, ApiError> {
        let account = self
            .accounts
            .get_owned(user_id, account_id)
            .await?
            .ok_or_else(|| crate::error::not_found("Connected account not found"))?;

        self.start_for_account(&account).await
    }

    /// Trigger syncs for every campaign across all of the user's accounts.
    pub async fn trigger_all(&self, user_id: Uuid) -> Result<Vec<sync_run::Model>, ApiError> {
        let mut runs = Vec::new();
        for account in self.accounts.list_for_user(user_id).await? {
            runs.extend(self.start_for_account(&account).await?);
        }
        Ok(runs)
    }

    async fn start_for_account(
        &self,
        account: &connected_account::Model,
    ) -> Result<Vec<sync_run::Model>, ApiError> {
        let mut runs = Vec::new();
        for campaign in self.campaigns.list_for_account(account.id).await? {
            let campaign_id = campaign.id;
            match self.start_run(campaign).await {
                Ok(run) => runs.push(run),
                Err(err) if err.status == StatusCode::CONFLICT => {
                    debug!(%campaign_id, "Skipping campaign already being synced");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(runs)
    }

    /// Claim the in-memory guard, record the pending run, and spawn the
    /// worker. The guard entry is owned by the worker from the moment the
    /// task is spawned.
    async fn start_run(&self, campaign: campaign::Model) -> Result<sync_run::Model, ApiError> {
        let already_running = {
            let mut active = self.active_campaigns.lock().await;
            !active.insert(campaign.id)
        };
        if already_running {
            return Err(sync_in_progress_error(campaign.id));
        }

        // The durable check catches runs started by another instance.
        match self.runs.has_in_progress(campaign.id).await {
            Ok(true) => {
                self.active_campaigns.lock().await.remove(&campaign.id);
                return Err(sync_in_progress_error(campaign.id));
            }
            Ok(false) => {}
            Err(err) => {
                self.active_campaigns.lock().await.remove(&campaign.id);
                return Err(err.into());
            }
        }

        let run = match self.runs.create_pending(campaign.id).await {
            Ok(run) => run,
            Err(err) => {
                self.active_campaigns.lock().await.remove(&campaign.id);
                return Err(err.into());
            }
        };

        counter!("sync_runs_triggered_total").increment(1);

        let service = self.clone();
        let run_id = run.id;
        tokio::spawn(async move {
            service.run_worker(run_id, campaign).await;
        });

        Ok(run)
    }

    /// Worker wrapper: watchdog timeout, terminal status transitions, and
    /// guaranteed guard release.
    #[instrument(skip(self, campaign), fields(run_id = %run_id, campaign_id = %campaign.id))]
    async fn run_worker(&self, run_id: Uuid, campaign: campaign::Model) {
        let campaign_id = campaign.id;
        let active = self.active_campaigns.clone();
        defer! {
            // The worker owns the guard entry; release it on every path.
            if let Ok(mut set) = active.try_lock() {
                set.remove(&campaign_id);
            } else {
                let active = active.clone();
                tokio::spawn(async move {
                    active.lock().await.remove(&campaign_id);
                });
            }
        }

        match self.runs.mark_in_progress(run_id).await {
            Ok(ClaimOutcome::Claimed(_)) => {}
            Ok(ClaimOutcome::AlreadyRunning) => {
                warn!("Campaign claimed by a concurrent run, abandoning");
                self.finish_failed(run_id, "Campaign is already being synced by another run")
                    .await;
                return;
            }
            Err(err) => {
                error!(error = %err, "Failed to transition run to in_progress");
                self.finish_failed(run_id, &err.to_string()).await;
                return;
            }
        }

        let started = std::time::Instant::now();
        let max_run = Duration::from_secs(self.config.max_run_seconds);
        let outcome = tokio::time::timeout(max_run, self.execute(run_id, &campaign)).await;

        histogram!("sync_run_duration_seconds").record(started.elapsed().as_secs_f64());

        match outcome {
            Ok(Ok(())) => {
                counter!("sync_runs_completed_total").increment(1);
                info!(elapsed_secs = started.elapsed().as_secs(), "Sync run completed");
            }
            Ok(Err(err)) => {
                counter!("sync_runs_failed_total").increment(1);
                warn!(error = %err, "Sync run failed");
                self.finish_failed(run_id, &format!("{:#}", err)).await;
            }
            Err(_) => {
                counter!("sync_runs_failed_total").increment(1);
                warn!(max_run_seconds = self.config.max_run_seconds, "Sync run timed out");
                self.finish_failed(
                    run_id,
                    &format!(
                        "Sync exceeded the maximum run duration of {} seconds",
                        self.config.max_run_seconds
                    ),
                )
                .await;
            }
        }
    }

    async fn finish_failed(&self, run_id: Uuid, message: &str) {
        if let Err(err) = self.runs.mark_failed(run_id, message).await {
            error!(error = %err, "Failed to record sync run failure");
        }
    }

    /// The sync pipeline proper. Any error propagates to the worker, which
    /// records the failure; rows upserted so far are kept.
    async fn execute(&self, run_id: Uuid, campaign: &campaign::Model) -> anyhow::Result<()> {
        let mut access_token = self.fresh_access_token(campaign.account_id).await?;

        // Member phase: progress 0..=50.
        let mut cursor: Option<String> = None;
        let mut processed: i32 = 0;
        let mut member_total: i32 = 0;
        loop {
            let document = self
                .fetch_page_with_retry(
                    Phase::Members,
                    campaign,
                    &mut access_token,
                    cursor.as_deref(),
                )
                .await?;

            let included = document.included_index();
            let resources = document.resources();
            processed += resources.len() as i32;
            member_total = (document.total().unwrap_or(0) as i32).max(processed);

            for member in resources {
                let model = map_patron(campaign.id, &campaign.currency, member, &included)?;
                self.patrons.upsert(model).await?;
            }

            let progress = if member_total > 0 {
                (processed * 50 / member_total).min(50)
            } else {
                50
            };
            self.runs
                .update_progress(run_id, progress, member_total, processed)
                .await?;

            cursor = document.next_cursor();
            if cursor.is_none() {
                break;
            }
        }

        // Post phase: progress 50..=100.
        let mut post_cursor: Option<String> = None;
        let mut post_processed: i32 = 0;
        let mut post_total: i32 = 0;
        loop {
            let document = self
                .fetch_page_with_retry(
                    Phase::Posts,
                    campaign,
                    &mut access_token,
                    post_cursor.as_deref(),
                )
                .await?;

            let resources = document.resources();
            post_processed += resources.len() as i32;
            post_total = (document.total().unwrap_or(0) as i32).max(post_processed);

            for post in resources {
                let model = map_post(campaign.id, post)?;
                self.posts.upsert(model).await?;
            }

            let progress = if post_total > 0 {
                (50 + post_processed * 50 / post_total).min(100)
            } else {
                100
            };
            self.runs
                .update_progress(
                    run_id,
                    progress,
                    member_total + post_total,
                    processed + post_processed,
                )
                .await?;

            post_cursor = document.next_cursor();
            if post_cursor.is_none() {
                break;
            }
        }

        // Aggregates from what is now persisted, not from API counters.
        let aggregates = self.patrons.aggregates(campaign.id).await?;
        self.campaigns
            .update_aggregates(campaign.id, aggregates.patron_count, aggregates.pledge_sum_cents)
            .await?;

        self.write_snapshot(campaign.id, aggregates.patron_count, aggregates.pledge_sum_cents)
            .await?;

        self.runs.mark_completed(run_id).await?;
        self.campaigns.mark_synced(campaign.id).await?;

        counter!("sync_patrons_processed_total").increment(processed.max(0) as u64);
        counter!("sync_posts_processed_total").increment(post_processed.max(0) as u64);

        Ok(())
    }

    /// Upsert today's revenue snapshot, diffing the active patron id set
    /// against the previous snapshot to fill new/lost counts. The first
    /// snapshot counts every active patron as new.
    async fn write_snapshot(
        &self,
        campaign_id: Uuid,
        patron_count: i32,
        pledge_sum_cents: i64,
    ) -> anyhow::Result<()> {
        let today = Utc::now().date_naive();
        let current_ids = self.patrons.active_external_ids(campaign_id).await?;
        let current_set: HashSet<&str> = current_ids.iter().map(String::as_str).collect();

        let previous = self.snapshots.latest_before(campaign_id, today).await?;
        let previous_ids: HashSet<String> = previous
            .as_ref()
            .and_then(|snapshot| snapshot.patron_ids.as_ref())
            .and_then(|value| serde_json::from_value::<Vec<String>>(value.clone()).ok())
            .unwrap_or_default()
            .into_iter()
            .collect();

        let (new_patrons, lost_patrons) = if previous.is_some() {
            let new = current_set
                .iter()
                .filter(|id| !previous_ids.contains(**id))
                .count() as i32;
            let lost = previous_ids
                .iter()
                .filter(|id| !current_set.contains(id.as_str()))
                .count() as i32;
            (new, lost)
        } else {
            (current_set.len() as i32, 0)
        };

        let now = Utc::now();
        self.snapshots
            .upsert(revenue_snapshot::ActiveModel {
                id: Set(Uuid::new_v4()),
                campaign_id: Set(campaign_id),
                date: Set(today),
                patron_count: Set(patron_count),
                pledge_sum_cents: Set(pledge_sum_cents),
                new_patrons: Set(new_patrons),
                lost_patrons: Set(lost_patrons),
                patron_ids: Set(Some(serde_json::to_value(&current_ids)?)),
                created_at: Set(now.into()),
                updated_at: Set(now.into()),
            })
            .await?;

        Ok(())
    }

    /// One page fetch under the per-page timeout, with a single
    /// refresh-and-retry on 401. A second 401 propagates.
    async fn fetch_page_with_retry(
        &self,
        phase: Phase,
        campaign: &campaign::Model,
        access_token: &mut String,
        cursor: Option<&str>,
    ) -> anyhow::Result<Document> {
        match self.fetch_page(phase, campaign, access_token, cursor).await {
            Ok(document) => Ok(document),
            Err(PageError::Timeout) => anyhow::bail!(
                "Page fetch timed out after {} seconds",
                self.config.page_timeout_seconds
            ),
            Err(PageError::Patreon(PatreonError::Unauthorized)) => {
                debug!("Access token rejected, refreshing and retrying once");
                *access_token = self.refresh_and_persist(campaign.account_id).await?;
                match self.fetch_page(phase, campaign, access_token, cursor).await {
                    Ok(document) => Ok(document),
                    Err(PageError::Timeout) => anyhow::bail!(
                        "Page fetch timed out after {} seconds",
                        self.config.page_timeout_seconds
                    ),
                    Err(PageError::Patreon(err)) => Err(err.into()),
                }
            }
            Err(PageError::Patreon(err)) => Err(err.into()),
        }
    }

    async fn fetch_page(
        &self,
        phase: Phase,
        campaign: &campaign::Model,
        access_token: &str,
        cursor: Option<&str>,
    ) -> Result<Document, PageError> {
        let timeout = Duration::from_secs(self.config.page_timeout_seconds);
        let fetch = async {
            match phase {
                Phase::Members => {
                    self.api
                        .fetch_campaign_members(
                            access_token,
                            &campaign.external_campaign_id,
                            cursor,
                        )
                        .await
                }
                Phase::Posts => {
                    self.api
                        .fetch_campaign_posts(access_token, &campaign.external_campaign_id, cursor)
                        .await
                }
            }
        };

        match tokio::time::timeout(timeout, fetch).await {
            Ok(Ok(document)) => Ok(document),
            Ok(Err(err)) => Err(PageError::Patreon(err)),
            Err(_) => Err(PageError::Timeout),
        }
    }

    /// Access token for the account, proactively refreshed when the stored
    /// expiry is inside the margin. The rotated pair is persisted before the
    /// token is returned.
    async fn fresh_access_token(&self, account_id: Uuid) -> anyhow::Result<String> {
        let account = self
            .accounts
            .get_by_id(account_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Connected account '{}' not found", account_id))?;

        let (access, _refresh) = self.accounts.decrypt_tokens(&account)?;

        let expires_soon = account
            .token_expires_at
            .map(|expiry| {
                expiry.to_utc() - Utc::now()
                    < chrono::Duration::seconds(TOKEN_EXPIRY_MARGIN_SECONDS)
            })
            .unwrap_or(true);

        match access {
            Some(token) if !expires_soon => Ok(token),
            _ => self.refresh_and_persist(account_id).await,
        }
    }

    /// Refresh-token grant with durable persistence of the rotated pair.
    /// Failure is a hard error that fails the run.
    async fn refresh_and_persist(&self, account_id: Uuid) -> anyhow::Result<String> {
        let account = self
            .accounts
            .get_by_id(account_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Connected account '{}' not found", account_id))?;

        let (_access, refresh) = self.accounts.decrypt_tokens(&account)?;
        let refresh = refresh.ok_or_else(|| {
            anyhow::anyhow!("Connected account '{}' has no refresh token", account_id)
        })?;

        let tokens = self.api.refresh_token(&refresh).await.map_err(|err| {
            counter!("token_refresh_failed_total").increment(1);
            anyhow::anyhow!("Token refresh failed: {}", err)
        })?;

        // Persist before handing the token out so a crash cannot lose the
        // rotated refresh token.
        self.accounts.apply_token_refresh(account_id, &tokens).await?;
        counter!("token_refresh_total").increment(1);

        Ok(tokens.access_token)
    }
}

impl SyncService {
    /// Background reaper: periodically fails in_progress runs whose
    /// started_at is older than twice the maximum run duration. The worker
    /// watchdog handles runs on this instance; the reaper catches runs
    /// orphaned by a crashed one.
    pub async fn run_reaper(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        info!("Starting stale sync run reaper");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Stale sync run reaper shutting down");
                    return;
                }
                _ = ticker.tick() => {}
            }

            let cutoff =
                Utc::now() - chrono::Duration::seconds(2 * self.config.max_run_seconds as i64);
            match self.runs.fail_stale(cutoff).await {
                Ok(failed) if !failed.is_empty() => {
                    counter!("sync_runs_reaped_total").increment(failed.len() as u64);
                    warn!(count = failed.len(), ?failed, "Failed stale sync runs");
                }
                Ok(_) => {}
                Err(err) => error!(error = %err, "Stale run sweep failed"),
            }
        }
    }
}

fn sync_in_progress_error(campaign_id: Uuid) -> ApiError {
    ApiError::new(
        StatusCode::CONFLICT,
        "SYNC_ALREADY_RUNNING",
        "A sync is already in progress for this campaign",
    )
    .with_details(serde_json::json!({ "campaign_id": campaign_id }))
}
