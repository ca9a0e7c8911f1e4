//! # Server Configuration
//!
//! This module contains the server setup and configuration for the
//! Patreonizer API: shared application state, the router with its
//! authentication and trace-context middleware, and the OpenAPI document.

use std::sync::Arc;

use axum::{
    Router,
    extract::Request,
    http::HeaderValue,
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::auth_middleware;
use crate::config::AppConfig;
use crate::crypto::CryptoKey;
use crate::handlers;
use crate::patreon::{PatreonApi, PatreonClient};
use crate::repositories::{
    CampaignRepository, ConnectedAccountRepository, PatronRepository, PostRepository,
    RevenueSnapshotRepository, SyncRunRepository,
};
use crate::sync::SyncService;
use crate::telemetry::{TraceContext, new_trace_id, with_trace_context};

const TRACE_ID_HEADER: &str = "x-trace-id";

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
    pub crypto_key: CryptoKey,
    pub patreon: Arc<dyn PatreonApi>,
    pub sync: SyncService,
}

impl AppState {
    /// Build state with the real Patreon client.
    pub fn new(db: DatabaseConnection, config: Arc<AppConfig>) -> anyhow::Result<Self> {
        let patreon: Arc<dyn PatreonApi> = Arc::new(PatreonClient::from_config(&config));
        Self::with_api(db, config, patreon)
    }

    /// Build state with an explicit API implementation (tests substitute a
    /// fake here).
    pub fn with_api(
        db: DatabaseConnection,
        config: Arc<AppConfig>,
        patreon: Arc<dyn PatreonApi>,
    ) -> anyhow::Result<Self> {
        let key_bytes = config
            .crypto_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("PATREONIZER_CRYPTO_KEY is required"))?;
        let crypto_key = CryptoKey::new(key_bytes)?;

        let db_arc = Arc::new(db.clone());
        let sync = SyncService::new(
            patreon.clone(),
            ConnectedAccountRepository::new(db_arc.clone(), crypto_key.clone()),
            CampaignRepository::new(db_arc.clone()),
            PatronRepository::new(db_arc.clone()),
            PostRepository::new(db_arc.clone()),
            RevenueSnapshotRepository::new(db_arc.clone()),
            SyncRunRepository::new(db_arc),
            config.sync.clone(),
        );

        Ok(Self {
            db,
            config,
            crypto_key,
            patreon,
            sync,
        })
    }
}

/// Scope every request to a trace context and echo the trace id back to
/// the client. An incoming x-trace-id is honored for cross-service
/// correlation.
async fn trace_middleware(request: Request, next: Next) -> Response {
    let trace_id = request
        .headers()
        .get(TRACE_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(new_trace_id);

    let context = TraceContext {
        trace_id: trace_id.clone(),
    };

    let mut response = with_trace_context(context, next.run(request)).await;

    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert(TRACE_ID_HEADER, value);
    }
    response
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/auth/patreon/authorize", get(handlers::oauth::authorize))
        .route("/auth/patreon/callback", get(handlers::oauth::callback))
        .route("/accounts", get(handlers::accounts::list_accounts))
        .route(
            "/accounts/{id}",
            delete(handlers::accounts::disconnect_account),
        )
        .route("/campaigns", get(handlers::campaigns::list_campaigns))
        .route(
            "/campaigns/{id}/webhook",
            post(handlers::campaigns::rotate_webhook_secret),
        )
        .route("/patrons", get(handlers::patrons::list_patrons))
        .route("/patrons/export", get(handlers::patrons::export_patrons))
        .route("/revenue", get(handlers::revenue::revenue_series))
        .route(
            "/metrics/dashboard",
            get(handlers::revenue::dashboard_metrics),
        )
        .route("/sync", post(handlers::sync::trigger_full_sync))
        .route(
            "/sync/campaigns/{id}",
            post(handlers::sync::trigger_campaign_sync),
        )
        .route(
            "/sync/accounts/{id}",
            post(handlers::sync::trigger_account_sync),
        )
        .route("/sync/runs", get(handlers::sync::list_sync_runs))
        .route("/sync/runs/{id}", get(handlers::sync::get_sync_run))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route(
            "/webhooks/patreon/{campaign_external_id}",
            post(handlers::webhooks::receive_webhook),
        )
        .merge(protected)
        .layer(middleware::from_fn(trace_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Starts the server with the given configuration
pub async fn run_server(
    config: AppConfig,
    db: DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;
    let profile = config.profile.clone();

    let state = AppState::new(db, Arc::new(config))?;

    let shutdown = CancellationToken::new();
    let reaper = {
        let sync = state.sync.clone();
        let token = shutdown.clone();
        tokio::spawn(async move { sync.run_reaper(token).await })
    };

    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, %profile, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

    shutdown.cancel();
    let _ = reaper.await;

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::health,
        crate::handlers::oauth::authorize,
        crate::handlers::oauth::callback,
        crate::handlers::accounts::list_accounts,
        crate::handlers::accounts::disconnect_account,
        crate::handlers::campaigns::list_campaigns,
        crate::handlers::campaigns::rotate_webhook_secret,
        crate::handlers::patrons::list_patrons,
        crate::handlers::patrons::export_patrons,
        crate::handlers::revenue::revenue_series,
        crate::handlers::revenue::dashboard_metrics,
        crate::handlers::sync::trigger_campaign_sync,
        crate::handlers::sync::trigger_account_sync,
        crate::handlers::sync::trigger_full_sync,
        crate::handlers::sync::get_sync_run,
        crate::handlers::sync::list_sync_runs,
        crate::handlers::webhooks::receive_webhook,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::handlers::HealthResponse,
            crate::handlers::oauth::AuthorizeResponse,
            crate::handlers::oauth::CallbackResponse,
            crate::handlers::oauth::ImportedCampaign,
            crate::handlers::accounts::AccountInfo,
            crate::handlers::accounts::AccountsResponse,
            crate::handlers::campaigns::CampaignInfo,
            crate::handlers::campaigns::CampaignsResponse,
            crate::handlers::campaigns::WebhookSecretResponse,
            crate::handlers::patrons::PatronInfo,
            crate::handlers::patrons::PatronsResponse,
            crate::handlers::revenue::RevenuePoint,
            crate::handlers::revenue::RevenueResponse,
            crate::repositories::metrics::DashboardMetrics,
            crate::handlers::sync::SyncRunInfo,
            crate::handlers::sync::SyncTriggerResponse,
            crate::handlers::webhooks::WebhookAck,
            crate::error::ApiError,
        )
    ),
    info(
        title = "Patreonizer API",
        description = "Patreon campaign sync and revenue dashboard backend",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
