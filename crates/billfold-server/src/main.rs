use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router, middleware,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use billfold_api::middleware::{JwksCache, require_auth};
use billfold_api::{AppState, AppStateInner, bills, link, stats, upload};
use billfold_core::bills::BillService;
use billfold_core::config::Config;
use billfold_core::link::AccountLinkService;
use billfold_core::stats::StatsService;
use billfold_core::vision::VisionClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "billfold=debug,tower_http=debug".into()),
        )
        .init();

    let cfg = Config::from_env();
    anyhow::ensure!(
        !cfg.jwks_url.is_empty(),
        "BILLFOLD_JWKS_URL must be set for token verification"
    );

    let db = Arc::new(billfold_db::Database::open(&PathBuf::from(&cfg.db_path))?);

    let state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        link: AccountLinkService::new(db.clone(), cfg.otp_ttl_minutes),
        bills: BillService::new(db.clone()),
        stats: StatsService::new(db),
        vision: VisionClient::new(cfg.llm_api_key, cfg.llm_base_url, cfg.llm_model),
        jwks: JwksCache::new(cfg.jwks_url),
    });

    let public_routes = Router::new().route("/health", get(health));

    let protected_routes = Router::new()
        .route("/bills", post(bills::create_bill))
        .route("/bills", get(bills::list_bills))
        .route("/bills/upload", post(upload::upload_bill_photo))
        .route("/bills/{id}", get(bills::get_bill))
        .route("/bills/{id}", axum::routing::delete(bills::delete_bill))
        .route("/auth/verify-otp", post(link::verify_otp))
        .route("/auth/link-status", get(link::link_status))
        .route("/statistics/dashboard", get(stats::dashboard))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port).parse()?;
    info!("Billfold server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
