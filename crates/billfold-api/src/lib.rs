pub mod bills;
pub mod link;
pub mod middleware;
pub mod stats;
pub mod upload;

use std::sync::Arc;

use axum::http::StatusCode;
use tracing::error;

use billfold_core::bills::BillService;
use billfold_core::link::AccountLinkService;
use billfold_core::stats::StatsService;
use billfold_core::vision::VisionClient;
use billfold_db::Database;
use billfold_db::models::UserRow;

use crate::middleware::JwksCache;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub link: AccountLinkService,
    pub bills: BillService,
    pub stats: StatsService,
    pub vision: VisionClient,
    pub jwks: JwksCache,
}

/// Resolve the request's verified web identity to its user record, creating
/// one on first contact. Runs on the blocking pool like every other database
/// touch in the handlers.
pub(crate) async fn resolve_user(state: &AppState, auth_id: String) -> Result<UserRow, StatusCode> {
    let link = state.link.clone();
    tokio::task::spawn_blocking(move || link.get_or_create_by_auth(&auth_id))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("User lookup failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> AppState {
        let db = Arc::new(Database::open_in_memory().unwrap());
        Arc::new(AppStateInner {
            db: db.clone(),
            link: AccountLinkService::new(db.clone(), 5),
            bills: BillService::new(db.clone()),
            stats: StatsService::new(db),
            vision: VisionClient::new(String::new(), "http://localhost".into(), "test".into()),
            jwks: JwksCache::new("http://localhost/jwks".into()),
        })
    }

    #[tokio::test]
    async fn resolve_user_materializes_once_per_identity() {
        let state = test_state();
        let first = resolve_user(&state, "web_abc".into()).await.unwrap();
        let second = resolve_user(&state, "web_abc".into()).await.unwrap();
        assert_eq!(first.user_id, second.user_id);

        let other = resolve_user(&state, "web_xyz".into()).await.unwrap();
        assert_ne!(first.user_id, other.user_id);
    }
}
