use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::error;

use billfold_types::api::Claims;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    #[serde(default = "default_months")]
    pub months: usize,
}

fn default_months() -> usize {
    6
}

pub async fn dashboard(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let user = crate::resolve_user(&state, claims.sub).await?;

    let months = query.months.clamp(1, 24);
    let stats = state.stats.clone();
    let user_id = user.user_id;
    let dashboard = tokio::task::spawn_blocking(move || stats.dashboard(&user_id, months))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("Statistics query failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(dashboard))
}
