use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use billfold_core::link::LinkError;
use billfold_types::api::{Claims, LinkStatusResponse, VerifyOtpRequest, VerifyOtpResponse};

use crate::AppState;

/// Web half of the account-linking exchange: the user types the code shown
/// in the chat channel, we reconcile the two identities.
pub async fn verify_otp(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<VerifyOtpRequest>,
) -> Result<Response, StatusCode> {
    if req.otp_code.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let link = state.link.clone();
    let auth_id = claims.sub;
    let result = tokio::task::spawn_blocking(move || link.verify_and_link(&req.otp_code, &auth_id))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    match result {
        Ok(()) => Ok(Json(VerifyOtpResponse {
            success: true,
            message: "Accounts successfully linked".into(),
        })
        .into_response()),
        Err(LinkError::InvalidCode) => Ok((
            StatusCode::BAD_REQUEST,
            Json(VerifyOtpResponse {
                success: false,
                message: "Invalid link code".into(),
            }),
        )
            .into_response()),
        Err(LinkError::Expired) => Ok((
            StatusCode::BAD_REQUEST,
            Json(VerifyOtpResponse {
                success: false,
                message: "Link code has expired".into(),
            }),
        )
            .into_response()),
        Err(LinkError::Storage(e)) => {
            error!("Account link failed: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

pub async fn link_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let link = state.link.clone();
    let user = tokio::task::spawn_blocking(move || link.get_by_auth(&claims.sub))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("Link status lookup failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let telegram_id = user.and_then(|u| u.telegram_id);
    Ok(Json(LinkStatusResponse {
        is_linked: telegram_id.is_some(),
        telegram_id,
    }))
}
