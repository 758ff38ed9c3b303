use axum::{
    Extension, Json,
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{NaiveDate, Utc};
use serde_json::json;
use tracing::{error, warn};

use billfold_core::bills::{NewBill, NewBillItem};
use billfold_types::api::Claims;

use crate::AppState;
use crate::bills::bill_response;

/// PEN per USD applied when a receipt carries no rate of its own.
const FALLBACK_EXCHANGE_RATE: f64 = 3.75;

/// Accept a photographed receipt, hand it to the vision API, and persist the
/// parsed line items as a bill.
pub async fn upload_bill_photo(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, StatusCode> {
    let mut image: Option<Vec<u8>> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    {
        if field.name() == Some("image") {
            let bytes = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
            image = Some(bytes.to_vec());
        }
    }
    let image = image.filter(|i| !i.is_empty()).ok_or(StatusCode::BAD_REQUEST)?;

    let parsed = state.vision.parse_receipt(&image).await.map_err(|e| {
        warn!("Receipt parsing failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let user = crate::resolve_user(&state, claims.sub).await?;

    let date = parsed
        .date
        .parse::<NaiveDate>()
        .map(|d| d.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc())
        .unwrap_or_else(|_| Utc::now());

    let new_bill = NewBill {
        description: parsed.merchant_name.clone(),
        category: "General".into(),
        currency: parsed.currency.clone(),
        exchange_rate: FALLBACK_EXCHANGE_RATE,
        date,
        source: "web".into(),
        items: parsed
            .items
            .iter()
            .map(|item| NewBillItem {
                amount: item.amount,
                description: item.description.clone(),
                category: item.category.clone(),
                date: parsed.date.clone(),
            })
            .collect(),
    };

    let bills = state.bills.clone();
    let user_id = user.user_id;
    let (bill, expenses) =
        tokio::task::spawn_blocking(move || bills.create_with_expenses(&user_id, new_bill))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            })?
            .map_err(|e| {
                error!("Bill creation from receipt failed: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            })?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "bill": bill_response(bill, expenses),
            "parsedData": parsed,
        })),
    ))
}
