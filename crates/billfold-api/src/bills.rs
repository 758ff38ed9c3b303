use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::error;

use billfold_core::bills::{BillError, NewBill, NewBillItem};
use billfold_core::parse_ts;
use billfold_db::models::{BillRow, ExpenseRow};
use billfold_types::api::{BillResponse, Claims, CreateBillRequest, ExpenseResponse};

use crate::AppState;

pub async fn create_bill(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateBillRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let user = crate::resolve_user(&state, claims.sub).await?;

    let new_bill = NewBill {
        description: req.description,
        category: req.category,
        currency: req.currency,
        exchange_rate: req.exchange_rate,
        date: req.date,
        source: "web".into(),
        items: req
            .expenses
            .into_iter()
            .map(|e| NewBillItem {
                amount: e.amount,
                description: e.description,
                category: e.category,
                date: e.date,
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
            .map_err(bill_error_status)?;

    Ok((StatusCode::CREATED, Json(bill_response(bill, expenses))))
}

pub async fn list_bills(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let user = crate::resolve_user(&state, claims.sub).await?;

    let bills = state.bills.clone();
    let user_id = user.user_id;
    let rows = tokio::task::spawn_blocking(move || bills.list_for_user(&user_id))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("Bill listing failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let response: Vec<BillResponse> = rows
        .into_iter()
        .map(|(bill, expenses)| bill_response(bill, expenses))
        .collect();
    Ok(Json(response))
}

pub async fn get_bill(
    State(state): State<AppState>,
    Path(bill_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let user = crate::resolve_user(&state, claims.sub).await?;

    let bills = state.bills.clone();
    let user_id = user.user_id;
    let (bill, expenses) = tokio::task::spawn_blocking(move || bills.get(&bill_id, &user_id))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(bill_error_status)?;
    Ok(Json(bill_response(bill, expenses)))
}

pub async fn delete_bill(
    State(state): State<AppState>,
    Path(bill_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let user = crate::resolve_user(&state, claims.sub).await?;

    let bills = state.bills.clone();
    let user_id = user.user_id;
    tokio::task::spawn_blocking(move || bills.delete(&bill_id, &user_id))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(bill_error_status)?;
    Ok(StatusCode::NO_CONTENT)
}

fn bill_error_status(err: BillError) -> StatusCode {
    match err {
        BillError::NotFound => StatusCode::NOT_FOUND,
        BillError::Forbidden => StatusCode::FORBIDDEN,
        BillError::BadRate => StatusCode::BAD_REQUEST,
        BillError::Storage(e) => {
            error!("Bill storage failure: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub(crate) fn bill_response(bill: BillRow, expenses: Vec<ExpenseRow>) -> BillResponse {
    BillResponse {
        date: parse_ts(&bill.date),
        created_at: parse_ts(&bill.created_at),
        updated_at: parse_ts(&bill.updated_at),
        bill_id: bill.bill_id,
        amount_pen: bill.amount_pen,
        amount_usd: bill.amount_usd,
        description: bill.description,
        category: bill.category,
        currency: bill.currency,
        user_id: bill.user_id,
        expenses: expenses
            .into_iter()
            .map(|e| ExpenseResponse {
                expense_id: e.expense_id,
                amount_pen: e.amount_pen,
                amount_usd: e.amount_usd,
                exchange_rate: e.exchange_rate,
                currency: e.currency,
                description: e.description,
                category: e.category,
                date: e.date,
                bill_id: e.bill_id,
                user_id: e.user_id,
            })
            .collect(),
    }
}
