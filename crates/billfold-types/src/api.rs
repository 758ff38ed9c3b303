use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// -- JWT Claims --

/// Claims of the token minted by the external auth provider. Shared between
/// billfold-api (REST middleware) and anything else that needs the verified
/// subject; canonical definition lives here to avoid duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

// -- Account linking --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VerifyOtpRequest {
    pub otp_code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkStatusResponse {
    pub is_linked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram_id: Option<i64>,
}

// -- Bills --

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBillRequest {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub currency: String,
    pub exchange_rate: f64,
    pub date: DateTime<Utc>,
    pub expenses: Vec<CreateExpenseItem>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateExpenseItem {
    pub amount: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub date: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseResponse {
    pub expense_id: String,
    pub amount_pen: f64,
    pub amount_usd: f64,
    pub exchange_rate: f64,
    pub currency: String,
    pub description: String,
    pub category: String,
    pub date: String,
    pub bill_id: String,
    pub user_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillResponse {
    pub bill_id: String,
    pub amount_pen: f64,
    pub amount_usd: f64,
    pub description: String,
    pub category: String,
    pub currency: String,
    pub user_id: String,
    pub date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expenses: Vec<ExpenseResponse>,
}

// -- Statistics --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyStats {
    /// Format: "2026-01"
    pub month: String,
    pub year: i32,
    pub month_num: u32,
    pub total_pen: f64,
    pub total_usd: f64,
    pub bill_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyStats {
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub week_label: String,
    pub total_pen: f64,
    pub total_usd: f64,
    pub bill_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStats {
    pub category: String,
    pub total_pen: f64,
    pub total_usd: f64,
    pub bill_count: usize,
    pub percentage: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub monthly_stats: Vec<MonthlyStats>,
    pub weekly_stats: Vec<WeeklyStats>,
    pub category_stats: Vec<CategoryStats>,
    pub total_pen: f64,
    pub total_usd: f64,
    pub total_bills: usize,
}

// -- Receipt parsing (vision collaborator output) --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptItem {
    pub description: String,
    pub amount: f64,
    #[serde(default)]
    pub category: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedReceipt {
    pub items: Vec<ReceiptItem>,
    #[serde(default)]
    pub total_amount: f64,
    pub currency: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub merchant_name: String,
}
