/// Database row types — these map directly to SQLite rows.
/// Distinct from billfold-types API models to keep the DB layer independent.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub user_id: String,
    pub auth_id: Option<String>,
    pub telegram_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct OtpRow {
    pub otp_code: String,
    pub telegram_id: i64,
    pub expires_at: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct BillRow {
    pub bill_id: String,
    pub amount_pen: f64,
    pub amount_usd: f64,
    pub description: String,
    pub category: String,
    pub currency: String,
    pub user_id: String,
    pub source: String,
    pub date: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct ExpenseRow {
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
    pub source: String,
    pub created_at: String,
    pub updated_at: String,
}
