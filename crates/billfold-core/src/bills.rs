use std::sync::Arc;

use billfold_db::models::{BillRow, ExpenseRow};
use billfold_db::{Database, DbError, DbResult};
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::now_rfc3339;

#[derive(Debug, Error)]
pub enum BillError {
    #[error("bill not found")]
    NotFound,
    #[error("bill belongs to another user")]
    Forbidden,
    #[error("exchange rate must be positive")]
    BadRate,
    #[error(transparent)]
    Storage(#[from] DbError),
}

/// Input for the bill-plus-expenses aggregate. One exchange rate covers the
/// whole bill; per-item amounts are given in the bill's currency of origin.
#[derive(Debug, Clone)]
pub struct NewBill {
    pub description: String,
    pub category: String,
    pub currency: String,
    pub exchange_rate: f64,
    pub date: DateTime<Utc>,
    pub source: String,
    pub items: Vec<NewBillItem>,
}

#[derive(Debug, Clone)]
pub struct NewBillItem {
    pub amount: f64,
    pub description: String,
    pub category: String,
    pub date: String,
}

#[derive(Clone)]
pub struct BillService {
    db: Arc<Database>,
}

impl BillService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create a bill together with its expenses. Each item amount is
    /// converted into both currencies using the bill's single exchange rate,
    /// and the bill's stored totals are the sums of those converted amounts.
    pub fn create_with_expenses(
        &self,
        user_id: &str,
        new_bill: NewBill,
    ) -> Result<(BillRow, Vec<ExpenseRow>), BillError> {
        if new_bill.exchange_rate <= 0.0 {
            return Err(BillError::BadRate);
        }

        let now = now_rfc3339();
        let bill_id = Uuid::new_v4().to_string();

        let mut total_pen = 0.0;
        let mut total_usd = 0.0;
        let mut expenses = Vec::with_capacity(new_bill.items.len());

        for item in &new_bill.items {
            let (amount_pen, amount_usd) = if new_bill.currency == "PEN" {
                (item.amount, item.amount / new_bill.exchange_rate)
            } else {
                (item.amount * new_bill.exchange_rate, item.amount)
            };
            total_pen += amount_pen;
            total_usd += amount_usd;

            expenses.push(ExpenseRow {
                expense_id: Uuid::new_v4().to_string(),
                amount_pen,
                amount_usd,
                exchange_rate: new_bill.exchange_rate,
                currency: new_bill.currency.clone(),
                description: item.description.clone(),
                category: item.category.clone(),
                date: item.date.clone(),
                bill_id: bill_id.clone(),
                user_id: user_id.to_string(),
                source: new_bill.source.clone(),
                created_at: now.clone(),
                updated_at: now.clone(),
            });
        }

        let bill = BillRow {
            bill_id,
            amount_pen: total_pen,
            amount_usd: total_usd,
            description: new_bill.description,
            category: new_bill.category,
            currency: new_bill.currency,
            user_id: user_id.to_string(),
            source: new_bill.source,
            date: new_bill.date.to_rfc3339(),
            created_at: now.clone(),
            updated_at: now,
        };

        self.db.insert_bill_with_expenses(&bill, &expenses)?;
        Ok((bill, expenses))
    }

    pub fn list_for_user(&self, user_id: &str) -> DbResult<Vec<(BillRow, Vec<ExpenseRow>)>> {
        let bills = self.db.list_bills_by_user(user_id)?;
        let mut result = Vec::with_capacity(bills.len());
        for bill in bills {
            let expenses = self.db.list_expenses_by_bill(&bill.bill_id)?;
            result.push((bill, expenses));
        }
        Ok(result)
    }

    pub fn get(&self, bill_id: &str, user_id: &str) -> Result<(BillRow, Vec<ExpenseRow>), BillError> {
        let bill = self.db.get_bill(bill_id)?.ok_or(BillError::NotFound)?;
        if bill.user_id != user_id {
            return Err(BillError::Forbidden);
        }
        let expenses = self.db.list_expenses_by_bill(bill_id)?;
        Ok((bill, expenses))
    }

    pub fn delete(&self, bill_id: &str, user_id: &str) -> Result<(), BillError> {
        let bill = self.db.get_bill(bill_id)?.ok_or(BillError::NotFound)?;
        if bill.user_id != user_id {
            return Err(BillError::Forbidden);
        }
        self.db.delete_bill_with_expenses(bill_id)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> BillService {
        BillService::new(Arc::new(Database::open_in_memory().unwrap()))
    }

    fn new_bill(currency: &str, rate: f64, amounts: &[f64]) -> NewBill {
        NewBill {
            description: "market run".into(),
            category: "Food".into(),
            currency: currency.into(),
            exchange_rate: rate,
            date: "2026-08-15T00:00:00Z".parse().unwrap(),
            source: "web".into(),
            items: amounts
                .iter()
                .map(|a| NewBillItem {
                    amount: *a,
                    description: "item".into(),
                    category: "Food".into(),
                    date: "2026-08-15".into(),
                })
                .collect(),
        }
    }

    #[test]
    fn totals_equal_sum_of_expense_amounts() {
        let svc = service();
        let (bill, expenses) = svc
            .create_with_expenses("u1", new_bill("USD", 3.75, &[10.0, 5.0]))
            .unwrap();

        assert_eq!(expenses.len(), 2);
        let sum_pen: f64 = expenses.iter().map(|e| e.amount_pen).sum();
        let sum_usd: f64 = expenses.iter().map(|e| e.amount_usd).sum();
        assert!((bill.amount_pen - sum_pen).abs() < 1e-9);
        assert!((bill.amount_usd - sum_usd).abs() < 1e-9);
        assert!((bill.amount_usd - 15.0).abs() < 1e-9);
        assert!((bill.amount_pen - 56.25).abs() < 1e-9);
    }

    #[test]
    fn pen_bill_divides_by_rate() {
        let svc = service();
        let (bill, _) = svc
            .create_with_expenses("u1", new_bill("PEN", 3.75, &[37.5]))
            .unwrap();
        assert!((bill.amount_pen - 37.5).abs() < 1e-9);
        assert!((bill.amount_usd - 10.0).abs() < 1e-9);
    }

    #[test]
    fn zero_rate_is_rejected() {
        let svc = service();
        let err = svc
            .create_with_expenses("u1", new_bill("USD", 0.0, &[10.0]))
            .unwrap_err();
        assert!(matches!(err, BillError::BadRate));
    }

    #[test]
    fn get_checks_ownership() {
        let svc = service();
        let (bill, _) = svc
            .create_with_expenses("u1", new_bill("USD", 3.75, &[10.0]))
            .unwrap();

        assert!(svc.get(&bill.bill_id, "u1").is_ok());
        let err = svc.get(&bill.bill_id, "intruder").unwrap_err();
        assert!(matches!(err, BillError::Forbidden));
        let err = svc.get("missing", "u1").unwrap_err();
        assert!(matches!(err, BillError::NotFound));
    }

    #[test]
    fn delete_removes_bill_and_expenses() {
        let svc = service();
        let (bill, _) = svc
            .create_with_expenses("u1", new_bill("USD", 3.75, &[10.0, 2.0]))
            .unwrap();

        svc.delete(&bill.bill_id, "u1").unwrap();
        assert!(matches!(
            svc.get(&bill.bill_id, "u1").unwrap_err(),
            BillError::NotFound
        ));
        assert!(svc.list_for_user("u1").unwrap().is_empty());
    }
}
