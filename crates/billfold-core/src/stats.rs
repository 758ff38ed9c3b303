use std::collections::HashMap;
use std::sync::Arc;

use billfold_db::{Database, DbResult};
use billfold_types::api::{CategoryStats, DashboardStats, MonthlyStats, WeeklyStats};
use chrono::{Datelike, Days, Months, NaiveDate, Utc};

use crate::parse_ts;

const WEEKS_SHOWN: usize = 8;

/// Spending aggregates for the dashboard: fixed monthly and weekly buckets
/// plus a category breakdown. Pure bucketing over the user's bills.
#[derive(Clone)]
pub struct StatsService {
    db: Arc<Database>,
}

impl StatsService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn dashboard(&self, user_id: &str, months: usize) -> DbResult<DashboardStats> {
        let bills = self.db.list_bills_by_user(user_id)?;

        let dated: Vec<(NaiveDate, f64, f64, String)> = bills
            .iter()
            .map(|b| {
                (
                    parse_ts(&b.date).date_naive(),
                    b.amount_pen,
                    b.amount_usd,
                    b.category.clone(),
                )
            })
            .collect();

        let total_pen: f64 = dated.iter().map(|b| b.1).sum();
        let total_usd: f64 = dated.iter().map(|b| b.2).sum();

        Ok(DashboardStats {
            monthly_stats: monthly_buckets(&dated, months),
            weekly_stats: weekly_buckets(&dated, WEEKS_SHOWN),
            category_stats: category_breakdown(&dated),
            total_pen,
            total_usd,
            total_bills: bills.len(),
        })
    }
}

fn monthly_buckets(bills: &[(NaiveDate, f64, f64, String)], months: usize) -> Vec<MonthlyStats> {
    let today = Utc::now().date_naive();
    let mut buckets = Vec::with_capacity(months);
    for i in 0..months {
        let target = today
            .checked_sub_months(Months::new(i as u32))
            .unwrap_or(today);
        buckets.push(MonthlyStats {
            month: target.format("%Y-%m").to_string(),
            year: target.year(),
            month_num: target.month(),
            total_pen: 0.0,
            total_usd: 0.0,
            bill_count: 0,
        });
    }

    for (date, pen, usd, _) in bills {
        let key = date.format("%Y-%m").to_string();
        if let Some(bucket) = buckets.iter_mut().find(|b| b.month == key) {
            bucket.total_pen += pen;
            bucket.total_usd += usd;
            bucket.bill_count += 1;
        }
    }

    buckets
}

fn weekly_buckets(bills: &[(NaiveDate, f64, f64, String)], weeks: usize) -> Vec<WeeklyStats> {
    let today = Utc::now().date_naive();
    let mut buckets = Vec::with_capacity(weeks);
    for i in 0..weeks {
        let start = week_start(
            today
                .checked_sub_days(Days::new(7 * i as u64))
                .unwrap_or(today),
        );
        let end = start.checked_add_days(Days::new(6)).unwrap_or(start);
        buckets.push(WeeklyStats {
            week_start: start,
            week_end: end,
            week_label: format!("{} - {}", start.format("%b %-d"), end.format("%b %-d")),
            total_pen: 0.0,
            total_usd: 0.0,
            bill_count: 0,
        });
    }

    for (date, pen, usd, _) in bills {
        let start = week_start(*date);
        if let Some(bucket) = buckets.iter_mut().find(|b| b.week_start == start) {
            bucket.total_pen += pen;
            bucket.total_usd += usd;
            bucket.bill_count += 1;
        }
    }

    buckets
}

fn category_breakdown(bills: &[(NaiveDate, f64, f64, String)]) -> Vec<CategoryStats> {
    let mut by_category: HashMap<String, CategoryStats> = HashMap::new();
    let mut total_pen = 0.0;

    for (_, pen, usd, category) in bills {
        let name = if category.is_empty() {
            "Uncategorized".to_string()
        } else {
            category.clone()
        };
        let entry = by_category
            .entry(name.clone())
            .or_insert_with(|| CategoryStats {
                category: name,
                total_pen: 0.0,
                total_usd: 0.0,
                bill_count: 0,
                percentage: 0.0,
            });
        entry.total_pen += pen;
        entry.total_usd += usd;
        entry.bill_count += 1;
        total_pen += pen;
    }

    let mut result: Vec<CategoryStats> = by_category.into_values().collect();
    if total_pen > 0.0 {
        for stats in &mut result {
            stats.percentage = stats.total_pen / total_pen * 100.0;
        }
    }
    result.sort_by(|a, b| {
        b.total_pen
            .partial_cmp(&a.total_pen)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    result
}

/// Monday of the week containing `date`.
fn week_start(date: NaiveDate) -> NaiveDate {
    let days = date.weekday().num_days_from_monday() as u64;
    date.checked_sub_days(Days::new(days)).unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bills::{BillService, NewBill, NewBillItem};
    use chrono::Weekday;

    fn seed_bill(bills: &BillService, user: &str, category: &str, usd: f64) {
        bills
            .create_with_expenses(
                user,
                NewBill {
                    description: "test".into(),
                    category: category.into(),
                    currency: "USD".into(),
                    exchange_rate: 3.75,
                    date: Utc::now(),
                    source: "web".into(),
                    items: vec![NewBillItem {
                        amount: usd,
                        description: "item".into(),
                        category: category.into(),
                        date: Utc::now().format("%Y-%m-%d").to_string(),
                    }],
                },
            )
            .unwrap();
    }

    #[test]
    fn week_start_is_monday() {
        let wed = NaiveDate::from_ymd_opt(2026, 8, 26).unwrap();
        assert_eq!(week_start(wed).weekday(), Weekday::Mon);
        let mon = NaiveDate::from_ymd_opt(2026, 8, 24).unwrap();
        assert_eq!(week_start(mon), mon);
        let sun = NaiveDate::from_ymd_opt(2026, 8, 30).unwrap();
        assert_eq!(week_start(sun), mon);
    }

    #[test]
    fn dashboard_buckets_current_month_and_week() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let bills = BillService::new(db.clone());
        let stats = StatsService::new(db);

        seed_bill(&bills, "u1", "Food", 10.0);
        seed_bill(&bills, "u1", "Transport", 20.0);

        let dash = stats.dashboard("u1", 6).unwrap();
        assert_eq!(dash.total_bills, 2);
        assert!((dash.total_usd - 30.0).abs() < 1e-9);
        assert_eq!(dash.monthly_stats.len(), 6);
        assert_eq!(dash.weekly_stats.len(), 8);

        // both bills dated today: they land in the newest buckets
        assert_eq!(dash.monthly_stats[0].bill_count, 2);
        assert_eq!(dash.weekly_stats[0].bill_count, 2);
        assert_eq!(dash.monthly_stats[1].bill_count, 0);
    }

    #[test]
    fn categories_sorted_with_percentages() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let bills = BillService::new(db.clone());
        let stats = StatsService::new(db);

        seed_bill(&bills, "u1", "Food", 30.0);
        seed_bill(&bills, "u1", "Transport", 10.0);

        let dash = stats.dashboard("u1", 1).unwrap();
        let cats = &dash.category_stats;
        assert_eq!(cats.len(), 2);
        assert_eq!(cats[0].category, "Food");
        assert!((cats[0].percentage - 75.0).abs() < 1e-9);
        assert!((cats[1].percentage - 25.0).abs() < 1e-9);
    }

    #[test]
    fn empty_category_becomes_uncategorized() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let bills = BillService::new(db.clone());
        let stats = StatsService::new(db);

        seed_bill(&bills, "u1", "", 5.0);
        let dash = stats.dashboard("u1", 1).unwrap();
        assert_eq!(dash.category_stats[0].category, "Uncategorized");
    }
}
