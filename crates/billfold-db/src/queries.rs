use crate::models::{BillRow, ExpenseRow, OtpRow, UserRow};
use crate::{Database, DbResult};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

impl Database {
    // -- Users --

    pub fn create_user(&self, user: &UserRow) -> DbResult<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (user_id, auth_id, telegram_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    user.user_id,
                    user.auth_id,
                    user.telegram_id,
                    user.created_at,
                    user.updated_at
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_id(&self, user_id: &str) -> DbResult<Option<UserRow>> {
        self.with_conn(|conn| {
            query_user(conn, "SELECT * FROM users WHERE user_id = ?1", &[&user_id])
        })
    }

    pub fn get_user_by_auth_id(&self, auth_id: &str) -> DbResult<Option<UserRow>> {
        self.with_conn(|conn| {
            query_user(conn, "SELECT * FROM users WHERE auth_id = ?1", &[&auth_id])
        })
    }

    pub fn get_user_by_telegram_id(&self, telegram_id: i64) -> DbResult<Option<UserRow>> {
        self.with_conn(|conn| {
            query_user(
                conn,
                "SELECT * FROM users WHERE telegram_id = ?1",
                &[&telegram_id],
            )
        })
    }

    /// Full replace of the mutable fields (both identity keys + updated_at).
    pub fn update_user(&self, user: &UserRow) -> DbResult<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET auth_id = ?2, telegram_id = ?3, updated_at = ?4
                 WHERE user_id = ?1",
                params![
                    user.user_id,
                    user.auth_id,
                    user.telegram_id,
                    user.updated_at
                ],
            )?;
            Ok(())
        })
    }

    pub fn attach_auth_id(&self, user_id: &str, auth_id: &str, updated_at: &str) -> DbResult<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET auth_id = ?2, updated_at = ?3 WHERE user_id = ?1",
                params![user_id, auth_id, updated_at],
            )?;
            Ok(())
        })
    }

    // -- Account-link OTPs --

    pub fn create_otp(&self, otp: &OtpRow) -> DbResult<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO account_link_otps (otp_code, telegram_id, expires_at, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![otp.otp_code, otp.telegram_id, otp.expires_at, otp.created_at],
            )?;
            Ok(())
        })
    }

    pub fn get_otp(&self, code: &str) -> DbResult<Option<OtpRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT otp_code, telegram_id, expires_at, created_at
                     FROM account_link_otps WHERE otp_code = ?1",
                    [code],
                    |row| {
                        Ok(OtpRow {
                            otp_code: row.get(0)?,
                            telegram_id: row.get(1)?,
                            expires_at: row.get(2)?,
                            created_at: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Compare-and-delete: returns true if this call removed the row. A
    /// concurrent consumer that lost the race sees false.
    pub fn delete_otp(&self, code: &str) -> DbResult<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute("DELETE FROM account_link_otps WHERE otp_code = ?1", [code])?;
            Ok(n > 0)
        })
    }

    pub fn delete_expired_otps(&self, now: &str) -> DbResult<usize> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "DELETE FROM account_link_otps WHERE expires_at < ?1",
                [now],
            )?;
            if n > 0 {
                debug!("Swept {} expired link codes", n);
            }
            Ok(n)
        })
    }

    // -- Bills + expenses --

    /// Bill and its expenses land together or not at all.
    pub fn insert_bill_with_expenses(
        &self,
        bill: &BillRow,
        expenses: &[ExpenseRow],
    ) -> DbResult<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO bills (bill_id, amount_pen, amount_usd, description, category,
                                    currency, user_id, source, date, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    bill.bill_id,
                    bill.amount_pen,
                    bill.amount_usd,
                    bill.description,
                    bill.category,
                    bill.currency,
                    bill.user_id,
                    bill.source,
                    bill.date,
                    bill.created_at,
                    bill.updated_at
                ],
            )?;
            for e in expenses {
                tx.execute(
                    "INSERT INTO expenses (expense_id, amount_pen, amount_usd, exchange_rate,
                                           currency, description, category, date, bill_id,
                                           user_id, source, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                    params![
                        e.expense_id,
                        e.amount_pen,
                        e.amount_usd,
                        e.exchange_rate,
                        e.currency,
                        e.description,
                        e.category,
                        e.date,
                        e.bill_id,
                        e.user_id,
                        e.source,
                        e.created_at,
                        e.updated_at
                    ],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_bill(&self, bill_id: &str) -> DbResult<Option<BillRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT * FROM bills WHERE bill_id = ?1",
                    [bill_id],
                    map_bill_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn list_bills_by_user(&self, user_id: &str) -> DbResult<Vec<BillRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT * FROM bills WHERE user_id = ?1 ORDER BY date DESC")?;
            let rows = stmt
                .query_map([user_id], map_bill_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn list_expenses_by_bill(&self, bill_id: &str) -> DbResult<Vec<ExpenseRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM expenses WHERE bill_id = ?1")?;
            let rows = stmt
                .query_map([bill_id], map_expense_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Cascade delete: expenses first, then the bill itself.
    pub fn delete_bill_with_expenses(&self, bill_id: &str) -> DbResult<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM expenses WHERE bill_id = ?1", [bill_id])?;
            tx.execute("DELETE FROM bills WHERE bill_id = ?1", [bill_id])?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Bulk re-key of all financial rows from one owner to another. Both
    /// table updates run inside a single transaction so a half-migrated
    /// state (bills moved, expenses not) cannot be observed.
    pub fn migrate_owner(&self, old_user_id: &str, new_user_id: &str) -> DbResult<(usize, usize)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let bills = tx.execute(
                "UPDATE bills SET user_id = ?2 WHERE user_id = ?1",
                params![old_user_id, new_user_id],
            )?;
            let expenses = tx.execute(
                "UPDATE expenses SET user_id = ?2 WHERE user_id = ?1",
                params![old_user_id, new_user_id],
            )?;
            tx.commit()?;
            debug!(
                "Re-keyed {} bills and {} expenses from {} to {}",
                bills, expenses, old_user_id, new_user_id
            );
            Ok((bills, expenses))
        })
    }
}

fn query_user(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::types::ToSql],
) -> DbResult<Option<UserRow>> {
    let row = conn
        .query_row(sql, params, |row| {
            Ok(UserRow {
                user_id: row.get("user_id")?,
                auth_id: row.get("auth_id")?,
                telegram_id: row.get("telegram_id")?,
                created_at: row.get("created_at")?,
                updated_at: row.get("updated_at")?,
            })
        })
        .optional()?;
    Ok(row)
}

fn map_bill_row(row: &rusqlite::Row<'_>) -> Result<BillRow, rusqlite::Error> {
    Ok(BillRow {
        bill_id: row.get("bill_id")?,
        amount_pen: row.get("amount_pen")?,
        amount_usd: row.get("amount_usd")?,
        description: row.get::<_, Option<String>>("description")?.unwrap_or_default(),
        category: row.get::<_, Option<String>>("category")?.unwrap_or_default(),
        currency: row.get("currency")?,
        user_id: row.get("user_id")?,
        source: row.get("source")?,
        date: row.get("date")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn map_expense_row(row: &rusqlite::Row<'_>) -> Result<ExpenseRow, rusqlite::Error> {
    Ok(ExpenseRow {
        expense_id: row.get("expense_id")?,
        amount_pen: row.get("amount_pen")?,
        amount_usd: row.get("amount_usd")?,
        exchange_rate: row.get("exchange_rate")?,
        currency: row.get("currency")?,
        description: row.get::<_, Option<String>>("description")?.unwrap_or_default(),
        category: row.get::<_, Option<String>>("category")?.unwrap_or_default(),
        date: row.get("date")?,
        bill_id: row.get::<_, Option<String>>("bill_id")?.unwrap_or_default(),
        user_id: row.get("user_id")?,
        source: row.get("source")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DbError;

    fn user(id: &str, auth: Option<&str>, tg: Option<i64>) -> UserRow {
        UserRow {
            user_id: id.into(),
            auth_id: auth.map(String::from),
            telegram_id: tg,
            created_at: "2026-01-01T00:00:00Z".into(),
            updated_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    fn bill(id: &str, user_id: &str, pen: f64, usd: f64) -> BillRow {
        BillRow {
            bill_id: id.into(),
            amount_pen: pen,
            amount_usd: usd,
            description: "test".into(),
            category: "Food".into(),
            currency: "PEN".into(),
            user_id: user_id.into(),
            source: "web".into(),
            date: "2026-01-15T00:00:00Z".into(),
            created_at: "2026-01-15T00:00:00Z".into(),
            updated_at: "2026-01-15T00:00:00Z".into(),
        }
    }

    fn expense(id: &str, bill_id: &str, user_id: &str) -> ExpenseRow {
        ExpenseRow {
            expense_id: id.into(),
            amount_pen: 37.5,
            amount_usd: 10.0,
            exchange_rate: 3.75,
            currency: "PEN".into(),
            description: "item".into(),
            category: "Food".into(),
            date: "2026-01-15".into(),
            bill_id: bill_id.into(),
            user_id: user_id.into(),
            source: "web".into(),
            created_at: "2026-01-15T00:00:00Z".into(),
            updated_at: "2026-01-15T00:00:00Z".into(),
        }
    }

    #[test]
    fn duplicate_identity_key_is_conflict() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&user("u1", Some("web_abc"), None)).unwrap();

        let err = db
            .create_user(&user("u2", Some("web_abc"), None))
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict));

        // a different key is fine
        db.create_user(&user("u3", Some("web_xyz"), Some(555)))
            .unwrap();
        let err = db.create_user(&user("u4", None, Some(555))).unwrap_err();
        assert!(matches!(err, DbError::Conflict));
    }

    #[test]
    fn otp_compare_and_delete() {
        let db = Database::open_in_memory().unwrap();
        db.create_otp(&OtpRow {
            otp_code: "042817".into(),
            telegram_id: 555,
            expires_at: "2026-01-01T00:05:00Z".into(),
            created_at: "2026-01-01T00:00:00Z".into(),
        })
        .unwrap();

        assert!(db.get_otp("042817").unwrap().is_some());
        assert!(db.delete_otp("042817").unwrap());
        // second consumer loses the race
        assert!(!db.delete_otp("042817").unwrap());
        assert!(db.get_otp("042817").unwrap().is_none());
    }

    #[test]
    fn expired_sweep_only_removes_past_codes() {
        let db = Database::open_in_memory().unwrap();
        for (code, expires) in [
            ("000001", "2026-01-01T00:05:00Z"),
            ("000002", "2026-01-02T00:05:00Z"),
        ] {
            db.create_otp(&OtpRow {
                otp_code: code.into(),
                telegram_id: 1,
                expires_at: expires.into(),
                created_at: "2026-01-01T00:00:00Z".into(),
            })
            .unwrap();
        }

        let swept = db.delete_expired_otps("2026-01-01T12:00:00Z").unwrap();
        assert_eq!(swept, 1);
        assert!(db.get_otp("000001").unwrap().is_none());
        assert!(db.get_otp("000002").unwrap().is_some());
    }

    #[test]
    fn migrate_owner_rekeys_both_tables() {
        let db = Database::open_in_memory().unwrap();
        db.insert_bill_with_expenses(&bill("b1", "old", 37.5, 10.0), &[expense("e1", "b1", "old")])
            .unwrap();
        db.insert_bill_with_expenses(&bill("b2", "other", 1.0, 1.0), &[])
            .unwrap();

        let (bills, expenses) = db.migrate_owner("old", "new").unwrap();
        assert_eq!((bills, expenses), (1, 1));

        assert!(db.list_bills_by_user("old").unwrap().is_empty());
        let moved = db.list_bills_by_user("new").unwrap();
        assert_eq!(moved.len(), 1);
        assert_eq!(moved[0].bill_id, "b1");
        assert_eq!(db.list_expenses_by_bill("b1").unwrap()[0].user_id, "new");

        // unrelated owner untouched
        assert_eq!(db.list_bills_by_user("other").unwrap().len(), 1);
    }

    #[test]
    fn delete_bill_cascades_to_expenses() {
        let db = Database::open_in_memory().unwrap();
        db.insert_bill_with_expenses(
            &bill("b1", "u1", 75.0, 20.0),
            &[expense("e1", "b1", "u1"), expense("e2", "b1", "u1")],
        )
        .unwrap();

        db.delete_bill_with_expenses("b1").unwrap();
        assert!(db.get_bill("b1").unwrap().is_none());
        assert!(db.list_expenses_by_bill("b1").unwrap().is_empty());
    }
}
