use crate::DbResult;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            user_id     TEXT PRIMARY KEY,
            auth_id     TEXT UNIQUE,
            telegram_id INTEGER UNIQUE,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS account_link_otps (
            otp_code    TEXT PRIMARY KEY,
            telegram_id INTEGER NOT NULL,
            expires_at  TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_otps_expires
            ON account_link_otps(expires_at);

        CREATE TABLE IF NOT EXISTS bills (
            bill_id     TEXT PRIMARY KEY,
            amount_pen  REAL NOT NULL,
            amount_usd  REAL NOT NULL,
            description TEXT,
            category    TEXT,
            currency    TEXT NOT NULL,
            user_id     TEXT NOT NULL,
            source      TEXT NOT NULL DEFAULT 'web',
            date        TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_bills_user
            ON bills(user_id, date);

        CREATE TABLE IF NOT EXISTS expenses (
            expense_id    TEXT PRIMARY KEY,
            amount_pen    REAL NOT NULL,
            amount_usd    REAL NOT NULL,
            exchange_rate REAL NOT NULL,
            currency      TEXT NOT NULL,
            description   TEXT,
            category      TEXT,
            date          TEXT NOT NULL,
            bill_id       TEXT REFERENCES bills(bill_id),
            user_id       TEXT NOT NULL,
            source        TEXT NOT NULL DEFAULT 'web',
            created_at    TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at    TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_expenses_bill
            ON expenses(bill_id);

        CREATE INDEX IF NOT EXISTS idx_expenses_user
            ON expenses(user_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
