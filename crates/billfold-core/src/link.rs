use std::sync::Arc;

use billfold_db::models::{OtpRow, UserRow};
use billfold_db::{Database, DbError, DbResult};
use chrono::{Duration, Utc};
use rand::Rng;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{now_rfc3339, parse_ts};

/// The code space is small (10^6) and codes double as the primary key, so a
/// collision with a still-live code surfaces as a Conflict on insert. We
/// retry with a fresh code rather than handing the caller an opaque failure.
const MAX_CODE_ATTEMPTS: u32 = 8;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("invalid link code")]
    InvalidCode,
    #[error("link code has expired")]
    Expired,
    #[error(transparent)]
    Storage(#[from] DbError),
}

/// Reconciles a chat-originated identity and a web-originated identity into
/// a single user via a short-lived one-time code.
#[derive(Clone)]
pub struct AccountLinkService {
    db: Arc<Database>,
    otp_ttl_minutes: i64,
}

impl AccountLinkService {
    pub fn new(db: Arc<Database>, otp_ttl_minutes: i64) -> Self {
        Self {
            db,
            otp_ttl_minutes,
        }
    }

    /// Issue a fresh 6-digit link code for a chat user. The expired-code
    /// sweep beforehand is best-effort and never blocks issuance.
    pub fn issue_code(&self, telegram_id: i64) -> DbResult<String> {
        self.issue_code_with(telegram_id, || rand::rng().random_range(0..1_000_000))
    }

    fn issue_code_with(
        &self,
        telegram_id: i64,
        mut next_code: impl FnMut() -> u32,
    ) -> DbResult<String> {
        if let Err(e) = self.db.delete_expired_otps(&now_rfc3339()) {
            warn!("Expired-code sweep failed: {}", e);
        }

        let expires_at = (Utc::now() + Duration::minutes(self.otp_ttl_minutes)).to_rfc3339();
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = format!("{:06}", next_code());
            let otp = OtpRow {
                otp_code: code.clone(),
                telegram_id,
                expires_at: expires_at.clone(),
                created_at: now_rfc3339(),
            };
            match self.db.create_otp(&otp) {
                Ok(()) => return Ok(code),
                Err(DbError::Conflict) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(DbError::Conflict)
    }

    /// Validate a code typed into the web app and link the chat identity it
    /// was issued for to the verified web identity.
    ///
    /// The code is claimed by compare-and-delete before reconciliation runs:
    /// of two concurrent submissions of the same code, exactly one proceeds
    /// and the other fails with `InvalidCode`.
    pub fn verify_and_link(&self, code: &str, auth_id: &str) -> Result<(), LinkError> {
        let otp = self.db.get_otp(code)?.ok_or(LinkError::InvalidCode)?;

        if Utc::now() > parse_ts(&otp.expires_at) {
            if let Err(e) = self.db.delete_otp(code) {
                warn!("Failed to delete expired code: {}", e);
            }
            return Err(LinkError::Expired);
        }

        if !self.db.delete_otp(code)? {
            // someone else consumed it between the read and the delete
            return Err(LinkError::InvalidCode);
        }

        let web_user = self.db.get_user_by_auth_id(auth_id)?;
        let chat_user = self.db.get_user_by_telegram_id(otp.telegram_id)?;
        let now = now_rfc3339();

        match (web_user, chat_user) {
            // Already linked: nothing to reconcile.
            (Some(web), Some(chat)) if web.user_id == chat.user_id => {
                info!("Accounts already linked for user {}", web.user_id);
                Ok(())
            }

            // Two pre-existing records: the web record is canonical. The
            // chat record gives up its telegram id first (the column is
            // unique), then its financial history moves over. The emptied
            // record stays behind with no live identity pointer.
            (Some(mut web), Some(mut chat)) => {
                chat.telegram_id = None;
                chat.updated_at = now.clone();
                self.db.update_user(&chat)?;

                web.telegram_id = Some(otp.telegram_id);
                web.updated_at = now;
                self.db.update_user(&web)?;

                let (bills, expenses) = self.db.migrate_owner(&chat.user_id, &web.user_id)?;
                info!(
                    "Merged user {} into {} ({} bills, {} expenses)",
                    chat.user_id, web.user_id, bills, expenses
                );
                Ok(())
            }

            (Some(mut web), None) => {
                web.telegram_id = Some(otp.telegram_id);
                web.updated_at = now;
                self.db.update_user(&web)?;
                Ok(())
            }

            (None, Some(chat)) => {
                self.db.attach_auth_id(&chat.user_id, auth_id, &now)?;
                Ok(())
            }

            (None, None) => {
                let user = UserRow {
                    user_id: Uuid::new_v4().to_string(),
                    auth_id: Some(auth_id.to_string()),
                    telegram_id: Some(otp.telegram_id),
                    created_at: now.clone(),
                    updated_at: now,
                };
                self.db.create_user(&user)?;
                Ok(())
            }
        }
    }

    pub fn get_or_create_by_telegram(&self, telegram_id: i64) -> DbResult<UserRow> {
        if let Some(user) = self.db.get_user_by_telegram_id(telegram_id)? {
            return Ok(user);
        }

        let now = now_rfc3339();
        let user = UserRow {
            user_id: Uuid::new_v4().to_string(),
            auth_id: None,
            telegram_id: Some(telegram_id),
            created_at: now.clone(),
            updated_at: now,
        };
        match self.db.create_user(&user) {
            Ok(()) => Ok(user),
            // concurrent first contact: someone else just created it
            Err(DbError::Conflict) => self
                .db
                .get_user_by_telegram_id(telegram_id)?
                .ok_or(DbError::Conflict),
            Err(e) => Err(e),
        }
    }

    pub fn get_or_create_by_auth(&self, auth_id: &str) -> DbResult<UserRow> {
        if let Some(user) = self.db.get_user_by_auth_id(auth_id)? {
            return Ok(user);
        }

        let now = now_rfc3339();
        let user = UserRow {
            user_id: Uuid::new_v4().to_string(),
            auth_id: Some(auth_id.to_string()),
            telegram_id: None,
            created_at: now.clone(),
            updated_at: now,
        };
        match self.db.create_user(&user) {
            Ok(()) => Ok(user),
            Err(DbError::Conflict) => self
                .db
                .get_user_by_auth_id(auth_id)?
                .ok_or(DbError::Conflict),
            Err(e) => Err(e),
        }
    }

    pub fn get_by_auth(&self, auth_id: &str) -> DbResult<Option<UserRow>> {
        self.db.get_user_by_auth_id(auth_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use billfold_db::models::{BillRow, ExpenseRow};

    fn service() -> AccountLinkService {
        AccountLinkService::new(Arc::new(Database::open_in_memory().unwrap()), 5)
    }

    fn db(svc: &AccountLinkService) -> &Database {
        &svc.db
    }

    fn insert_code(svc: &AccountLinkService, code: &str, telegram_id: i64, expires_at: &str) {
        db(svc)
            .create_otp(&OtpRow {
                otp_code: code.into(),
                telegram_id,
                expires_at: expires_at.into(),
                created_at: now_rfc3339(),
            })
            .unwrap();
    }

    fn bill_for(svc: &AccountLinkService, bill_id: &str, user_id: &str, pen: f64, usd: f64) {
        let expense = ExpenseRow {
            expense_id: format!("{}-e1", bill_id),
            amount_pen: pen,
            amount_usd: usd,
            exchange_rate: 3.75,
            currency: "USD".into(),
            description: "item".into(),
            category: "Food".into(),
            date: "2026-08-01".into(),
            bill_id: bill_id.into(),
            user_id: user_id.into(),
            source: "web".into(),
            created_at: now_rfc3339(),
            updated_at: now_rfc3339(),
        };
        db(svc)
            .insert_bill_with_expenses(
                &BillRow {
                    bill_id: bill_id.into(),
                    amount_pen: pen,
                    amount_usd: usd,
                    description: "test bill".into(),
                    category: "Food".into(),
                    currency: "USD".into(),
                    user_id: user_id.into(),
                    source: "web".into(),
                    date: "2026-08-01T00:00:00Z".into(),
                    created_at: now_rfc3339(),
                    updated_at: now_rfc3339(),
                },
                &[expense],
            )
            .unwrap();
    }

    #[test]
    fn issued_code_is_six_digits_and_verifiable() {
        let svc = service();
        let code = svc.issue_code(555).unwrap();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));

        svc.verify_and_link(&code, "web_abc").unwrap();
        let user = db(&svc).get_user_by_auth_id("web_abc").unwrap().unwrap();
        assert_eq!(user.telegram_id, Some(555));
    }

    #[test]
    fn issuance_retries_past_a_live_code_collision() {
        let svc = service();
        let live_until = (Utc::now() + Duration::minutes(5)).to_rfc3339();
        insert_code(&svc, "000007", 111, &live_until);

        // first candidate collides with the live code, second goes through
        let mut candidates = [7u32, 42].into_iter();
        let code = svc
            .issue_code_with(555, || candidates.next().unwrap())
            .unwrap();
        assert_eq!(code, "000042");

        // a code space that never frees up exhausts the attempts
        let err = svc.issue_code_with(777, || 7).unwrap_err();
        assert!(matches!(err, DbError::Conflict));

        // the original holder's code is untouched throughout
        let row = db(&svc).get_otp("000007").unwrap().unwrap();
        assert_eq!(row.telegram_id, 111);
    }

    #[test]
    fn code_is_consumed_exactly_once() {
        let svc = service();
        let code = svc.issue_code(555).unwrap();

        svc.verify_and_link(&code, "web_abc").unwrap();
        let err = svc.verify_and_link(&code, "web_abc").unwrap_err();
        assert!(matches!(err, LinkError::InvalidCode));
    }

    #[test]
    fn unknown_code_is_invalid() {
        let svc = service();
        let err = svc.verify_and_link("999999", "web_abc").unwrap_err();
        assert!(matches!(err, LinkError::InvalidCode));
    }

    #[test]
    fn expired_code_is_rejected_and_deleted() {
        let svc = service();
        insert_code(&svc, "042817", 555, "2020-01-01T00:05:00+00:00");

        let err = svc.verify_and_link("042817", "web_abc").unwrap_err();
        assert!(matches!(err, LinkError::Expired));

        // the expired row was removed, so a retry sees nothing
        let err = svc.verify_and_link("042817", "web_abc").unwrap_err();
        assert!(matches!(err, LinkError::InvalidCode));
    }

    #[test]
    fn neither_identity_exists_creates_linked_user() {
        let svc = service();
        let code = svc.issue_code(555).unwrap();
        svc.verify_and_link(&code, "web_abc").unwrap();

        let by_web = db(&svc).get_user_by_auth_id("web_abc").unwrap().unwrap();
        let by_chat = db(&svc).get_user_by_telegram_id(555).unwrap().unwrap();
        assert_eq!(by_web.user_id, by_chat.user_id);
    }

    #[test]
    fn only_web_user_exists_attaches_chat_identity() {
        let svc = service();
        let web = svc.get_or_create_by_auth("web_abc").unwrap();

        let code = svc.issue_code(555).unwrap();
        svc.verify_and_link(&code, "web_abc").unwrap();

        let linked = db(&svc).get_user_by_id(&web.user_id).unwrap().unwrap();
        assert_eq!(linked.telegram_id, Some(555));
        assert_eq!(linked.auth_id.as_deref(), Some("web_abc"));
    }

    #[test]
    fn only_chat_user_exists_attaches_web_identity_and_keeps_bills() {
        let svc = service();
        let chat = svc.get_or_create_by_telegram(555).unwrap();
        bill_for(&svc, "b1", &chat.user_id, 37.5, 10.0);

        let code = svc.issue_code(555).unwrap();
        svc.verify_and_link(&code, "web_abc").unwrap();

        let linked = db(&svc).get_user_by_auth_id("web_abc").unwrap().unwrap();
        assert_eq!(linked.user_id, chat.user_id);

        let bills = db(&svc).list_bills_by_user(&linked.user_id).unwrap();
        assert_eq!(bills.len(), 1);
        assert_eq!(bills[0].bill_id, "b1");
        assert_eq!(bills[0].amount_pen, 37.5);
        assert_eq!(bills[0].amount_usd, 10.0);
    }

    #[test]
    fn merge_prefers_web_record_and_migrates_history() {
        let svc = service();
        let chat = svc.get_or_create_by_telegram(555).unwrap();
        let web = svc.get_or_create_by_auth("web_abc").unwrap();
        bill_for(&svc, "b1", &chat.user_id, 37.5, 10.0);
        bill_for(&svc, "b2", &web.user_id, 75.0, 20.0);

        let code = svc.issue_code(555).unwrap();
        svc.verify_and_link(&code, "web_abc").unwrap();

        // web record is canonical and now carries the chat identity
        let canonical = db(&svc).get_user_by_telegram_id(555).unwrap().unwrap();
        assert_eq!(canonical.user_id, web.user_id);

        let mut ids: Vec<String> = db(&svc)
            .list_bills_by_user(&web.user_id)
            .unwrap()
            .into_iter()
            .map(|b| b.bill_id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["b1", "b2"]);

        // the old chat key owns nothing anymore
        assert!(db(&svc).list_bills_by_user(&chat.user_id).unwrap().is_empty());

        // orphaned record survives but holds no identity pointer
        let orphan = db(&svc).get_user_by_id(&chat.user_id).unwrap().unwrap();
        assert!(orphan.telegram_id.is_none());
        assert!(orphan.auth_id.is_none());
    }

    #[test]
    fn relink_of_already_linked_pair_is_idempotent() {
        let svc = service();
        let code = svc.issue_code(555).unwrap();
        svc.verify_and_link(&code, "web_abc").unwrap();

        // a fresh code against the already-linked pair is a no-op success
        let code = svc.issue_code(555).unwrap();
        svc.verify_and_link(&code, "web_abc").unwrap();

        let user = db(&svc).get_user_by_auth_id("web_abc").unwrap().unwrap();
        assert_eq!(user.telegram_id, Some(555));
    }

    #[test]
    fn get_or_create_returns_same_user_twice() {
        let svc = service();
        let first = svc.get_or_create_by_telegram(555).unwrap();
        let second = svc.get_or_create_by_telegram(555).unwrap();
        assert_eq!(first.user_id, second.user_id);

        let first = svc.get_or_create_by_auth("web_abc").unwrap();
        let second = svc.get_or_create_by_auth("web_abc").unwrap();
        assert_eq!(first.user_id, second.user_id);
    }
}
