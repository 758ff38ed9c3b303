use chrono::Utc;
use tracing::{error, info, warn};

use billfold_core::bills::{BillService, NewBill, NewBillItem};
use billfold_core::link::AccountLinkService;
use billfold_core::stats::StatsService;
use billfold_core::vision::VisionClient;
use billfold_db::models::UserRow;
use billfold_types::intent::IntentKind;

use crate::client::{Message, TelegramClient, Update};

const WELCOME: &str = "Hi! I track your bills and expenses.\n\n\
    Send me a photo of a receipt and I'll record it. Use /link to connect \
    this chat to your web account.";
const LINK_CODE: &str = "Your link code is *{code}*.\n\n\
    Enter it on the web app within the next few minutes to connect your accounts.";
const LINK_ERROR: &str = "Sorry, I couldn't generate a link code right now. Please try again.";
const PROCESSING_IMAGE: &str = "Got it, reading your receipt...";
const ERROR_PROCESSING: &str = "Sorry, something went wrong while handling that.";
const UNKNOWN_INTENT: &str = "I didn't catch that. Send a receipt photo, ask for your \
    recent bills, or ask for a spending summary.";

/// PEN per USD applied when a receipt carries no rate of its own.
const FALLBACK_EXCHANGE_RATE: f64 = 3.75;

pub struct BotHandler {
    pub client: TelegramClient,
    pub link: AccountLinkService,
    pub bills: BillService,
    pub stats: StatsService,
    pub vision: VisionClient,
}

impl BotHandler {
    pub async fn handle_update(&self, update: Update) {
        let Some(message) = update.message else {
            return;
        };
        let chat_id = message.chat.id;

        if let Err(e) = self.dispatch(&message).await {
            error!("Update {} failed: {}", update.update_id, e);
            let _ = self.client.send_message(chat_id, ERROR_PROCESSING).await;
        }
    }

    async fn dispatch(&self, message: &Message) -> anyhow::Result<()> {
        let chat_id = message.chat.id;
        let telegram_id = message.from.as_ref().map(|s| s.id).unwrap_or(chat_id);

        if message.photo.is_some() {
            return self.handle_photo(message, telegram_id).await;
        }

        match message.text.as_deref() {
            Some("/start") => self.client.send_message(chat_id, WELCOME).await,
            Some("/link") => self.handle_link(chat_id, telegram_id).await,
            Some(text) => self.handle_text(chat_id, telegram_id, text).await,
            None => Ok(()),
        }
    }

    /// Chat-side user materialization, off the async runtime like every
    /// other database touch.
    async fn ensure_chat_user(&self, telegram_id: i64) -> anyhow::Result<UserRow> {
        let link = self.link.clone();
        let user =
            tokio::task::spawn_blocking(move || link.get_or_create_by_telegram(telegram_id))
                .await??;
        Ok(user)
    }

    async fn handle_link(&self, chat_id: i64, telegram_id: i64) -> anyhow::Result<()> {
        // materialize the user before issuing, so the code always points at
        // an existing chat identity
        if let Err(e) = self.ensure_chat_user(telegram_id).await {
            error!("get_or_create for {} failed: {}", telegram_id, e);
            return self.client.send_message(chat_id, LINK_ERROR).await;
        }

        let link = self.link.clone();
        match tokio::task::spawn_blocking(move || link.issue_code(telegram_id)).await? {
            Ok(code) => {
                info!("Issued link code for chat user {}", telegram_id);
                self.client
                    .send_message(chat_id, &LINK_CODE.replace("{code}", &code))
                    .await
            }
            Err(e) => {
                error!("Code issuance for {} failed: {}", telegram_id, e);
                self.client.send_message(chat_id, LINK_ERROR).await
            }
        }
    }

    async fn handle_text(&self, chat_id: i64, telegram_id: i64, text: &str) -> anyhow::Result<()> {
        let user = self.ensure_chat_user(telegram_id).await?;

        let intent = match self.vision.detect_intent(text).await {
            Ok(intent) => intent,
            Err(e) => {
                warn!("Intent detection failed: {}", e);
                return self.client.send_message(chat_id, UNKNOWN_INTENT).await;
            }
        };
        info!(
            "Intent for chat user {}: {:?} ({:.2})",
            telegram_id, intent.kind, intent.confidence
        );

        match intent.kind {
            IntentKind::ListBills => self.reply_bill_list(chat_id, &user.user_id).await,
            IntentKind::SummaryBills => self.reply_summary(chat_id, &user.user_id).await,
            IntentKind::CreateExpense | IntentKind::Unknown => {
                self.client.send_message(chat_id, UNKNOWN_INTENT).await
            }
        }
    }

    async fn handle_photo(&self, message: &Message, telegram_id: i64) -> anyhow::Result<()> {
        let chat_id = message.chat.id;
        let user = self.ensure_chat_user(telegram_id).await?;

        self.client.send_message(chat_id, PROCESSING_IMAGE).await?;

        // telegram sends several resolutions; take the largest
        let photo = message
            .photo
            .as_ref()
            .and_then(|sizes| sizes.iter().max_by_key(|p| p.file_size))
            .ok_or_else(|| anyhow::anyhow!("photo message without sizes"))?;

        let image = self.client.download_photo(&photo.file_id).await?;
        let parsed = self.vision.parse_receipt(&image).await?;

        let date = parsed
            .date
            .parse::<chrono::NaiveDate>()
            .map(|d| d.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc())
            .unwrap_or_else(|_| Utc::now());

        let new_bill = NewBill {
            description: parsed.merchant_name.clone(),
            category: "General".into(),
            currency: parsed.currency.clone(),
            exchange_rate: FALLBACK_EXCHANGE_RATE,
            date,
            source: "telegram".into(),
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

        let bills = self.bills.clone();
        let user_id = user.user_id;
        let (bill, expenses) =
            tokio::task::spawn_blocking(move || bills.create_with_expenses(&user_id, new_bill))
                .await??;

        let mut reply = format!(
            "Recorded *{}* — {} {:.2} ({} items):\n",
            if bill.description.is_empty() {
                "receipt"
            } else {
                &bill.description
            },
            bill.currency,
            if bill.currency == "PEN" {
                bill.amount_pen
            } else {
                bill.amount_usd
            },
            expenses.len(),
        );
        for e in &expenses {
            let amount = if e.currency == "PEN" {
                e.amount_pen
            } else {
                e.amount_usd
            };
            reply.push_str(&format!("- {}: {:.2}\n", e.description, amount));
        }
        self.client.send_message(chat_id, &reply).await
    }

    async fn reply_bill_list(&self, chat_id: i64, user_id: &str) -> anyhow::Result<()> {
        let svc = self.bills.clone();
        let owner = user_id.to_string();
        let bills = tokio::task::spawn_blocking(move || svc.list_for_user(&owner)).await??;
        if bills.is_empty() {
            return self
                .client
                .send_message(chat_id, "No bills recorded yet.")
                .await;
        }

        let mut reply = String::from("Your recent bills:\n");
        for (bill, _) in bills.iter().take(10) {
            reply.push_str(&format!(
                "- {} | {} | S/ {:.2} / $ {:.2}\n",
                billfold_core::parse_ts(&bill.date).format("%Y-%m-%d"),
                if bill.description.is_empty() {
                    &bill.category
                } else {
                    &bill.description
                },
                bill.amount_pen,
                bill.amount_usd,
            ));
        }
        self.client.send_message(chat_id, &reply).await
    }

    async fn reply_summary(&self, chat_id: i64, user_id: &str) -> anyhow::Result<()> {
        let svc = self.stats.clone();
        let owner = user_id.to_string();
        let dashboard = tokio::task::spawn_blocking(move || svc.dashboard(&owner, 1)).await??;
        let mut reply = format!(
            "You have {} bills totalling S/ {:.2} / $ {:.2}.\n",
            dashboard.total_bills, dashboard.total_pen, dashboard.total_usd
        );
        if !dashboard.category_stats.is_empty() {
            reply.push_str("By category:\n");
            for cat in &dashboard.category_stats {
                reply.push_str(&format!(
                    "- {}: S/ {:.2} ({:.0}%)\n",
                    cat.category, cat.total_pen, cat.percentage
                ));
            }
        }
        self.client.send_message(chat_id, &reply).await
    }
}
