mod client;
mod handlers;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use billfold_core::bills::BillService;
use billfold_core::config::Config;
use billfold_core::link::AccountLinkService;
use billfold_core::stats::StatsService;
use billfold_core::vision::VisionClient;

use crate::client::TelegramClient;
use crate::handlers::BotHandler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "billfold=debug".into()),
        )
        .init();

    let cfg = Config::from_env();
    anyhow::ensure!(
        !cfg.telegram_token.is_empty(),
        "BILLFOLD_TELEGRAM_TOKEN must be set"
    );

    let db = Arc::new(billfold_db::Database::open(&PathBuf::from(&cfg.db_path))?);

    let handler = BotHandler {
        client: TelegramClient::new(cfg.telegram_token.clone()),
        link: AccountLinkService::new(db.clone(), cfg.otp_ttl_minutes),
        bills: BillService::new(db.clone()),
        stats: StatsService::new(db),
        vision: VisionClient::new(cfg.llm_api_key, cfg.llm_base_url, cfg.llm_model),
    };

    info!("Billfold bot polling for updates");

    let mut offset = 0i64;
    loop {
        match handler.client.get_updates(offset).await {
            Ok(updates) => {
                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    handler.handle_update(update).await;
                }
            }
            Err(e) => {
                error!("Polling failed: {}", e);
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        }
    }
}
