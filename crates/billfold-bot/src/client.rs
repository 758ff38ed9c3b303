use std::time::Duration;

use anyhow::{Context, anyhow};
use serde::Deserialize;
use serde_json::json;

const POLL_TIMEOUT_SECS: u64 = 30;

/// Minimal Telegram Bot API client: long-polling updates, replies, and file
/// downloads for photo messages.
#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    token: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    pub from: Option<Sender>,
    pub text: Option<String>,
    pub photo: Option<Vec<PhotoSize>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sender {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    #[serde(default)]
    pub file_size: i64,
}

#[derive(Debug, Deserialize)]
struct File {
    file_path: Option<String>,
}

impl TelegramClient {
    pub fn new(token: String) -> Self {
        Self {
            // the client timeout must outlast the long-poll window
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 10))
                .build()
                .unwrap_or_default(),
            token,
        }
    }

    pub async fn get_updates(&self, offset: i64) -> anyhow::Result<Vec<Update>> {
        self.call(
            "getUpdates",
            json!({ "offset": offset, "timeout": POLL_TIMEOUT_SECS }),
        )
        .await
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> anyhow::Result<()> {
        let _: Message = self
            .call(
                "sendMessage",
                json!({ "chat_id": chat_id, "text": text, "parse_mode": "Markdown" }),
            )
            .await?;
        Ok(())
    }

    pub async fn download_photo(&self, file_id: &str) -> anyhow::Result<Vec<u8>> {
        let file: File = self.call("getFile", json!({ "file_id": file_id })).await?;
        let path = file.file_path.context("file has no download path")?;

        let bytes = self
            .http
            .get(format!(
                "https://api.telegram.org/file/bot{}/{}",
                self.token, path
            ))
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> anyhow::Result<T> {
        let resp: ApiResponse<T> = self
            .http
            .post(format!(
                "https://api.telegram.org/bot{}/{}",
                self.token, method
            ))
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !resp.ok {
            return Err(anyhow!(
                "telegram api error: {}",
                resp.description.unwrap_or_else(|| "unknown".into())
            ));
        }
        resp.result
            .ok_or_else(|| anyhow!("telegram api returned no result"))
    }
}
