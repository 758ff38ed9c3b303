use std::time::Duration;

use anyhow::{Context, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use billfold_types::api::ParsedReceipt;
use billfold_types::intent::Intent;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

const RECEIPT_PROMPT: &str = r#"Analyze this bill/receipt image and extract the following information in JSON format:
{
  "items": [
    {
      "description": "item name",
      "amount": numeric_amount,
      "category": "Food|Transportation|Entertainment|Shopping|Utilities|Healthcare|Other"
    }
  ],
  "total_amount": numeric_total,
  "currency": "USD|PEN|EUR|etc",
  "date": "YYYY-MM-DD",
  "merchant_name": "store/restaurant name"
}

Rules:
- Extract ALL line items from the receipt
- Categorize each item appropriately
- Use the currency symbol or text to determine the currency (default to USD if unclear)
- Extract the date in YYYY-MM-DD format (use today's date if not visible)
- Return ONLY valid JSON, no additional text or explanation"#;

const INTENT_PROMPT: &str = r#"Classify the user's message into one of these intents and respond with JSON only:
{"type": "list_bills" | "summary_bills" | "create_expense" | "unknown", "confidence": 0.0-1.0, "parameters": {}}

- list_bills: the user wants to see their recent bills or expenses
- summary_bills: the user wants totals or a spending summary
- create_expense: the user describes a purchase to record
- unknown: anything else"#;

/// Client for the external vision/text-understanding API (OpenAI-compatible
/// chat completions). Treated as a black box: images in, tagged JSON out.
#[derive(Clone)]
pub struct VisionClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

impl VisionClient {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            api_key,
            base_url,
            model,
        }
    }

    pub async fn parse_receipt(&self, image: &[u8]) -> anyhow::Result<ParsedReceipt> {
        let data_url = format!("data:image/jpeg;base64,{}", B64.encode(image));
        let content = self
            .complete(json!([{
                "role": "user",
                "content": [
                    {"type": "image_url", "image_url": {"url": data_url}},
                    {"type": "text", "text": RECEIPT_PROMPT},
                ],
            }]))
            .await?;

        serde_json::from_str(strip_fences(&content))
            .with_context(|| format!("unparseable receipt response: {}", content))
    }

    pub async fn detect_intent(&self, text: &str) -> anyhow::Result<Intent> {
        let content = self
            .complete(json!([
                {"role": "system", "content": INTENT_PROMPT},
                {"role": "user", "content": text},
            ]))
            .await?;

        serde_json::from_str(strip_fences(&content))
            .with_context(|| format!("unparseable intent response: {}", content))
    }

    async fn complete(&self, messages: serde_json::Value) -> anyhow::Result<String> {
        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "stream": false,
                "messages": messages,
            }))
            .send()
            .await?
            .error_for_status()?;

        let body: ChatResponse = resp.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow!("empty completion response"))?;
        debug!("Completion response: {}", content);
        Ok(content)
    }
}

/// Models occasionally wrap the JSON in a markdown code fence despite the
/// prompt; strip it before parsing.
fn strip_fences(content: &str) -> &str {
    let trimmed = content.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}
