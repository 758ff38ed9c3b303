use serde::Deserialize;

/// Classification of a free-text chat message, produced by the external
/// text-understanding API. The classifier is a black box; we only consume
/// its tagged output.
#[derive(Debug, Clone, Deserialize)]
pub struct Intent {
    #[serde(rename = "type")]
    pub kind: IntentKind,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    ListBills,
    SummaryBills,
    CreateExpense,
    #[serde(other)]
    Unknown,
}
