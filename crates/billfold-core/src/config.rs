/// Process configuration, loaded once at startup from the environment
/// (with `.env` support for local development). Everything non-secret has a
/// default; each binary checks the variables it actually needs.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: String,
    pub jwks_url: String,
    pub otp_ttl_minutes: i64,
    pub llm_api_key: String,
    pub llm_base_url: String,
    pub llm_model: String,
    pub telegram_token: String,
}

impl Config {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let otp_ttl_minutes = std::env::var("BILLFOLD_OTP_TTL_MINUTES")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(5);

        Self {
            host: std::env::var("BILLFOLD_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("BILLFOLD_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            db_path: std::env::var("BILLFOLD_DB_PATH").unwrap_or_else(|_| "billfold.db".into()),
            jwks_url: std::env::var("BILLFOLD_JWKS_URL").unwrap_or_default(),
            otp_ttl_minutes,
            llm_api_key: std::env::var("BILLFOLD_LLM_API_KEY").unwrap_or_default(),
            llm_base_url: std::env::var("BILLFOLD_LLM_BASE_URL")
                .unwrap_or_else(|_| "https://api.x.ai/v1".into()),
            llm_model: std::env::var("BILLFOLD_LLM_MODEL")
                .unwrap_or_else(|_| "grok-2-vision-1212".into()),
            telegram_token: std::env::var("BILLFOLD_TELEGRAM_TOKEN").unwrap_or_default(),
        }
    }
}
