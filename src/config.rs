use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub session_ttl_hours: i64,

    // payment processor
    pub payment_api_base: String,
    pub payment_secret_key: String,
    pub payment_webhook_secret: String,
    pub checkout_return_url: String,

    // assistant proxy
    pub assistant_api_base: String,
    pub assistant_api_key: String,
    pub assistant_model: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let session_ttl_hours = env::var("SESSION_TTL_HOURS")
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(24);

        let payment_api_base = env::var("PAYMENT_API_BASE")
            .unwrap_or_else(|_| "https://api.stripe.com".to_string());
        let payment_secret_key = env::var("PAYMENT_SECRET_KEY")?;
        let payment_webhook_secret = env::var("PAYMENT_WEBHOOK_SECRET")?;
        let checkout_return_url = env::var("CHECKOUT_RETURN_URL")
            .unwrap_or_else(|_| "http://localhost:5173/payments/return".to_string());

        let assistant_api_base = env::var("ASSISTANT_API_BASE")
            .unwrap_or_else(|_| "https://api.openai.com".to_string());
        let assistant_api_key = env::var("ASSISTANT_API_KEY")?;
        let assistant_model =
            env::var("ASSISTANT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        Ok(Self {
            database_url,
            bind_addr,
            session_ttl_hours,
            payment_api_base,
            payment_secret_key,
            payment_webhook_secret,
            checkout_return_url,
            assistant_api_base,
            assistant_api_key,
            assistant_model,
        })
    }
}
