use serde::Deserialize;

use crate::types::ChannelType;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 10)
    pub db_max_connections: u32,

    /// Seconds between dispatcher ticks (default: 60)
    pub dispatch_interval_secs: u64,

    /// Failed attempts before a notification is marked failed (unset: retry forever)
    pub dispatch_max_attempts: Option<u32>,

    /// Per-notification claim lease in seconds (unset: single-instance mode)
    pub dispatch_claim_lease_secs: Option<u64>,

    /// Transport used for delivery (default: log)
    pub delivery_channel: ChannelType,

    /// Outbound HTTP timeout for delivery channels in seconds (default: 10)
    pub delivery_timeout_secs: u64,

    /// HMAC secret used to sign webhook bodies
    pub webhook_secret: Option<String>,

    /// Telegram bot token
    pub telegram_bot_token: Option<String>,

    /// Resend API key for email delivery
    pub resend_api_key: Option<String>,

    /// Email sender address
    pub email_from: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            database_url: lookup("DATABASE_URL")
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            db_max_connections: lookup("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|| "10".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
            dispatch_interval_secs: lookup("DISPATCH_INTERVAL_SECS")
                .unwrap_or_else(|| "60".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DISPATCH_INTERVAL_SECS must be a valid u64"))?,
            dispatch_max_attempts: lookup("DISPATCH_MAX_ATTEMPTS")
                .map(|v| v.parse())
                .transpose()
                .map_err(|_| anyhow::anyhow!("DISPATCH_MAX_ATTEMPTS must be a valid u32"))?,
            dispatch_claim_lease_secs: lookup("DISPATCH_CLAIM_LEASE_SECS")
                .map(|v| v.parse())
                .transpose()
                .map_err(|_| anyhow::anyhow!("DISPATCH_CLAIM_LEASE_SECS must be a valid u64"))?,
            delivery_channel: lookup("DELIVERY_CHANNEL")
                .unwrap_or_else(|| "log".to_string())
                .parse()
                .map_err(|e: String| anyhow::anyhow!("DELIVERY_CHANNEL: {}", e))?,
            delivery_timeout_secs: lookup("DELIVERY_TIMEOUT_SECS")
                .unwrap_or_else(|| "10".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DELIVERY_TIMEOUT_SECS must be a valid u64"))?,
            webhook_secret: lookup("WEBHOOK_SECRET"),
            telegram_bot_token: lookup("TELEGRAM_BOT_TOKEN"),
            resend_api_key: lookup("RESEND_API_KEY"),
            email_from: lookup("EMAIL_FROM"),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the dispatcher cannot start with.
    fn validate(&self) -> anyhow::Result<()> {
        if self.db_max_connections < 2 {
            anyhow::bail!("DB_MAX_CONNECTIONS must be at least 2: a tick pins one connection");
        }
        if self.dispatch_interval_secs == 0 {
            anyhow::bail!("DISPATCH_INTERVAL_SECS must be greater than zero");
        }
        if self.dispatch_max_attempts == Some(0) {
            anyhow::bail!("DISPATCH_MAX_ATTEMPTS must be greater than zero when set");
        }
        if self.dispatch_claim_lease_secs == Some(0) {
            anyhow::bail!("DISPATCH_CLAIM_LEASE_SECS must be greater than zero when set");
        }

        match self.delivery_channel {
            ChannelType::Telegram if self.telegram_bot_token.is_none() => {
                anyhow::bail!("TELEGRAM_BOT_TOKEN is required when DELIVERY_CHANNEL=telegram")
            }
            ChannelType::Email if self.resend_api_key.is_none() || self.email_from.is_none() => {
                anyhow::bail!("RESEND_API_KEY and EMAIL_FROM are required when DELIVERY_CHANNEL=email")
            }
            _ => Ok(()),
        }
    }
}
