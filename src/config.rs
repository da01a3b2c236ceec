// config.rs
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub app_url: String,
    pub jwt_secret: String,
    pub jwt_maxage: i64,
    pub port: u16,
    // Payment processor configuration
    pub processor_secret_key: String,
    pub processor_base_url: String,
    pub processor_timeout_secs: u64,
    // Completion & settlement policy
    pub pricing: PricingConfig,
}

/// Fee schedule and completion policy. Mirrors what the pricing
/// backoffice exposes; env-overridable with sane defaults.
#[derive(Debug, Clone)]
pub struct PricingConfig {
    pub platform_fee_percent: f64,
    pub multi_worker_fee_percent: f64,
    pub auto_approval_hours: i64,
    pub solo_bonus_cents: i64,
    pub solo_offer_hours: i64,
    pub min_on_site_minutes: i64,
    pub requires_evidence: bool,
}

impl Config {
    pub fn init() -> Config {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let jwt_secret = std::env::var("JWT_SECRET_KEY").expect("JWT_SECRET_KEY must be set");
        let jwt_maxage = std::env::var("JWT_MAXAGE").expect("JWT_MAXAGE must be set");
        let app_url = std::env::var("APP_URL").unwrap_or_else(|_| "http://localhost:8000".to_string());

        let processor_secret_key = std::env::var("PROCESSOR_SECRET_KEY")
            .unwrap_or_else(|_| "test_secret_key".to_string());
        let processor_base_url = std::env::var("PROCESSOR_BASE_URL")
            .unwrap_or_else(|_| "https://api.processor.example".to_string());
        let processor_timeout_secs = env_parse("PROCESSOR_TIMEOUT_SECS", 15u64);

        let pricing = PricingConfig {
            platform_fee_percent: env_parse("PLATFORM_FEE_PERCENT", 10.0f64),
            multi_worker_fee_percent: env_parse("MULTI_WORKER_FEE_PERCENT", 13.0f64),
            auto_approval_hours: env_parse("AUTO_APPROVAL_HOURS", 48i64),
            solo_bonus_cents: env_parse("SOLO_BONUS_CENTS", 500i64),
            solo_offer_hours: env_parse("SOLO_OFFER_HOURS", 12i64),
            min_on_site_minutes: env_parse("MIN_ON_SITE_MINUTES", 30i64),
            requires_evidence: env_parse("REQUIRES_EVIDENCE", true),
        };

        Config {
            database_url,
            app_url,
            jwt_secret,
            jwt_maxage: jwt_maxage.parse::<i64>().unwrap(),
            port: env_parse("PORT", 8000u16),
            processor_secret_key,
            processor_base_url,
            processor_timeout_secs,
            pricing,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
