use std::env;

/// Runtime configuration, assembled once at boot from environment variables.
///
/// Mirrors the env-var-with-defaults convention already used by
/// `rate_limit::RateLimitConfig::from_env`.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub use_https: bool,
    pub session_timeout_hours: u64,
    pub max_content_length: u64,

    pub database_path: String,
    pub uploads_dir: String,

    pub state_store_redis_url: Option<String>,
    pub feature_redis_enabled: bool,

    pub socket_send_message_per_minute: usize,
    pub socket_pin_updated_per_minute: usize,

    pub feature_oidc_enabled: bool,
    pub oidc: OidcConfig,

    pub feature_av_scan_enabled: bool,
    pub av_scanner: String,
    pub av_clamd_host: String,
    pub av_clamd_port: u16,
    pub av_scan_timeout_secs: u64,

    pub maintenance_interval_seconds: u64,
    pub retention_days: i64,
}

#[derive(Debug, Clone, Default)]
pub struct OidcConfig {
    pub issuer_url: Option<String>,
    pub authorize_url: Option<String>,
    pub token_url: Option<String>,
    pub userinfo_url: Option<String>,
    pub jwks_url: Option<String>,
    pub client_id: String,
    pub client_secret: String,
    pub scope: String,
    pub redirect_uri: String,
    pub jwks_cache_seconds: u64,
    pub provider_name: String,
}

fn env_str(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => !(v == "0" || v.eq_ignore_ascii_case("false")),
        Err(_) => default,
    }
}

fn env_num<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> Self {
        let maintenance_interval_seconds = env_num("MAINTENANCE_INTERVAL_SECONDS", 60u64).max(30);

        Self {
            port: env_num("PORT", 8000),
            use_https: env_bool("USE_HTTPS", false),
            session_timeout_hours: env_num("SESSION_TIMEOUT_HOURS", 24 * 7),
            max_content_length: env_num("MAX_CONTENT_LENGTH", 16 * 1024 * 1024),

            database_path: env_str("DATABASE_PATH", "data/messenger.db"),
            uploads_dir: env_str("UPLOADS_DIR", "uploads"),

            state_store_redis_url: env_opt("STATE_STORE_REDIS_URL").or_else(|| env_opt("REDIS_URL")),
            feature_redis_enabled: env_bool("FEATURE_REDIS_ENABLED", false),

            socket_send_message_per_minute: env_num("SOCKET_SEND_MESSAGE_PER_MINUTE", 30),
            socket_pin_updated_per_minute: env_num("SOCKET_PIN_UPDATED_PER_MINUTE", 10),

            feature_oidc_enabled: env_bool("FEATURE_OIDC_ENABLED", false),
            oidc: OidcConfig {
                issuer_url: env_opt("OIDC_ISSUER_URL"),
                authorize_url: env_opt("OIDC_AUTHORIZE_URL"),
                token_url: env_opt("OIDC_TOKEN_URL"),
                userinfo_url: env_opt("OIDC_USERINFO_URL"),
                jwks_url: env_opt("OIDC_JWKS_URL"),
                client_id: env_str("OIDC_CLIENT_ID", ""),
                client_secret: env_str("OIDC_CLIENT_SECRET", ""),
                scope: env_str("OIDC_SCOPE", "openid profile email"),
                redirect_uri: env_str("OIDC_REDIRECT_URI", ""),
                jwks_cache_seconds: env_num("OIDC_JWKS_CACHE_SECONDS", 3600),
                provider_name: env_str("OIDC_PROVIDER_NAME", "sso"),
            },

            feature_av_scan_enabled: env_bool("FEATURE_AV_SCAN_ENABLED", false),
            av_scanner: env_str("AV_SCANNER", "clamd"),
            av_clamd_host: env_str("AV_CLAMD_HOST", "127.0.0.1"),
            av_clamd_port: env_num("AV_CLAMD_PORT", 3310),
            av_scan_timeout_secs: env_num("AV_SCAN_TIMEOUT_SECONDS", 15),

            maintenance_interval_seconds,
            retention_days: env_num("RETENTION_DAYS", 0),
        }
    }

    /// True once the minimum fields needed to actually talk to a provider are present.
    pub fn oidc_enabled(&self) -> bool {
        self.feature_oidc_enabled
            && !self.oidc.client_id.is_empty()
            && !self.oidc.client_secret.is_empty()
            && (self.oidc.issuer_url.is_some() || self.oidc.authorize_url.is_some())
    }
}
