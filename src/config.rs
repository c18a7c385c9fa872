use std::env;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub s3_bucket: String,
    pub s3_region: String,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub storage_timeout_secs: u64,
    pub labels_service_url: Option<String>,
    pub external_timeout_secs: u64,
    pub mail_relay_url: Option<String>,
    pub sender_email: String,
    pub site_url: String,
    pub notification_workers: usize,
    pub queue_poll_interval_secs: u64,
    pub queue_visibility_timeout_secs: u64,
    pub auth_jwks_url: Option<String>,
    pub auth_jwks_ttl_secs: u64,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            database_url: env::var("DATABASE_URL")?,
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: parse_or("SERVER_PORT", 8000),
            s3_bucket: env::var("S3_BUCKET_NAME")?,
            s3_region: env::var("AWS_REGION").unwrap_or_else(|_| "ap-southeast-1".to_string()),
            aws_access_key_id: non_empty("AWS_ACCESS_KEY_ID"),
            aws_secret_access_key: non_empty("AWS_SECRET_ACCESS_KEY"),
            storage_timeout_secs: parse_or("STORAGE_TIMEOUT_SECS", 30),
            labels_service_url: non_empty("LABELS_SERVICE_URL"),
            external_timeout_secs: parse_or("EXTERNAL_TIMEOUT_SECS", 10),
            mail_relay_url: non_empty("MAIL_RELAY_URL"),
            sender_email: env::var("SES_EMAIL")
                .unwrap_or_else(|_| "no-reply@lostandfound.local".to_string()),
            site_url: env::var("SITE_URL")
                .unwrap_or_else(|_| "http://localhost:3000/".to_string()),
            notification_workers: parse_or("NOTIFICATION_WORKERS", 1),
            queue_poll_interval_secs: parse_or("QUEUE_POLL_INTERVAL_SECS", 5),
            queue_visibility_timeout_secs: parse_or("QUEUE_VISIBILITY_TIMEOUT_SECS", 60),
            auth_jwks_url: non_empty("AUTH_JWKS_URL"),
            auth_jwks_ttl_secs: parse_or("AUTH_JWKS_TTL_SECS", 3600),
            max_upload_bytes: parse_or("MAX_UPLOAD_BYTES", 20 * 1024 * 1024),
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_secs(self.storage_timeout_secs)
    }

    pub fn external_timeout(&self) -> Duration {
        Duration::from_secs(self.external_timeout_secs)
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
