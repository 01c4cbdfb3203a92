use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{anyhow, Context};
use tracing::{info, warn};

pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub classifier_url: String,
    pub classifier_api_key: Option<String>,
    pub classifier_model: String,
    pub classifier_timeout: Duration,
    pub blob_root: PathBuf,
    pub blob_public_url: String,
    pub email_domain: String,
    pub admin_signup_code: Option<String>,
    pub page_size: usize,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .context("DATABASE_URL must be set to a Postgres instance")?,
            max_connections: try_load("DATABASE_MAX_CONNECTIONS", "5")?,
            classifier_url: try_load(
                "CLASSIFIER_URL",
                "https://api.openai.com/v1/chat/completions",
            )?,
            classifier_api_key: optional("CLASSIFIER_API_KEY"),
            classifier_model: try_load("CLASSIFIER_MODEL", "gpt-4o-mini")?,
            classifier_timeout: Duration::from_secs(try_load("CLASSIFIER_TIMEOUT_SECS", "30")?),
            blob_root: try_load("BLOB_ROOT", "./blobs")?,
            blob_public_url: try_load("BLOB_PUBLIC_URL", "http://localhost:8080/blobs")?,
            email_domain: try_load("CAMPUS_EMAIL_DOMAIN", "hitam.org")?,
            admin_signup_code: optional("ADMIN_SIGNUP_CODE"),
            page_size: try_load("INCIDENT_PAGE_SIZE", "10")?,
        })
    }
}

fn optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => {
            warn!("{key} not set");
            None
        }
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    raw.parse()
        .map_err(|e| anyhow!("invalid {key} value '{raw}': {e}"))
}
