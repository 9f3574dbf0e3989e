use std::env;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono_tz::Tz;
use url::Url;

use crate::db::DEFAULT_MAX_POOL_SIZE;

pub const DEFAULT_SENADO_API_BASE_URL: &str = "https://legis.senado.leg.br/dadosabertos";
pub const DEFAULT_CRON_SCHEDULE: &str = "0 6 * * *";
pub const DEFAULT_CRON_TIMEZONE: Tz = chrono_tz::America::Sao_Paulo;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_pool_size: u32,
    pub server_host: String,
    pub server_port: u16,
    pub senado_api_base_url: String,
    pub senado_api_timeout: Duration,
    pub senado_api_min_interval: Duration,
    pub cron_schedule: String,
    pub cron_timezone: Tz,
    pub sync_year_pause: Duration,
    pub cors_allowed_origin: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = match env::var("DATABASE_URL") {
            Ok(url) => url,
            Err(_) => build_database_url(
                &env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
                env::var("DB_PORT")
                    .unwrap_or_else(|_| "5432".to_string())
                    .parse()
                    .context("DB_PORT must be a valid u16")?,
                &env::var("DB_NAME").unwrap_or_else(|_| "senado_db".to_string()),
                &env::var("DB_USER").unwrap_or_else(|_| "postgres".to_string()),
                env::var("DB_PASSWORD").ok().as_deref(),
            )?,
        };
        let database_max_pool_size = env::var("DATABASE_MAX_POOL_SIZE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_POOL_SIZE);
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let server_port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("PORT must be a valid u16")?;
        let senado_api_base_url = env::var("SENADO_API_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_SENADO_API_BASE_URL.to_string());
        let senado_api_timeout = Duration::from_secs(
            env::var("SENADO_API_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("SENADO_API_TIMEOUT_SECS must be an integer")?,
        );
        let senado_api_min_interval = Duration::from_millis(
            env::var("SENADO_API_MIN_INTERVAL_MS")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .context("SENADO_API_MIN_INTERVAL_MS must be an integer")?,
        );
        let cron_schedule =
            env::var("CRON_SCHEDULE").unwrap_or_else(|_| DEFAULT_CRON_SCHEDULE.to_string());
        let cron_timezone = match env::var("CRON_TIMEZONE") {
            Ok(name) => parse_timezone(&name)?,
            Err(_) => DEFAULT_CRON_TIMEZONE,
        };
        let sync_year_pause = Duration::from_millis(
            env::var("SYNC_YEAR_PAUSE_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .context("SYNC_YEAR_PAUSE_MS must be an integer")?,
        );
        let cors_allowed_origin = env::var("CORS_ALLOWED_ORIGIN").ok();

        Ok(Self {
            database_url,
            database_max_pool_size,
            server_host,
            server_port,
            senado_api_base_url,
            senado_api_timeout,
            senado_api_min_interval,
            cron_schedule,
            cron_timezone,
            sync_year_pause,
            cors_allowed_origin,
        })
    }

    pub fn redacted_database_url(&self) -> String {
        redact_database_url(&self.database_url)
    }
}

pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|err| anyhow!("CRON_TIMEZONE must be an IANA time zone name: {err}"))
}

fn build_database_url(
    host: &str,
    port: u16,
    database: &str,
    user: &str,
    password: Option<&str>,
) -> Result<String> {
    let mut url = Url::parse("postgres://localhost").context("invalid base database url")?;
    url.set_host(Some(host))
        .with_context(|| format!("DB_HOST is not a valid host: {host}"))?;
    url.set_port(Some(port))
        .map_err(|_| anyhow!("DB_PORT cannot be applied to database url"))?;
    url.set_username(user)
        .map_err(|_| anyhow!("DB_USER cannot be applied to database url"))?;
    if let Some(password) = password.filter(|value| !value.is_empty()) {
        url.set_password(Some(password))
            .map_err(|_| anyhow!("DB_PASSWORD cannot be applied to database url"))?;
    }
    url.set_path(&format!("/{database}"));
    Ok(url.to_string())
}

fn redact_database_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("*****"));
            }
            parsed.to_string()
        }
        Err(_) => "***".to_string(),
    }
}
