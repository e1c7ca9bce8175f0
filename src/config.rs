use std::{env, net::SocketAddr, path::PathBuf, time::Duration};

use thiserror::Error;

use crate::utils::encryption::{decode_key, EncryptionError};

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_LINKEDIN_API_BASE: &str = "https://api.linkedin.com";
const DEFAULT_PLATFORM_TIMEOUT_SECS: u64 = 20;
const DEFAULT_MEDIA_URL_TTL_SECS: u64 = 300;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("TOKEN_ENCRYPTION_KEY is invalid: {0}")]
    EncryptionKey(#[from] EncryptionError),
}

#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
    pub tls_disabled: bool,
}

#[derive(Debug, Clone)]
pub struct MediaSettings {
    pub root: PathBuf,
    pub public_base_url: String,
    pub signing_secret: Vec<u8>,
    pub url_ttl: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitSettings {
    pub per_millisecond: u64,
    pub burst: u32,
    pub auth_per_second: u64,
    pub auth_burst: u32,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub frontend_origin: String,
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub auth_cookie_secure: bool,
    pub token_encryption_key: Vec<u8>,
    pub smtp: SmtpSettings,
    pub media: MediaSettings,
    pub linkedin_api_base: String,
    pub platform_timeout: Duration,
    pub rate_limit: RateLimitSettings,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok(); // Load .env file
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &'static str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let database_url = require("DATABASE_URL")?;
        let frontend_origin = require("FRONTEND_ORIGIN")?
            .trim_end_matches('/')
            .to_string();
        let jwt_secret = require("JWT_SECRET")?;
        let token_encryption_key = decode_key(&require("TOKEN_ENCRYPTION_KEY")?)?;

        let bind_addr = parse_or(
            "BIND_ADDR",
            get("BIND_ADDR"),
            DEFAULT_BIND_ADDR.parse::<SocketAddr>().map_err(|e| {
                ConfigError::Invalid {
                    key: "BIND_ADDR",
                    reason: e.to_string(),
                }
            })?,
        )?;

        let smtp = SmtpSettings {
            host: get("SMTP_HOST").unwrap_or_else(|| "localhost".to_string()),
            port: parse_or("SMTP_PORT", get("SMTP_PORT"), 587u16)?,
            username: get("SMTP_USERNAME"),
            password: get("SMTP_PASSWORD"),
            from: get("SMTP_FROM").unwrap_or_else(|| "no-reply@localhost".to_string()),
            tls_disabled: parse_bool(get("SMTP_TLS_DISABLED"), false),
        };

        let media = MediaSettings {
            root: PathBuf::from(get("MEDIA_ROOT").unwrap_or_else(|| "./media".to_string())),
            public_base_url: get("MEDIA_PUBLIC_BASE_URL")
                .unwrap_or_else(|| format!("http://{}", bind_addr))
                .trim_end_matches('/')
                .to_string(),
            signing_secret: get("MEDIA_SIGNING_SECRET")
                .unwrap_or_else(|| jwt_secret.clone())
                .into_bytes(),
            url_ttl: Duration::from_secs(parse_or(
                "MEDIA_URL_TTL_SECONDS",
                get("MEDIA_URL_TTL_SECONDS"),
                DEFAULT_MEDIA_URL_TTL_SECS,
            )?),
        };

        let rate_limit = RateLimitSettings {
            // Default: 200ms/token (~5 req/sec)
            per_millisecond: parse_or(
                "RATE_LIMITER_MILLISECONDS",
                get("RATE_LIMITER_MILLISECONDS"),
                200u64,
            )?,
            burst: parse_or("RATE_LIMITER_BURST", get("RATE_LIMITER_BURST"), 20u32)?,
            auth_per_second: parse_or(
                "RATE_LIMITER_AUTH_SECONDS",
                get("RATE_LIMITER_AUTH_SECONDS"),
                1u64,
            )?,
            auth_burst: parse_or(
                "RATE_LIMITER_AUTH_BURST",
                get("RATE_LIMITER_AUTH_BURST"),
                10u32,
            )?,
        };

        Ok(Config {
            database_url,
            frontend_origin,
            bind_addr,
            jwt_secret,
            jwt_issuer: get("JWT_ISSUER").unwrap_or_else(|| "postroom".to_string()),
            jwt_audience: get("JWT_AUDIENCE").unwrap_or_else(|| "postroom-app".to_string()),
            auth_cookie_secure: parse_bool(get("AUTH_COOKIE_SECURE"), true),
            token_encryption_key,
            smtp,
            media,
            linkedin_api_base: get("LINKEDIN_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_LINKEDIN_API_BASE.to_string()),
            platform_timeout: Duration::from_secs(parse_or(
                "PLATFORM_TIMEOUT_SECONDS",
                get("PLATFORM_TIMEOUT_SECONDS"),
                DEFAULT_PLATFORM_TIMEOUT_SECS,
            )?),
            rate_limit,
        })
    }
}

fn parse_or<T>(key: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_bool(value: Option<String>, default: bool) -> bool {
    value
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        database_url: String::new(),
        frontend_origin: "http://localhost:5173".into(),
        bind_addr: DEFAULT_BIND_ADDR.parse().unwrap(),
        jwt_secret: "0123456789abcdef0123456789abcdef".into(),
        jwt_issuer: "postroom".into(),
        jwt_audience: "postroom-app".into(),
        auth_cookie_secure: false,
        token_encryption_key: vec![9u8; 32],
        smtp: SmtpSettings {
            host: "localhost".into(),
            port: 2525,
            username: None,
            password: None,
            from: "no-reply@localhost".into(),
            tls_disabled: true,
        },
        media: MediaSettings {
            root: std::env::temp_dir().join("postroom-test-media"),
            public_base_url: "http://localhost:3000".into(),
            signing_secret: b"media-signing-secret".to_vec(),
            url_ttl: Duration::from_secs(DEFAULT_MEDIA_URL_TTL_SECS),
        },
        linkedin_api_base: DEFAULT_LINKEDIN_API_BASE.into(),
        platform_timeout: Duration::from_secs(5),
        rate_limit: RateLimitSettings {
            per_millisecond: 200,
            burst: 20,
            auth_per_second: 1,
            auth_burst: 10,
        },
    }
}
