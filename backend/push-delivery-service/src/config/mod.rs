use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use crate::error::AppError;

pub const DEFAULT_NOTIFICATION_TAG: &str = "squadplanner-notification";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub web_push: WebPushConfig,
    /// Native push is optional; without it device tokens get a failed outcome.
    pub fcm: Option<FcmConfig>,
    pub delivery: DeliveryConfig,
    pub auth: AuthConfig,
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct WebPushConfig {
    pub vapid_public_key: String,
    pub vapid_private_key: String,
    pub vapid_subject: String,
    /// Seconds the push service may hold an undelivered message.
    pub ttl_secs: u32,
    pub default_tag: String,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct FcmConfig {
    pub project_id: String,
    /// Service account JSON as downloaded from the Firebase console.
    pub service_account: String,
    pub gateway_url: Option<String>,
    pub token_uri: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    pub concurrency: usize,
    pub request_timeout_secs: u64,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub service_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            concurrency: 32,
            request_timeout_secs: 10,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let fcm = match env::var("FIREBASE_SERVICE_ACCOUNT") {
            Ok(service_account) if !service_account.trim().is_empty() => Some(FcmConfig {
                project_id: env::var("FIREBASE_PROJECT_ID")
                    .map_err(|_| missing("FIREBASE_PROJECT_ID"))?,
                service_account,
                gateway_url: env::var("FCM_GATEWAY_URL").ok(),
                token_uri: env::var("FCM_TOKEN_URI").ok(),
            }),
            _ => None,
        };

        Ok(Config {
            app: AppConfig {
                env: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                port: parse_or("APP_PORT", 8000)?,
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| missing("DATABASE_URL"))?,
                max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10)?,
            },
            web_push: WebPushConfig {
                vapid_public_key: env::var("VAPID_PUBLIC_KEY")
                    .map_err(|_| missing("VAPID_PUBLIC_KEY"))?,
                vapid_private_key: env::var("VAPID_PRIVATE_KEY")
                    .map_err(|_| missing("VAPID_PRIVATE_KEY"))?,
                vapid_subject: env::var("VAPID_SUBJECT")
                    .unwrap_or_else(|_| "mailto:contact@squadplanner.app".to_string()),
                ttl_secs: parse_or("WEB_PUSH_TTL_SECS", 86_400)?,
                default_tag: env::var("PUSH_DEFAULT_TAG")
                    .unwrap_or_else(|_| DEFAULT_NOTIFICATION_TAG.to_string()),
            },
            fcm,
            delivery: DeliveryConfig {
                concurrency: parse_or("PUSH_CONCURRENCY", 32)?,
                request_timeout_secs: parse_or("PUSH_REQUEST_TIMEOUT_SECS", 10)?,
            },
            auth: AuthConfig {
                service_key: env::var("PUSH_SERVICE_KEY")
                    .map_err(|_| missing("PUSH_SERVICE_KEY"))?,
            },
            cors: CorsConfig {
                allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                    .unwrap_or_default()
                    .split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect(),
            },
        })
    }
}

fn missing(name: &str) -> AppError {
    AppError::Configuration(format!("{} must be set", name))
}

fn parse_or<T: FromStr>(name: &str, default: T) -> Result<T, AppError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Configuration(format!("{} is not valid: {:?}", name, raw))),
        Err(_) => Ok(default),
    }
}

// Secrets are kept out of Debug output.
impl std::fmt::Debug for WebPushConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebPushConfig")
            .field("vapid_public_key", &self.vapid_public_key)
            .field("vapid_subject", &self.vapid_subject)
            .field("ttl_secs", &self.ttl_secs)
            .field("default_tag", &self.default_tag)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for FcmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FcmConfig")
            .field("project_id", &self.project_id)
            .field("gateway_url", &self.gateway_url)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig").finish_non_exhaustive()
    }
}
