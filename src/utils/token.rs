//! Service-to-service auth token, refreshed in the background.
//!
//! The provider owns a refresh task started at construction and stopped via
//! [`ServiceTokenProvider::shutdown`] (or drop). Readers take the current
//! token from a watch channel; there is no global state.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{DocPipeError, Result};

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub issuer: String,
    pub secret: String,
    pub roles: Vec<String>,
    /// Token validity window.
    pub ttl: Duration,
    /// How often a fresh token is minted. Must be shorter than `ttl`.
    pub refresh_interval: Duration,
}

impl TokenConfig {
    pub fn new(issuer: impl Into<String>, secret: impl Into<String>, roles: Vec<String>) -> Self {
        TokenConfig {
            issuer: issuer.into(),
            secret: secret.into(),
            roles,
            ttl: Duration::from_secs(5 * 60),
            refresh_interval: Duration::from_secs(3 * 60),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    iss: String,
    sub: String,
    roles: Vec<String>,
    iat: i64,
    exp: i64,
}

/// Holds the current self-signed service token and keeps it fresh.
pub struct ServiceTokenProvider {
    current: watch::Receiver<String>,
    refresh_task: JoinHandle<()>,
}

impl ServiceTokenProvider {
    /// Mint an initial token (failing fast on a bad key/config) and start
    /// the refresh loop.
    pub fn start(config: TokenConfig) -> Result<Self> {
        let initial = generate_token(&config)?;
        let (tx, rx) = watch::channel(initial);

        let refresh_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(config.refresh_interval);
            // First tick fires immediately; the initial token already covers it.
            interval.tick().await;
            loop {
                interval.tick().await;
                match generate_token(&config) {
                    Ok(token) => {
                        debug!("Refreshed service token");
                        if tx.send(token).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "Failed to refresh service token"),
                }
            }
        });

        Ok(ServiceTokenProvider {
            current: rx,
            refresh_task,
        })
    }

    pub fn token(&self) -> String {
        self.current.borrow().clone()
    }

    pub fn shutdown(&self) {
        self.refresh_task.abort();
    }
}

impl Drop for ServiceTokenProvider {
    fn drop(&mut self) {
        self.refresh_task.abort();
    }
}

fn generate_token(config: &TokenConfig) -> Result<String> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        iss: config.issuer.clone(),
        sub: "docpipe".to_string(),
        roles: config.roles.clone(),
        iat: now,
        exp: now + config.ttl.as_secs() as i64,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .map_err(|e| DocPipeError::ConfigError(format!("Failed to sign service token: {e}")))
}
