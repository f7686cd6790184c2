//! Credential material available to a request: the platform session token,
//! static connection parameters, and the ingress identity headers.

use super::Secret;
use crate::config::WarehouseConfig;
use crate::error::{ConsoleError, Result};
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Header carrying the ingress user's name.
pub const INGRESS_USER_HEADER: &str = "Sf-Context-Current-User";

/// Header carrying the ingress user's impersonation token.
pub const INGRESS_TOKEN_HEADER: &str = "Sf-Context-Current-User-Token";

/// Identity forwarded by the trusted ingress layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngressIdentity {
    user: Option<String>,
    token: Option<Secret>,
}

impl IngressIdentity {
    /// Blank header values count as absent.
    pub fn new(user: Option<&str>, token: Option<&str>) -> Self {
        let user = user
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(String::from);
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(Secret::new);
        Self { user, token }
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn token(&self) -> Option<&Secret> {
        self.token.as_ref()
    }

    /// True when an impersonation token was forwarded.
    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }
}

/// Reads the platform session token from its well-known location.
#[derive(Debug, Clone)]
pub struct SessionTokenSource {
    path: PathBuf,
}

impl SessionTokenSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Reads the token fresh; a missing or unreadable file yields `None`.
    pub async fn read(&self) -> Option<Secret> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => {
                let token = content.trim();
                if token.is_empty() {
                    warn!(path = %self.path.display(), "Session token file is empty");
                    None
                } else {
                    Some(Secret::new(token))
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No session token file");
                None
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Session token file unreadable");
                None
            }
        }
    }
}

/// Static connection parameters resolved once at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticConnectionParams {
    pub account: Option<String>,
    pub host: Option<String>,
    pub port: u16,
    pub protocol: String,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub warehouse: Option<String>,
    pub role: Option<String>,
    pub user: Option<String>,
    pub password: Option<Secret>,
    pub private_key: Option<Secret>,
}

impl StaticConnectionParams {
    /// Builds the parameters, loading the private key file if one is configured.
    pub fn from_config(config: &WarehouseConfig) -> Result<Self> {
        let private_key = match &config.private_key_path {
            Some(path) => {
                let pem = std::fs::read_to_string(path).map_err(|e| {
                    ConsoleError::config(format!(
                        "Failed to read private key {}: {e}",
                        path.display()
                    ))
                })?;
                Some(Secret::new(pem))
            }
            None => None,
        };

        Ok(Self {
            account: config.account.clone(),
            host: config.host.clone(),
            port: config.port,
            protocol: config.protocol.clone(),
            database: config.database.clone(),
            schema: config.schema.clone(),
            warehouse: config.warehouse.clone(),
            role: config.role.clone(),
            user: config.user.clone(),
            password: config
                .password
                .as_deref()
                .filter(|p| !p.is_empty())
                .map(Secret::new),
            private_key,
        })
    }
}

/// Everything the resolver may draw identity material from.
#[derive(Debug, Clone)]
pub struct AmbientCredentials {
    pub session_token: Option<Secret>,
    pub params: StaticConnectionParams,
    pub ingress: IngressIdentity,
}

impl AmbientCredentials {
    pub fn new(
        session_token: Option<Secret>,
        params: StaticConnectionParams,
        ingress: IngressIdentity,
    ) -> Self {
        Self {
            session_token,
            params,
            ingress,
        }
    }
}
