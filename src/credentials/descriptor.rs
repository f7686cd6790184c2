//! Per-request connection descriptors and the identity selection rules.

use super::{AmbientCredentials, CompositeCredential, DowngradeReason, ExecutionMode};
use super::{ModeResolution, Secret};
use crate::error::{ConsoleError, Result};
use tracing::debug;

/// Identity presented to the warehouse. Exactly one kind per descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// Platform session token, owner's rights.
    Token(Secret),
    /// Session token joined with the ingress user's token, caller's rights.
    TokenWithImpersonation(CompositeCredential),
    /// Static login name and password.
    Password { user: String, password: Secret },
    /// Static login name and PEM private key.
    KeyPair { user: String, private_key: Secret },
    /// Interactive browser login; fails fast when unattended.
    ExternalBrowser { user: Option<String> },
}

/// Discriminant of [`Identity`], safe to log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKind {
    Token,
    TokenWithImpersonation,
    Password,
    KeyPair,
    ExternalBrowser,
}

impl IdentityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Token => "token",
            Self::TokenWithImpersonation => "token+impersonation",
            Self::Password => "password",
            Self::KeyPair => "key_pair",
            Self::ExternalBrowser => "external_browser",
        }
    }
}

impl Identity {
    pub fn kind(&self) -> IdentityKind {
        match self {
            Self::Token(_) => IdentityKind::Token,
            Self::TokenWithImpersonation(_) => IdentityKind::TokenWithImpersonation,
            Self::Password { .. } => IdentityKind::Password,
            Self::KeyPair { .. } => IdentityKind::KeyPair,
            Self::ExternalBrowser { .. } => IdentityKind::ExternalBrowser,
        }
    }
}

/// Everything needed to open one warehouse session.
///
/// Built fresh for each request and dropped with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub account: String,
    pub host: String,
    pub port: u16,
    pub protocol: String,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub warehouse: Option<String>,
    pub role: Option<String>,
    pub identity: Identity,
}

impl ConnectionDescriptor {
    /// Base URL of the warehouse endpoint.
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }
}

/// Descriptor plus the final mode decision.
#[derive(Debug, Clone)]
pub struct ResolvedContext {
    pub descriptor: ConnectionDescriptor,
    pub resolution: ModeResolution,
}

impl ResolvedContext {
    pub fn actual_mode(&self) -> ExecutionMode {
        self.resolution.actual_mode()
    }
}

/// Final mode decision for a request, including token-path downgrades.
///
/// Caller's rights can only be carried by the platform session token, so a
/// caller request that would be granted is downgraded when that path is
/// unusable.
pub fn resolve_mode(requested: ExecutionMode, ambient: &AmbientCredentials) -> ModeResolution {
    let resolution = ModeResolution::resolve(requested, ambient.ingress.has_token());
    if resolution != ModeResolution::CallerGranted {
        return resolution;
    }

    let params = &ambient.params;
    if ambient.session_token.is_none() {
        ModeResolution::CallerDowngraded {
            reason: DowngradeReason::NoSessionToken,
        }
    } else if params.account.is_none() || params.host.is_none() {
        ModeResolution::CallerDowngraded {
            reason: DowngradeReason::TokenEndpointUnconfigured,
        }
    } else {
        resolution
    }
}

/// Picks the identity for a request.
///
/// The platform session token is preferred whenever account and host are
/// configured; otherwise the static password, then the key pair, then the
/// interactive identity.
pub fn resolve_context(
    requested: ExecutionMode,
    ambient: &AmbientCredentials,
) -> Result<ResolvedContext> {
    let resolution = resolve_mode(requested, ambient);
    let params = &ambient.params;

    if let (Some(token), Some(account), Some(host)) = (
        ambient.session_token.as_ref(),
        params.account.as_ref(),
        params.host.as_ref(),
    ) {
        let identity = match resolution {
            ModeResolution::CallerGranted => {
                let impersonation = ambient.ingress.token().cloned().ok_or_else(|| {
                    ConsoleError::internal("caller's rights granted without an ingress token")
                })?;
                Identity::TokenWithImpersonation(CompositeCredential::new(
                    token.clone(),
                    impersonation,
                )?)
            }
            _ => Identity::Token(token.clone()),
        };

        return Ok(ResolvedContext {
            descriptor: build_descriptor(account.clone(), host.clone(), ambient, identity),
            resolution,
        });
    }

    if ambient.session_token.is_some() {
        debug!(
            account_configured = params.account.is_some(),
            host_configured = params.host.is_some(),
            "Session token present but account or host missing, using static identity"
        );
    }

    let account = params
        .account
        .clone()
        .ok_or_else(|| ConsoleError::config("No warehouse account configured"))?;
    let host = params
        .host
        .clone()
        .unwrap_or_else(|| format!("{account}.snowflakecomputing.com"));

    let identity = match (&params.user, &params.password, &params.private_key) {
        (Some(user), Some(password), _) => Identity::Password {
            user: user.clone(),
            password: password.clone(),
        },
        (Some(user), None, Some(private_key)) => Identity::KeyPair {
            user: user.clone(),
            private_key: private_key.clone(),
        },
        (user, _, _) => Identity::ExternalBrowser { user: user.clone() },
    };

    Ok(ResolvedContext {
        descriptor: build_descriptor(account, host, ambient, identity),
        resolution,
    })
}

fn build_descriptor(
    account: String,
    host: String,
    ambient: &AmbientCredentials,
    identity: Identity,
) -> ConnectionDescriptor {
    let params = &ambient.params;
    ConnectionDescriptor {
        account,
        host,
        port: params.port,
        protocol: params.protocol.clone(),
        database: params.database.clone(),
        schema: params.schema.clone(),
        warehouse: params.warehouse.clone(),
        role: params.role.clone(),
        identity,
    }
}
