//! Execution modes and the request-time mode decision.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity a statement runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// The identity that owns the service.
    #[serde(rename = "owner's_rights")]
    Owner,
    /// The end user who issued the request.
    #[serde(rename = "caller's_rights")]
    Caller,
}

impl ExecutionMode {
    /// Maps the `useCallersRights` flag onto a mode.
    pub fn from_caller_flag(use_callers_rights: bool) -> Self {
        if use_callers_rights {
            Self::Caller
        } else {
            Self::Owner
        }
    }

    /// Wire label reported to clients.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner's_rights",
            Self::Caller => "caller's_rights",
        }
    }

    /// Query tag attached to the session before the main statement.
    pub fn session_tag(&self) -> &'static str {
        match self {
            Self::Owner => "OWNERS_RIGHTS_EXECUTION",
            Self::Caller => "CALLERS_RIGHTS_EXECUTION",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a caller's-rights request ran with owner's rights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DowngradeReason {
    /// The ingress impersonation header was absent or empty.
    MissingIngressToken,
    /// No platform session token to combine the impersonation token with.
    NoSessionToken,
    /// A session token exists but the warehouse account or host is unset.
    TokenEndpointUnconfigured,
}

impl DowngradeReason {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::MissingIngressToken => "no ingress user token was forwarded",
            Self::NoSessionToken => "no platform session token is available",
            Self::TokenEndpointUnconfigured => {
                "the warehouse account or host is not configured for token login"
            }
        }
    }
}

/// Outcome of the mode decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "resolution", rename_all = "snake_case")]
pub enum ModeResolution {
    /// Owner's rights were requested.
    OwnerExplicit,
    /// Caller's rights were requested and can be honored.
    CallerGranted,
    /// Caller's rights were requested but the statement runs as owner.
    CallerDowngraded { reason: DowngradeReason },
}

impl ModeResolution {
    /// Decides the mode from the request and ingress token presence.
    ///
    /// Caller's rights are granted iff they were requested and an
    /// impersonation token is available.
    pub fn resolve(requested: ExecutionMode, impersonation_available: bool) -> Self {
        match (requested, impersonation_available) {
            (ExecutionMode::Owner, _) => Self::OwnerExplicit,
            (ExecutionMode::Caller, true) => Self::CallerGranted,
            (ExecutionMode::Caller, false) => Self::CallerDowngraded {
                reason: DowngradeReason::MissingIngressToken,
            },
        }
    }

    /// The mode the statement actually runs under.
    pub fn actual_mode(&self) -> ExecutionMode {
        match self {
            Self::CallerGranted => ExecutionMode::Caller,
            Self::OwnerExplicit | Self::CallerDowngraded { .. } => ExecutionMode::Owner,
        }
    }

    /// The mode the client asked for.
    pub fn requested_mode(&self) -> ExecutionMode {
        match self {
            Self::OwnerExplicit => ExecutionMode::Owner,
            Self::CallerGranted | Self::CallerDowngraded { .. } => ExecutionMode::Caller,
        }
    }

    pub fn is_downgraded(&self) -> bool {
        matches!(self, Self::CallerDowngraded { .. })
    }

    /// Short label for logs and response metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OwnerExplicit => "owner_explicit",
            Self::CallerGranted => "caller_granted",
            Self::CallerDowngraded { .. } => "caller_downgraded",
        }
    }
}
