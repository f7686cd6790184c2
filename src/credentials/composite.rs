//! The caller's-rights credential: service token joined with the
//! ingress user's impersonation token.

use super::Secret;
use crate::error::{ConsoleError, Result};
use std::fmt;

/// Separator between the base token and the impersonation token.
pub const COMPOSITE_SEPARATOR: char = '.';

/// A base session token combined with an impersonation token.
#[derive(Clone, PartialEq, Eq)]
pub struct CompositeCredential {
    base: Secret,
    impersonation: Secret,
}

impl CompositeCredential {
    /// Both parts must be non-empty.
    pub fn new(base: Secret, impersonation: Secret) -> Result<Self> {
        if base.expose().trim().is_empty() {
            return Err(ConsoleError::internal(
                "composite credential requires a base session token",
            ));
        }
        if impersonation.expose().trim().is_empty() {
            return Err(ConsoleError::internal(
                "composite credential requires an impersonation token",
            ));
        }
        Ok(Self {
            base,
            impersonation,
        })
    }

    /// Renders `<base>.<impersonation>` for the wire.
    pub fn render(&self) -> Secret {
        Secret::new(format!(
            "{}{}{}",
            self.base.expose(),
            COMPOSITE_SEPARATOR,
            self.impersonation.expose()
        ))
    }
}

impl fmt::Debug for CompositeCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CompositeCredential(<redacted>)")
    }
}
