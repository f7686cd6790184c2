//! Key-pair authentication: signs the short-lived JWT presented at login.

use crate::credentials::Secret;
use crate::error::{ConsoleError, Result};
use base64::prelude::{Engine as _, BASE64_STANDARD};
use jwt_simple::prelude::{Claims, Duration as JwtDuration, RS256KeyPair, RSAKeyPairLike};
use sha2::{Digest, Sha256};

/// Lifetime of the login JWT.
const JWT_LIFETIME_SECS: u64 = 60;

/// `SHA256:<base64>` fingerprint of the public half of the key.
pub fn public_key_fingerprint(key_pair: &RS256KeyPair) -> Result<String> {
    let der = key_pair
        .public_key()
        .to_der()
        .map_err(|e| ConsoleError::config(format!("Invalid private key: {e}")))?;
    Ok(format!(
        "SHA256:{}",
        BASE64_STANDARD.encode(Sha256::digest(&der))
    ))
}

/// Signs a login JWT for `account`/`user` with the PEM private key.
///
/// The account is upper-cased and stripped of any region suffix.
pub fn key_pair_jwt(account: &str, user: &str, private_key_pem: &Secret) -> Result<Secret> {
    let key_pair = RS256KeyPair::from_pem(private_key_pem.expose())
        .map_err(|e| ConsoleError::config(format!("Invalid private key: {e}")))?;

    let account = account
        .split('.')
        .next()
        .unwrap_or(account)
        .to_uppercase();
    let qualified_user = format!("{account}.{}", user.to_uppercase());
    let fingerprint = public_key_fingerprint(&key_pair)?;

    let claims = Claims::create(JwtDuration::from_secs(JWT_LIFETIME_SECS))
        .with_issuer(format!("{qualified_user}.{fingerprint}"))
        .with_subject(&qualified_user);

    key_pair
        .sign(claims)
        .map(Secret::new)
        .map_err(|e| ConsoleError::internal(format!("Failed to sign login token: {e}")))
}
