//! Request integrity signature.

use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::ClientError;

type HmacSha256 = Hmac<Sha256>;

/// Signs the exact request body bytes with the store token.
///
/// Returns `base64(HMAC-SHA256(body, token))`, the value of the
/// `X-Signature` header.
///
/// # Errors
///
/// Returns [`ClientError::InvalidSigningKey`] if the MAC rejects the token.
pub fn sign(body: &[u8], token: &str) -> Result<String, ClientError> {
    let mut mac =
        HmacSha256::new_from_slice(token.as_bytes()).map_err(|_| ClientError::InvalidSigningKey)?;
    mac.update(body);
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}
