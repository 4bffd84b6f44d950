//! Shared-secret validation for the WebSocket handshake and REST commands.

use subtle::ConstantTimeEq;

/// Compares a presented token against the configured secret in constant
/// time. Empty tokens never match.
#[must_use]
pub fn validate_token(secret: &str, token: &str) -> bool {
    if token.is_empty() {
        return false;
    }
    secret.as_bytes().ct_eq(token.as_bytes()).into()
}
