//! OAuth helpers shared by the adapters: CSRF state and PKCE (RFC 7636)

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use reqwest::Url;
use sha2::{Digest, Sha256};

use crate::error::{PlatformError, Result};

fn random_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// Random CSRF state for the authorization redirect
pub fn generate_state() -> String {
    random_token(32)
}

/// PKCE code verifier: 32 random bytes, base64url without padding
pub fn generate_code_verifier() -> String {
    random_token(32)
}

/// S256 challenge for `verifier`
pub fn code_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Append `params` to `base` as a query string
pub fn build_url(base: &str, params: &[(&str, &str)]) -> Result<String> {
    let url = Url::parse_with_params(base, params)
        .map_err(|e| PlatformError::Validation(format!("invalid URL '{}': {}", base, e)))?;
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verifier_shape() {
        let verifier = generate_code_verifier();
        // 32 bytes -> 43 base64url characters
        assert_eq!(verifier.len(), 43);
        assert!(verifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_ne!(verifier, generate_code_verifier());
    }

    #[test]
    fn test_code_challenge_rfc7636_vector() {
        // Appendix B of RFC 7636
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            code_challenge(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_state_is_unique() {
        assert_ne!(generate_state(), generate_state());
    }

    #[test]
    fn test_build_url_encodes_params() {
        let url = build_url(
            "https://example.com/authorize",
            &[("scope", "a b"), ("redirect_uri", "https://cb/x?y=1")],
        )
        .unwrap();
        assert!(url.starts_with("https://example.com/authorize?"));
        assert!(url.contains("scope=a+b"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fcb%2Fx%3Fy%3D1"));
    }

    #[test]
    fn test_build_url_rejects_garbage() {
        assert!(build_url("not a url", &[]).is_err());
    }
}
