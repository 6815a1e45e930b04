//! Shelly digest authentication.
//!
//! Devices with auth enabled reject requests with an error frame carrying
//! code 401 and a JSON challenge in the message. The retry attaches a
//! SHA-256 digest response computed from the fixed username `admin`, the
//! realm (the device id), and the challenge nonce.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use rand::Rng;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::RpcError;
use crate::frame::FrameAuth;

/// Fixed username for device authentication.
pub const AUTH_USER: &str = "admin";

/// Per-device credential source. Given a human description of the device,
/// yields its password. Implementations may prompt interactively; callers
/// memoize the result so each device asks at most once.
pub type AuthCallback = Arc<
    dyn Fn(String) -> Pin<Box<dyn Future<Output = Result<String, RpcError>> + Send>> + Send + Sync,
>;

/// Wrap a constant password as an [`AuthCallback`].
pub fn constant_password(password: String) -> AuthCallback {
    Arc::new(move |_| {
        let password = password.clone();
        Box::pin(async move { Ok(password) })
    })
}

/// Challenge parsed from a 401 error frame.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthChallenge {
    pub realm: String,
    pub nonce: i64,

    #[serde(default = "default_nc")]
    pub nc: i64,

    #[serde(default = "default_algorithm")]
    pub algorithm: String,

    #[serde(default)]
    pub auth_type: Option<String>,
}

fn default_nc() -> i64 {
    1
}

fn default_algorithm() -> String {
    "SHA-256".to_string()
}

impl AuthChallenge {
    /// Parse the JSON challenge out of a 401 error frame's message.
    pub fn parse(message: &str) -> Result<Self, RpcError> {
        let challenge: Self = serde_json::from_str(message).map_err(|e| {
            RpcError::Malformed(format!("401 frame message is not a digest challenge: {e}"))
        })?;
        if challenge.algorithm != "SHA-256" {
            return Err(RpcError::AuthFailed(format!(
                "unsupported digest algorithm {:?}",
                challenge.algorithm
            )));
        }
        Ok(challenge)
    }

    /// Compute the digest response for this challenge.
    pub fn respond(&self, password: &str) -> FrameAuth {
        let cnonce: i64 = rand::thread_rng().gen_range(0..i64::MAX);
        self.respond_with_cnonce(password, cnonce)
    }

    fn respond_with_cnonce(&self, password: &str, cnonce: i64) -> FrameAuth {
        let ha1 = sha256_hex(&format!("{AUTH_USER}:{}:{password}", self.realm));
        let ha2 = sha256_hex("dummy_method:dummy_uri");
        let response = sha256_hex(&format!(
            "{ha1}:{}:{}:{cnonce}:auth:{ha2}",
            self.nonce, self.nc
        ));
        FrameAuth {
            realm: self.realm.clone(),
            username: AUTH_USER.to_string(),
            nonce: self.nonce,
            cnonce,
            response,
            algorithm: "SHA-256".to_string(),
        }
    }
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHALLENGE: &str = r#"{"auth_type":"digest","nonce":1619545138,"nc":1,"realm":"shellypro3-000000000001","algorithm":"SHA-256"}"#;

    #[test]
    fn parses_device_challenge() {
        let challenge = AuthChallenge::parse(CHALLENGE).unwrap();
        assert_eq!(challenge.realm, "shellypro3-000000000001");
        assert_eq!(challenge.nonce, 1619545138);
        assert_eq!(challenge.nc, 1);
    }

    #[test]
    fn rejects_non_sha256() {
        let err = AuthChallenge::parse(
            r#"{"nonce":1,"realm":"x","algorithm":"MD5"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, RpcError::AuthFailed(_)));
    }

    #[test]
    fn digest_response_matches_reference_computation() {
        let challenge = AuthChallenge::parse(CHALLENGE).unwrap();
        let auth = challenge.respond_with_cnonce("secret", 42);

        let ha1 = sha256_hex("admin:shellypro3-000000000001:secret");
        let ha2 = sha256_hex("dummy_method:dummy_uri");
        let expected = sha256_hex(&format!("{ha1}:1619545138:1:42:auth:{ha2}"));

        assert_eq!(auth.response, expected);
        assert_eq!(auth.username, "admin");
        assert_eq!(auth.algorithm, "SHA-256");
    }
}
