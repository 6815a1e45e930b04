//! `Shelly.SetAuth` request construction.
//!
//! The password hash depends on the device's id (which doubles as the auth
//! realm), so callers must fetch `Shelly.GetDeviceInfo` first and feed the
//! reported id in here. Passing `None` as the password clears auth.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

/// Fixed username for Shelly device authentication.
pub const AUTH_USER: &str = "admin";

/// Build the params for a `Shelly.SetAuth` request.
///
/// `realm` is the device id reported by `Shelly.GetDeviceInfo` (e.g.
/// `"shellypro3-aabbccddeeff"`). A `None` password produces the
/// auth-clearing form with `ha1: null`.
pub fn build_set_auth_params(realm: &str, password: Option<&str>) -> Value {
    match password {
        Some(password) => {
            let mut hasher = Sha256::new();
            hasher.update(format!("{AUTH_USER}:{realm}:{password}"));
            let ha1 = hex::encode(hasher.finalize());
            json!({
                "user": AUTH_USER,
                "realm": realm,
                "ha1": ha1,
            })
        }
        None => json!({
            "user": AUTH_USER,
            "realm": realm,
            "ha1": null,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ha1_is_sha256_of_user_realm_password() {
        let params = build_set_auth_params("shellypro3-000000000001", Some("hunter2"));
        assert_eq!(params["user"], "admin");
        assert_eq!(params["realm"], "shellypro3-000000000001");
        // SHA-256("admin:shellypro3-000000000001:hunter2"), independently computed.
        let expected = {
            let mut hasher = Sha256::new();
            hasher.update(b"admin:shellypro3-000000000001:hunter2");
            hex::encode(hasher.finalize())
        };
        assert_eq!(params["ha1"], expected.as_str());
    }

    #[test]
    fn missing_password_clears_auth() {
        let params = build_set_auth_params("shellypro3-000000000001", None);
        assert!(params["ha1"].is_null());
    }
}
