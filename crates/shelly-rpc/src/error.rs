use thiserror::Error;

/// Transport and protocol failures surfaced by this crate.
///
/// `Clone` so a single transport failure can be fanned out to every call
/// still pending on the channel that died.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// A device address could not be parsed or uses an unsupported form.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The transport could not be opened (DNS, TCP, TLS, BLE discovery,
    /// MQTT connect).
    #[error("device unreachable: {0}")]
    Unreachable(String),

    /// The device demanded authentication and no credentials were available.
    #[error("device requires authentication: {0}")]
    AuthRequired(String),

    /// Credentials were supplied but rejected.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The device answered with an error frame.
    #[error("device error {code}: {message}")]
    Device { code: i32, message: String },

    /// The per-call deadline elapsed before a matching response arrived.
    #[error("RPC timed out")]
    Timeout,

    /// The caller canceled the operation.
    #[error("operation canceled")]
    Canceled,

    /// A frame failed to parse, or the wire carried impossible framing
    /// (e.g. a BLE length prefix larger than the allowed maximum).
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// The channel was closed while a call was outstanding.
    #[error("channel closed")]
    Closed,
}

impl RpcError {
    /// Whether this error is an auth challenge the executor may retry
    /// after consulting the device's credential callback.
    pub fn is_auth_challenge(&self) -> bool {
        matches!(self, Self::Device { code: 401, .. })
    }
}
