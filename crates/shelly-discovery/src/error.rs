use thiserror::Error;

use shelly_catalog::CatalogError;
use shelly_rpc::RpcError;

/// Failures raised by the discoverer and its search drivers.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// A user-supplied device address could not be parsed or uses an
    /// unsupported scheme, path, or query.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Wire-level failure talking to a device.
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// A device response did not resolve against the RPC catalog.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The user stopped the search (`s`/`q`) or the process was
    /// interrupted.
    #[error("search aborted")]
    SearchAborted,

    /// Reading the confirmation prompt or password from the terminal
    /// failed. Aborts the enclosing search.
    #[error("interactive prompt failed: {0}")]
    Prompt(String),

    /// The mDNS daemon failed to start or query.
    #[error("mDNS: {0}")]
    Mdns(String),

    /// An operation needing the broker ran before `connect_mqtt`.
    #[error("MQTT broker is not connected")]
    BrokerNotConnected,
}
