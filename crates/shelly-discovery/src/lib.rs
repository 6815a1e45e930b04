//! Device discovery for Shelly gen2/gen3 fleets.
//!
//! The [`Discoverer`] owns the registry of known devices and fans
//! searches out across three drivers (mDNS, BLE advertising, MQTT
//! announce), each feeding candidates through a shared [`Approver`]
//! pipeline that may gate them behind an interactive confirmation before
//! they are installed. Opened devices hand back `shelly_rpc` channels;
//! everything wire-level lives in that crate.

pub mod approve;
pub mod config;
pub mod device;
pub mod discoverer;
pub mod error;
pub mod fanout;

mod ble;
mod mdns;
mod mqtt;

pub use approve::{Approver, ConfirmDecision, ConfirmGate, SearchConfirm};
pub use config::{
    BleConfig, DiscovererConfig, IpPreference, MdnsConfig, MqttConfig, DEFAULT_CONCURRENCY,
    DEFAULT_DEVICE_TTL, DEFAULT_MDNS_SERVICE, DEFAULT_MDNS_ZONE, DEFAULT_SEARCH_TIMEOUT,
};
pub use device::{Device, DeviceSource};
pub use discoverer::Discoverer;
pub use error::DiscoveryError;
pub use fanout::{run_on_all, DeviceOutcome};
pub use mqtt::parse_broker_addr;
