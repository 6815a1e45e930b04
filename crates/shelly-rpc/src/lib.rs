//! mgRPC transport layer for Shelly gen2/gen3 devices.
//!
//! This crate owns everything between a JSON frame and the wire:
//!
//! - the [`Frame`] model and process-wide id assignment,
//! - one [`Codec`](codec::Codec) per transport (HTTP POST, WebSocket,
//!   BLE GATT framing, MQTT via a shared broker connection),
//! - the [`Channel`] wrapper that pumps inbound frames, demultiplexes
//!   `Notify*` frames to the [`NotificationBus`], and correlates responses
//!   to in-flight requests by frame id,
//! - the [`executor`] that applies timeouts and the digest-auth retry, and
//! - the [`BrokerClient`](broker::BrokerClient) multiplexing one MQTT
//!   connection across many logical devices.
//!
//! Device discovery and registry live one layer up in `shelly-discovery`.

pub mod auth;
pub mod broker;
pub mod bus;
pub mod channel;
pub mod codec;
pub mod error;
pub mod executor;
pub mod frame;

pub use auth::{AuthCallback, AuthChallenge};
pub use broker::BrokerClient;
pub use bus::{EventNotification, NotificationBus, StatusNotification};
pub use channel::Channel;
pub use error::RpcError;
pub use executor::{call, CallOptions};
pub use frame::{next_frame_id, Frame, FrameAuth, FrameError};
