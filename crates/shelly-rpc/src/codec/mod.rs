//! Frame codecs: one mgRPC frame on and off a given transport.
//!
//! Codecs are deliberately dumb pipes. Request/response correlation,
//! deadlines, and auth retries all live above them in [`crate::channel`]
//! and [`crate::executor`].

pub mod ble;
pub mod http;
pub mod mqtt;
pub mod ws;

use async_trait::async_trait;

use crate::error::RpcError;
use crate::frame::Frame;

/// One logical mgRPC channel over some transport.
#[async_trait]
pub trait Codec: Send + Sync {
    /// Encode and enqueue one frame. Does not wait for a response.
    async fn send(&self, frame: Frame) -> Result<(), RpcError>;

    /// Receive the next inbound frame. Blocks until a frame arrives or the
    /// codec is closed; deadlines are the caller's responsibility.
    async fn recv(&self) -> Result<Frame, RpcError>;

    /// Release transport resources. Safe to call more than once.
    async fn close(&self);

    fn is_connected(&self) -> bool;
}
