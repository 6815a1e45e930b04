//! RPC catalog for Shelly gen2/gen3 devices.
//!
//! The transport and discovery layers treat this crate as an opaque
//! collaborator: every device component (switch, cover, light, …) exposes a
//! set of [`RequestDescriptor`]s naming the RPC method, the flat field
//! schema the CLI turns into flags, and a decode hook that round-trips the
//! raw result through the typed response for validation and normalized
//! output.
//!
//! Nothing here talks to the network. Building request params from CLI
//! input and dispatching them is the caller's job.

pub mod auth;
pub mod components;
pub mod notify;
pub mod schema;
pub mod specs;

pub use auth::build_set_auth_params;
pub use notify::{ComponentEvent, NotifyEvent, NotifyStatus};
pub use schema::{set_path, FieldKind, FieldSpec};
pub use specs::DeviceSpecs;

use thiserror::Error;

/// Failures raised while resolving catalog metadata or decoding responses.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// `Shelly.GetDeviceInfo` returned an app identifier the catalog does
    /// not know how to map onto a capability vector.
    #[error("unknown device app {app:?} (profile {profile:?})")]
    UnknownApp {
        app: String,
        profile: Option<String>,
    },

    /// The device result did not match the typed response shape.
    #[error("decoding {method} response: {source}")]
    Decode {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Decode hook attached to each request descriptor.
///
/// Takes the raw `result` member of the response frame and returns the
/// normalized JSON produced by round-tripping it through the typed response
/// struct.
pub type DecodeFn = fn(serde_json::Value) -> Result<serde_json::Value, CatalogError>;

/// One RPC operation a device component supports.
pub struct RequestDescriptor {
    /// Full method name, e.g. `"Switch.Set"`.
    pub method: &'static str,
    /// One-line help shown for the generated subcommand.
    pub about: &'static str,
    /// Flat field schema; one row per settable request field.
    pub fields: &'static [FieldSpec],
    /// Typed round-trip for the response payload.
    pub decode: DecodeFn,
}

/// A device component and the RPCs it exposes.
pub struct ComponentCatalog {
    /// Component name as used in the CLI command tree, e.g. `"switch"`.
    pub name: &'static str,
    pub about: &'static str,
    pub requests: &'static [RequestDescriptor],
}

/// Every component the CLI surfaces, in display order.
pub fn all_components() -> &'static [&'static ComponentCatalog] {
    components::ALL
}

/// Look up a single request descriptor by full method name.
pub fn descriptor_for(method: &str) -> Option<&'static RequestDescriptor> {
    components::ALL
        .iter()
        .flat_map(|c| c.requests.iter())
        .find(|r| r.method.eq_ignore_ascii_case(method))
}
