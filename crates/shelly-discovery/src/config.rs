//! Discoverer configuration.
//!
//! One explicit value handed to the constructor. Transport searches that
//! are disabled are statically absent (`None` sub-configuration) rather
//! than flag-guarded at each use site.

use std::time::Duration;

use shelly_rpc::auth::AuthCallback;
use shelly_rpc::broker::BrokerConfig;
use shelly_rpc::codec::http::TlsMode;

use crate::approve::SearchConfirm;

/// Time-to-live for discovered devices on long-lived commands.
pub const DEFAULT_DEVICE_TTL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_MDNS_ZONE: &str = "local";
pub const DEFAULT_MDNS_SERVICE: &str = "_shelly._tcp";
pub const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Which IP family to pick from multi-address discovery results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IpPreference {
    #[default]
    Any,
    V4,
    V6,
}

/// mDNS search settings. Present only when mDNS search is enabled.
#[derive(Debug, Clone)]
pub struct MdnsConfig {
    pub service: String,
    /// Restrict the query to one named network interface.
    pub interface: Option<String>,
}

impl Default for MdnsConfig {
    fn default() -> Self {
        Self {
            service: DEFAULT_MDNS_SERVICE.to_string(),
            interface: None,
        }
    }
}

/// BLE search settings. Present only when BLE search is enabled.
#[derive(Debug, Clone, Default)]
pub struct BleConfig {}

/// MQTT settings. Present only when a broker address was configured.
#[derive(Clone)]
pub struct MqttConfig {
    pub broker: BrokerConfig,
    /// Notification topics subscribed at connect time.
    pub topics: Vec<String>,
    /// Whether the announce-based device search runs during `search()`.
    pub search: bool,
}

/// Everything the [`Discoverer`](crate::Discoverer) needs up front.
#[derive(Clone, Default)]
pub struct DiscovererConfig {
    /// Local mgRPC endpoint id, stamped as `src` on outbound frames.
    pub local_id: String,

    /// mDNS zone used both for search and for deciding whether a host
    /// name like `dev1.local` resolves via mDNS instead of DNS.
    pub mdns_zone: String,

    pub search_timeout: Duration,

    /// Drop search results whose probe has not finished inside the
    /// search window.
    pub strict_search_timeout: bool,

    /// Worker pool width for probing approved candidates.
    pub concurrency: usize,

    pub device_ttl: Duration,

    pub prefer_ip: IpPreference,

    /// Per-call deadline applied by RPC helpers.
    pub rpc_timeout: Option<Duration>,

    /// TLS trust for HTTPS devices.
    pub http_tls: TlsMode,

    /// Default credential source for devices without URL-embedded auth.
    pub default_auth: Option<AuthCallback>,

    /// Interactive confirmation for search results. `None` auto-accepts.
    pub confirm: Option<SearchConfirm>,

    pub mdns: Option<MdnsConfig>,
    pub ble: Option<BleConfig>,
    pub mqtt: Option<MqttConfig>,
}

impl DiscovererConfig {
    /// Baseline configuration with every search transport disabled.
    pub fn new(local_id: impl Into<String>) -> Self {
        Self {
            local_id: local_id.into(),
            mdns_zone: DEFAULT_MDNS_ZONE.to_string(),
            search_timeout: DEFAULT_SEARCH_TIMEOUT,
            strict_search_timeout: false,
            concurrency: DEFAULT_CONCURRENCY,
            device_ttl: DEFAULT_DEVICE_TTL,
            prefer_ip: IpPreference::Any,
            rpc_timeout: Some(Duration::from_secs(30)),
            http_tls: TlsMode::default(),
            default_auth: None,
            confirm: None,
            mdns: None,
            ble: None,
            mqtt: None,
        }
    }
}
