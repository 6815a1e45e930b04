use thiserror::Error;

use shelly_discovery::DiscoveryError;
use shelly_rpc::RpcError;

/// Top-level CLI failure. Everything exits 1 except a user-requested
/// quit, which exits 0.
#[derive(Debug, Error)]
pub enum CliError {
    /// Flag parsing or validation failed.
    #[error("{0}")]
    Flag(String),

    /// Config file could not be read or parsed.
    #[error("loading config: {0}")]
    Config(String),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// Local IO (reading data files, stdin, serving metrics).
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl CliError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn exit_code(&self) -> i32 {
        1
    }
}
