//! Per-request fan-out across a device set.
//!
//! For each device: open a channel, run the caller's operation, then
//! disconnect on every path. Up to `concurrency` devices run at once; no
//! cross-device ordering is guaranteed. Per-device failures either fail
//! the whole invocation (the default) or are logged and skipped.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use shelly_rpc::Channel;

use crate::device::Device;
use crate::error::DiscoveryError;

/// One device's result from a fan-out run.
pub struct DeviceOutcome<T> {
    pub device: Arc<Device>,
    pub value: T,
}

/// Run `operation` against every device in `devices`.
///
/// When `skip_failed` is set, per-device errors are logged with device
/// context and the loop continues; otherwise the first error fails the
/// invocation and outstanding operations are aborted.
pub async fn run_on_all<T, F, Fut>(
    devices: &[Arc<Device>],
    concurrency: usize,
    skip_failed: bool,
    operation: F,
) -> Result<Vec<DeviceOutcome<T>>, DiscoveryError>
where
    T: Send + 'static,
    F: Fn(Arc<Device>, Arc<Channel>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<T, DiscoveryError>> + Send,
{
    let workers = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks: JoinSet<Result<DeviceOutcome<T>, (String, DiscoveryError)>> = JoinSet::new();

    for device in devices {
        let permit = Arc::clone(&workers)
            .acquire_owned()
            .await
            .expect("worker semaphore closed");
        let device = Arc::clone(device);
        let operation = operation.clone();
        tasks.spawn(async move {
            let _permit = permit;
            let name = device.best_name();
            let channel = device
                .open()
                .await
                .map_err(|e| (name.clone(), e))?;
            let result = operation(Arc::clone(&device), Arc::clone(&channel)).await;
            // Best-effort release on every path.
            channel.disconnect().await;
            match result {
                Ok(value) => Ok(DeviceOutcome { device, value }),
                Err(e) => Err((name, e)),
            }
        });
    }

    let mut outcomes = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(outcome)) => outcomes.push(outcome),
            Ok(Err((device, error))) => {
                if skip_failed {
                    tracing::warn!(
                        device = %device,
                        error = %error,
                        "device failed; continuing because skip-failed-hosts is set"
                    );
                } else {
                    return Err(error);
                }
            }
            Err(join_error) => {
                if !skip_failed {
                    return Err(DiscoveryError::Prompt(format!(
                        "fan-out worker panicked: {join_error}"
                    )));
                }
                tracing::warn!(error = %join_error, "fan-out worker panicked");
            }
        }
    }
    Ok(outcomes)
}
