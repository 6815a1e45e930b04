//! The approval pipeline between noisy search streams and the registry.
//!
//! Every search driver in one `search()` invocation feeds its own
//! [`Approver`] but they all share one [`ConfirmGate`] (so prompts
//! serialize on stdio) and one stop token (so a "use this and stop"
//! answer in any driver drains them all).

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::DiscoveryError;

const SUBMIT_BUFFER: usize = 100;

/// Outcome of one confirmation prompt.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmDecision {
    pub approve: bool,
    pub continue_search: bool,
}

/// Asks the user about one candidate, described as a human string.
pub type SearchConfirm = Arc<
    dyn Fn(String) -> Pin<Box<dyn Future<Output = Result<ConfirmDecision, DiscoveryError>> + Send>>
        + Send
        + Sync,
>;

// ── Confirmation gate ────────────────────────────────────────────────

struct PromptRequest {
    description: String,
    reply: oneshot::Sender<Result<ConfirmDecision, DiscoveryError>>,
}

/// Serializes confirmation prompts: one task owns the callback (and
/// therefore stdio); concurrent approvers queue requests and await their
/// reply.
#[derive(Clone)]
pub struct ConfirmGate {
    tx: mpsc::Sender<PromptRequest>,
}

impl ConfirmGate {
    pub fn new(confirm: SearchConfirm) -> Self {
        let (tx, mut rx) = mpsc::channel::<PromptRequest>(16);
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                let result = confirm(request.description).await;
                let _ = request.reply.send(result);
            }
        });
        Self { tx }
    }

    async fn confirm(&self, description: String) -> Result<ConfirmDecision, DiscoveryError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PromptRequest {
                description,
                reply: reply_tx,
            })
            .await
            .map_err(|_| DiscoveryError::Prompt("confirmation gate is gone".into()))?;
        reply_rx
            .await
            .map_err(|_| DiscoveryError::Prompt("confirmation gate dropped the request".into()))?
    }
}

// ── Approver ─────────────────────────────────────────────────────────

struct Provisional<T> {
    candidate: T,
    description: String,
}

/// Bounded in-flight candidate queue with submit → confirm → approved
/// flow, generic over each driver's candidate type.
pub struct Approver<T> {
    submit_tx: StdMutex<Option<mpsc::Sender<Provisional<T>>>>,
    submit_rx: Mutex<Option<mpsc::Receiver<Provisional<T>>>>,
    approved_tx: StdMutex<Option<mpsc::Sender<T>>>,
    approved_rx: Mutex<mpsc::Receiver<T>>,
    gate: Option<ConfirmGate>,
    stop: CancellationToken,
}

impl<T: Send + 'static> Approver<T> {
    /// `stop` is shared with sibling drivers; cancelling it anywhere
    /// drains every approver in the search.
    pub fn new(gate: Option<ConfirmGate>, stop: CancellationToken) -> Self {
        let (submit_tx, submit_rx) = mpsc::channel(SUBMIT_BUFFER);
        let (approved_tx, approved_rx) = mpsc::channel(SUBMIT_BUFFER);
        Self {
            submit_tx: StdMutex::new(Some(submit_tx)),
            submit_rx: Mutex::new(Some(submit_rx)),
            approved_tx: StdMutex::new(Some(approved_tx)),
            approved_rx: Mutex::new(approved_rx),
            gate,
            stop,
        }
    }

    /// Enqueue a candidate. Returns `false` once the approver is
    /// stopping or done.
    pub async fn submit(&self, candidate: T, description: impl Into<String>) -> bool {
        let Some(tx) = self.submit_tx.lock().expect("submit_tx poisoned").clone() else {
            return false;
        };
        let provisional = Provisional {
            candidate,
            description: description.into(),
        };
        tokio::select! {
            sent = tx.send(provisional) => sent.is_ok(),
            _ = self.stop.cancelled() => false,
        }
    }

    /// Confirmation loop. Run exactly once, concurrently with producers
    /// and the approved-candidate consumer. Prompt IO errors abort the
    /// enclosing search.
    pub async fn run(&self) -> Result<(), DiscoveryError> {
        let mut rx = self
            .submit_rx
            .lock()
            .await
            .take()
            .expect("Approver::run called twice");
        // Dropping the sender closes the approved stream for get_approved.
        let approved_tx = self
            .approved_tx
            .lock()
            .expect("approved_tx poisoned")
            .take()
            .expect("Approver::run called twice");

        loop {
            let provisional = tokio::select! {
                biased;
                _ = self.stop.cancelled() => {
                    rx.close();
                    while rx.recv().await.is_some() {} // discard queued
                    return Ok(());
                }
                received = rx.recv() => match received {
                    Some(p) => p,
                    None => return Ok(()),
                },
            };

            let decision = match &self.gate {
                Some(gate) => {
                    // The prompt may have waited behind a sibling's; the
                    // stop state could have changed meanwhile.
                    if self.stop.is_cancelled() {
                        continue;
                    }
                    gate.confirm(provisional.description).await?
                }
                None => ConfirmDecision {
                    approve: true,
                    continue_search: true,
                },
            };

            if !decision.continue_search {
                self.stop.cancel();
            }
            // An approved candidate is delivered even when the same
            // answer stopped the search ("use this device and stop").
            if decision.approve && approved_tx.send(provisional.candidate).await.is_err() {
                return Ok(());
            }
        }
    }

    /// Next approved candidate, or `None` once the approver is done.
    pub async fn get_approved(&self) -> Option<T> {
        let mut rx = self.approved_rx.lock().await;
        rx.recv().await
    }

    /// Close the submission side. Idempotent; `run` exits after draining.
    pub fn done(&self) {
        self.submit_tx.lock().expect("submit_tx poisoned").take();
    }

    /// Stop token shared with the sibling drivers.
    pub fn stop_token(&self) -> &CancellationToken {
        &self.stop
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn auto_gate(decision: ConfirmDecision) -> ConfirmGate {
        let confirm: SearchConfirm = Arc::new(move |_| Box::pin(async move { Ok(decision) }));
        ConfirmGate::new(confirm)
    }

    #[tokio::test]
    async fn candidates_flow_submit_to_approved_without_a_gate() {
        let approver = Arc::new(Approver::<u32>::new(None, CancellationToken::new()));

        let runner = {
            let approver = Arc::clone(&approver);
            tokio::spawn(async move { approver.run().await })
        };

        assert!(approver.submit(1, "first").await);
        assert!(approver.submit(2, "second").await);
        approver.done();

        assert_eq!(approver.get_approved().await, Some(1));
        assert_eq!(approver.get_approved().await, Some(2));
        assert_eq!(approver.get_approved().await, None);
        runner.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn rejected_candidates_never_reach_approved() {
        let gate = auto_gate(ConfirmDecision {
            approve: false,
            continue_search: true,
        });
        let approver = Arc::new(Approver::<u32>::new(Some(gate), CancellationToken::new()));
        let runner = {
            let approver = Arc::clone(&approver);
            tokio::spawn(async move { approver.run().await })
        };

        assert!(approver.submit(7, "rejected").await);
        approver.done();
        assert_eq!(approver.get_approved().await, None);
        runner.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn stop_answer_cancels_the_shared_token() {
        let gate = auto_gate(ConfirmDecision {
            approve: true,
            continue_search: false,
        });
        let stop = CancellationToken::new();
        let approver = Arc::new(Approver::<u32>::new(Some(gate), stop.clone()));
        let runner = {
            let approver = Arc::clone(&approver);
            tokio::spawn(async move { approver.run().await })
        };

        assert!(approver.submit(3, "use and stop").await);
        // The approved candidate is still delivered.
        assert_eq!(approver.get_approved().await, Some(3));
        stop.cancelled().await;
        runner.await.unwrap().unwrap();

        // Further submissions bounce once the confirmation loop is gone.
        assert!(!approver.submit(4, "late").await);
        approver.done();
    }

    #[tokio::test]
    async fn done_is_idempotent() {
        let approver = Approver::<u32>::new(None, CancellationToken::new());
        approver.done();
        approver.done();
        assert!(!approver.submit(1, "after done").await);
    }

    #[tokio::test]
    async fn gate_serializes_concurrent_confirmations() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let gate = {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            let confirm: SearchConfirm = Arc::new(move |_| {
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                Box::pin(async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(ConfirmDecision {
                        approve: true,
                        continue_search: true,
                    })
                })
            });
            ConfirmGate::new(confirm)
        };

        let stop = CancellationToken::new();
        let a = Arc::new(Approver::<u32>::new(Some(gate.clone()), stop.clone()));
        let b = Arc::new(Approver::<u32>::new(Some(gate), stop));
        let runner_a = {
            let a = Arc::clone(&a);
            tokio::spawn(async move { a.run().await })
        };
        let runner_b = {
            let b = Arc::clone(&b);
            tokio::spawn(async move { b.run().await })
        };

        for i in 0..5 {
            assert!(a.submit(i, format!("a{i}")).await);
            assert!(b.submit(i, format!("b{i}")).await);
        }
        a.done();
        b.done();
        for _ in 0..5 {
            assert!(a.get_approved().await.is_some());
            assert!(b.get_approved().await.is_some());
        }
        runner_a.await.unwrap().unwrap();
        runner_b.await.unwrap().unwrap();

        assert_eq!(peak.load(Ordering::SeqCst), 1, "prompts must serialize");
    }
}
