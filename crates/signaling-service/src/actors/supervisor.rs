//! `CallSupervisor` - owns the set of live call actors.
//!
//! - Spawns a `CallActor` on the first event for a call id. An actor whose
//!   command finds no record exits right after answering, so random ids
//!   cost one short-lived task each
//! - Routes every call command to that actor's mailbox
//! - Re-spawns transparently when an actor has idled out, handing the new
//!   actor the old one's exit signal so the two never run concurrently
//! - Watches each actor's `JoinHandle` to catch panics
//! - Owns the cancellation token every call actor derives from
//!
//! # Generations
//!
//! Each spawn gets a fresh generation number. Watchers and re-spawns only
//! touch the map entry carrying the generation they know about, so a slow
//! watcher never evicts a newer actor.

use super::call::{CallActor, CallActorHandle, CallContext};
use super::messages::{CallCommand, CallMessage, CallOutcome};
use super::metrics::ActorType;
use crate::errors::SignalingError;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument};

/// Attempts to place a message before giving up.
///
/// One retry covers an actor that idled out between lookup and send.
const MAX_DISPATCH_ATTEMPTS: usize = 3;

struct ManagedCall {
    generation: u64,
    handle: CallActorHandle,
    /// Cancelled by the watcher once the actor task has exited.
    finished: CancellationToken,
}

struct Inner {
    ctx: CallContext,
    calls: Mutex<HashMap<String, ManagedCall>>,
    next_generation: AtomicU64,
    cancel_token: CancellationToken,
}

/// Cloneable handle to the call actor system.
#[derive(Clone)]
pub struct CallSupervisor {
    inner: Arc<Inner>,
}

impl CallSupervisor {
    #[must_use]
    pub fn new(ctx: CallContext, cancel_token: CancellationToken) -> Self {
        Self {
            inner: Arc::new(Inner {
                ctx,
                calls: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
                cancel_token,
            }),
        }
    }

    /// Run one command on the call's actor and wait for its outcome.
    ///
    /// # Errors
    ///
    /// - `ShuttingDown` once cancellation has started
    /// - `Store` when the call's store read or write failed
    /// - `Internal` if the actor stopped before answering
    #[instrument(skip_all, fields(call_id = %call_id, command = command.name()))]
    pub async fn dispatch(
        &self,
        call_id: &str,
        command: CallCommand,
    ) -> Result<CallOutcome, SignalingError> {
        if self.inner.cancel_token.is_cancelled() {
            return Err(SignalingError::ShuttingDown);
        }

        let (tx, rx) = oneshot::channel();
        let mut message = CallMessage {
            command,
            respond_to: tx,
        };

        let mut stale: Option<u64> = None;
        let mut placed = false;
        for _ in 0..MAX_DISPATCH_ATTEMPTS {
            let (generation, handle) = self.actor_for(call_id, stale).await;
            match handle.send(message).await {
                Ok(()) => {
                    placed = true;
                    break;
                }
                Err(returned) => {
                    debug!(
                        target: "sig.actor.supervisor",
                        call_id = %call_id,
                        generation,
                        "Call actor stopped accepting work, re-spawning"
                    );
                    message = returned;
                    stale = Some(generation);
                }
            }
        }

        if !placed {
            return Err(if self.inner.cancel_token.is_cancelled() {
                SignalingError::ShuttingDown
            } else {
                SignalingError::Internal("call actor unavailable".to_string())
            });
        }

        rx.await.map_err(|_| {
            if self.inner.cancel_token.is_cancelled() {
                SignalingError::ShuttingDown
            } else {
                SignalingError::Internal("call actor exited before responding".to_string())
            }
        })?
    }

    /// Current actor for `call_id`, spawning one if none exists or if the
    /// current one is the `stale` generation.
    async fn actor_for(&self, call_id: &str, stale: Option<u64>) -> (u64, CallActorHandle) {
        let mut calls = self.inner.calls.lock().await;

        let predecessor = match calls.get(call_id) {
            Some(managed) if Some(managed.generation) != stale => {
                return (managed.generation, managed.handle.clone());
            }
            Some(managed) => Some(managed.finished.clone()),
            None => None,
        };

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let (handle, task) = CallActor::spawn(
            call_id.to_string(),
            self.inner.ctx.clone(),
            self.inner.cancel_token.child_token(),
            predecessor,
        );
        let finished = CancellationToken::new();

        calls.insert(
            call_id.to_string(),
            ManagedCall {
                generation,
                handle: handle.clone(),
                finished: finished.clone(),
            },
        );
        drop(calls);

        self.inner.ctx.metrics.call_started();
        debug!(
            target: "sig.actor.supervisor",
            call_id = %call_id,
            generation,
            "Spawned call actor"
        );

        let inner = Arc::clone(&self.inner);
        let call_id = call_id.to_string();
        tokio::spawn(async move {
            match task.await {
                Ok(()) => {}
                Err(join_error) if join_error.is_panic() => {
                    error!(
                        target: "sig.actor.supervisor",
                        call_id = %call_id,
                        generation,
                        error = ?join_error,
                        "Call actor panicked"
                    );
                    inner.ctx.metrics.record_panic(ActorType::Call);
                }
                Err(_) => {}
            }

            finished.cancel();
            inner.ctx.metrics.call_stopped();

            let mut calls = inner.calls.lock().await;
            if calls
                .get(&call_id)
                .is_some_and(|managed| managed.generation == generation)
            {
                calls.remove(&call_id);
            }
        });

        (generation, handle)
    }

    /// Number of call actors currently registered.
    pub async fn active_calls(&self) -> usize {
        self.inner.calls.lock().await.len()
    }

    /// Stop all call actors.
    pub fn shutdown(&self) {
        self.inner.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.inner.cancel_token.is_cancelled()
    }
}
