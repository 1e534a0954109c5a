use super::{
    health::{DeadLetter, DeadLetters, HealthReport, PipelineHealth},
    request::WorkRequest,
};
use crate::error::{Error, Result};
use core::time::Duration;
use std::sync::Arc;
use tokio::{
    sync::{mpsc, oneshot},
    time::timeout,
};
use tokio_util::sync::CancellationToken;

/// Producer handle for a single pipeline.
///
/// Handles are cheap to clone and may be shared across threads. All clones
/// feed the same queue and the same worker.
pub struct Pipeline<M> {
    name: Arc<str>,
    tx: mpsc::UnboundedSender<WorkRequest<M>>,
    health: Arc<PipelineHealth>,
    dead_letters: Arc<DeadLetters<M>>,
    shutdown_token: CancellationToken,
}

impl<M> Clone for Pipeline<M> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            tx: self.tx.clone(),
            health: Arc::clone(&self.health),
            dead_letters: Arc::clone(&self.dead_letters),
            shutdown_token: self.shutdown_token.clone(),
        }
    }
}

impl<M> core::fmt::Debug for Pipeline<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("alive", &self.health.is_alive())
            .finish_non_exhaustive()
    }
}

impl<M: Send + 'static> Pipeline<M> {
    pub(crate) fn new(
        name: Arc<str>,
        tx: mpsc::UnboundedSender<WorkRequest<M>>,
        health: Arc<PipelineHealth>,
        dead_letters: Arc<DeadLetters<M>>,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            name,
            tx,
            health,
            dead_letters,
            shutdown_token,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` once the owning manager started shutting down.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Enqueues `message` for the worker. Never blocks.
    ///
    /// A successful publish is always handled, even when shutdown starts
    /// right after it: the worker drains its queue before stopping.
    ///
    /// # Errors
    ///
    /// - [`Error::ServiceShutdown`] if the manager is shutting down.
    /// - [`Error::ChannelError`] if the worker has stopped.
    pub fn publish(&self, message: M) -> Result<()> {
        if self.is_shutting_down() {
            return Err(Error::ServiceShutdown);
        }

        self.health.record_enqueued();
        if self.tx.send(WorkRequest::Message(message)).is_err() {
            self.health.record_rejected();
            // Lost the race against a shutdown that closed the queue.
            if self.is_shutting_down() {
                return Err(Error::ServiceShutdown);
            }
            return Err(Error::ChannelError {
                context: format!("Pipeline `{}` worker stopped", self.name),
            });
        }
        Ok(())
    }

    /// Waits until every message published before this call has been handled
    /// and the handler flushed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelError`] if the worker stopped before reaching
    /// the barrier.
    pub async fn sync(&self) -> Result<()> {
        let (response, ack) = oneshot::channel();
        self.tx
            .send(WorkRequest::Sync { response })
            .map_err(|_| Error::ChannelError {
                context: format!("Pipeline `{}` worker stopped", self.name),
            })?;
        ack.await.map_err(|_| Error::ChannelError {
            context: format!("Pipeline `{}` dropped a sync barrier", self.name),
        })
    }

    pub fn health(&self) -> HealthReport {
        self.health.report(&self.name, self.dead_letters.total())
    }

    /// Removes and returns the retained dead letters, oldest first.
    pub fn drain_dead_letters(&self) -> Vec<DeadLetter<M>> {
        self.dead_letters.drain()
    }

    /// Asks the worker to stop once it has handled everything queued so far,
    /// waiting at most `wait` for the acknowledgement.
    pub(crate) async fn stop(&self, wait: Duration) -> Result<()> {
        let (response, ack) = oneshot::channel();
        if self.tx.send(WorkRequest::Shutdown { response }).is_err() {
            tracing::debug!(pipeline = %self.name, "Worker already stopped");
            return Ok(());
        }

        match timeout(wait, ack).await {
            Ok(Ok(())) => {
                tracing::trace!(pipeline = %self.name, "Worker shutdown acknowledged");
                Ok(())
            }
            Ok(Err(_)) => Err(Error::ChannelError {
                context: format!("Pipeline `{}` dropped its shutdown acknowledgement", self.name),
            }),
            Err(_) => {
                tracing::warn!(
                    pipeline = %self.name,
                    pending = self.health.pending(),
                    "Worker shutdown timed out"
                );
                Err(Error::ChannelError {
                    context: format!("Pipeline `{}` shutdown timed out", self.name),
                })
            }
        }
    }
}
