use tokio::sync::oneshot;

/// Items travelling through a pipeline queue.
pub(crate) enum WorkRequest<M> {
    /// A producer's message.
    Message(M),
    /// Barrier: acknowledged once everything queued before it is handled and
    /// flushed.
    Sync { response: oneshot::Sender<()> },
    /// Stop after handling everything queued before it.
    Shutdown { response: oneshot::Sender<()> },
}
