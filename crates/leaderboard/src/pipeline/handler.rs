use core::fmt::Display;

/// Consumer of a pipeline's messages.
///
/// A handler is owned by its pipeline's worker thread and is only ever
/// called from it, so it may keep mutable state without synchronization.
pub trait Handler<M>: Send + 'static {
    /// Failure reported for a single message. It is logged and recorded next
    /// to the dead-lettered message.
    type Error: Display;

    /// Applies one message.
    fn handle(&mut self, message: &M) -> Result<(), Self::Error>;

    /// Called after a run of messages has been handled, before the worker
    /// blocks for more work or acknowledges a barrier.
    fn flush(&mut self) {}
}
