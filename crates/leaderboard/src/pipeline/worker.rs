use super::{
    handler::Handler,
    health::{DeadLetter, DeadLetters, PipelineHealth},
    request::WorkRequest,
};
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread,
};
use tokio::sync::{
    mpsc::{self, error::TryRecvError},
    oneshot,
};

/// State handed to a worker thread.
pub(crate) struct Worker<M, H> {
    pub(crate) name: Arc<str>,
    pub(crate) rx: mpsc::UnboundedReceiver<WorkRequest<M>>,
    pub(crate) handler: H,
    pub(crate) health: Arc<PipelineHealth>,
    pub(crate) dead_letters: Arc<DeadLetters<M>>,
    pub(crate) max_batch: usize,
}

impl<M, H> Worker<M, H>
where
    M: Send + 'static,
    H: Handler<M>,
{
    /// Starts the worker on its own named OS thread.
    ///
    /// Rebuild work is CPU-bound, so it stays off the async runtime's worker
    /// threads.
    pub(crate) fn spawn(self) -> std::io::Result<thread::JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("pipeline-{}", self.name))
            .spawn(move || self.run())
    }

    /// Main execution loop.
    ///
    /// Requests are taken strictly in arrival order. Queued messages are
    /// handled back to back; the handler is flushed when the queue runs
    /// empty, when `max_batch` messages have been handled since the last
    /// flush, and before any barrier or shutdown is acknowledged.
    ///
    /// The loop ends on a shutdown request or once every publisher is gone.
    fn run(mut self) {
        tracing::debug!(pipeline = %self.name, "Worker started");

        let mut batch = 0_usize;

        loop {
            let request = match self.rx.try_recv() {
                Ok(request) => request,
                Err(TryRecvError::Empty) => {
                    self.flush(&mut batch);
                    match self.rx.blocking_recv() {
                        Some(request) => request,
                        None => break,
                    }
                }
                Err(TryRecvError::Disconnected) => break,
            };

            match request {
                WorkRequest::Message(message) => self.process(message, &mut batch),
                WorkRequest::Sync { response } => {
                    self.flush(&mut batch);
                    // The caller may have stopped waiting.
                    let _ = response.send(());
                }
                WorkRequest::Shutdown { response } => {
                    tracing::debug!(pipeline = %self.name, "Worker received shutdown signal");
                    let mut acks = self.drain_closed(&mut batch);
                    acks.push(response);
                    self.flush(&mut batch);
                    self.health.mark_stopped();
                    for response in acks {
                        if response.send(()).is_err() {
                            tracing::error!(pipeline = %self.name, "Worker failed to acknowledge shutdown");
                        }
                    }
                    tracing::debug!(pipeline = %self.name, "Worker stopped");
                    return;
                }
            }
        }

        self.flush(&mut batch);
        self.health.mark_stopped();
        tracing::debug!(pipeline = %self.name, "Worker stopped, all publishers dropped");
    }

    fn process(&mut self, message: M, batch: &mut usize) {
        self.health.record_dequeued();
        self.handle(message);
        *batch += 1;
        if *batch >= self.max_batch {
            self.flush(batch);
        }
    }

    /// Closes the queue and handles every request that was sent before the
    /// close, returning the acknowledgements of any further shutdown
    /// requests.
    ///
    /// A publisher may pass its shutdown check just before the manager
    /// cancels, so messages can sit behind the shutdown request. After
    /// `close` no send succeeds, and `blocking_recv` returns `None` only once
    /// every message counted by the channel has been taken.
    fn drain_closed(&mut self, batch: &mut usize) -> Vec<oneshot::Sender<()>> {
        self.rx.close();

        let mut acks = Vec::new();
        while let Some(request) = self.rx.blocking_recv() {
            match request {
                WorkRequest::Message(message) => self.process(message, batch),
                WorkRequest::Sync { response } => {
                    self.flush(batch);
                    let _ = response.send(());
                }
                WorkRequest::Shutdown { response } => acks.push(response),
            }
        }

        if !acks.is_empty() {
            tracing::trace!(pipeline = %self.name, extra = acks.len(), "Coalesced shutdown requests");
        }
        acks
    }

    /// Applies one message, isolating errors and panics to that message.
    fn handle(&mut self, message: M) {
        let handler = &mut self.handler;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(&message)));

        let reason = match outcome {
            Ok(Ok(())) => {
                self.health.record_processed();
                return;
            }
            Ok(Err(e)) => e.to_string(),
            Err(payload) => format!("handler panicked: {}", panic_reason(payload.as_ref())),
        };

        tracing::error!(pipeline = %self.name, %reason, "Dropping message after handler failure");
        self.health.record_failure(&reason);
        self.dead_letters.push(DeadLetter { message, reason });
    }

    fn flush(&mut self, batch: &mut usize) {
        if *batch == 0 {
            return;
        }

        tracing::trace!(pipeline = %self.name, messages = *batch, "Flushing batch");
        *batch = 0;

        let handler = &mut self.handler;
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler.flush())) {
            let reason = format!("flush panicked: {}", panic_reason(payload.as_ref()));
            tracing::error!(pipeline = %self.name, %reason, "Handler flush failed");
            self.health.record_failure(&reason);
        }
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> &str {
    if let Some(reason) = payload.downcast_ref::<&'static str>() {
        reason
    } else if let Some(reason) = payload.downcast_ref::<String>() {
        reason
    } else {
        "unknown panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use std::sync::mpsc as std_mpsc;

    struct Collect(std_mpsc::Sender<u32>);

    impl Handler<u32> for Collect {
        type Error = Infallible;

        fn handle(&mut self, message: &u32) -> Result<(), Infallible> {
            let _ = self.0.send(*message);
            Ok(())
        }
    }

    #[test]
    fn shutdown_handles_messages_queued_behind_it() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (seen_tx, seen_rx) = std_mpsc::channel();
        let health = Arc::new(PipelineHealth::new());

        let (first, first_ack) = oneshot::channel();
        let (second, second_ack) = oneshot::channel();
        for request in [
            WorkRequest::Message(1),
            WorkRequest::Shutdown { response: first },
            WorkRequest::Message(2),
            WorkRequest::Shutdown { response: second },
            WorkRequest::Message(3),
        ] {
            if matches!(request, WorkRequest::Message(_)) {
                health.record_enqueued();
            }
            assert!(tx.send(request).is_ok());
        }

        let worker = Worker {
            name: Arc::from("drain"),
            rx,
            handler: Collect(seen_tx),
            health: Arc::clone(&health),
            dead_letters: Arc::new(DeadLetters::new(4)),
            max_batch: 2,
        };
        worker.spawn().unwrap().join().unwrap();

        first_ack.blocking_recv().unwrap();
        second_ack.blocking_recv().unwrap();
        assert_eq!(seen_rx.try_iter().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(health.pending(), 0);
        assert!(!health.is_alive());
        assert!(tx.send(WorkRequest::Message(4)).is_err());
    }
}
