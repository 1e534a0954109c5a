//! Named single-consumer pipelines with dedicated workers.
//!
//! A pipeline decouples many concurrent producers from one serialized
//! consumer. Producers publish through a cloneable [`Pipeline`] handle onto an
//! unbounded queue; one dedicated worker thread applies messages strictly in
//! arrival order to the pipeline's [`Handler`] and flushes the handler
//! whenever the queue runs dry or a batch fills up.
//!
//! ## Structure
//!
//! - `manager` - [`PipelineManager`], the registry owning every pipeline.
//! - `publisher` - [`Pipeline`], the producer handle.
//! - `worker` - the worker loop and per-message failure isolation.
//! - `health` - counters, liveness and the dead-letter queue.
//!
//! ## Failure isolation
//!
//! A handler error or panic affects only the message that caused it. The
//! message is logged, counted and moved to the dead-letter queue, and the
//! worker continues with the next message.
//!
//! ## Capacity
//!
//! Queues are unbounded: publishing never blocks and never applies
//! backpressure. A producer rate the worker cannot sustain grows the queue,
//! and memory, without limit. [`HealthReport::pending`] tracks the backlog.

mod handler;
mod health;
mod manager;
mod publisher;
mod request;
mod worker;

pub use handler::*;
pub use health::*;
pub use manager::PipelineManager;
pub use publisher::Pipeline;
