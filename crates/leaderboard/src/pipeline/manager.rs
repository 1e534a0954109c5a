//! Registry of named pipelines.
//!
//! [`PipelineManager`] is an explicit object passed to whoever needs a
//! pipeline; there is no process-wide state. It creates each pipeline at most
//! once per name, starts exactly one worker for it, hands out publisher
//! handles for existing pipelines, and coordinates shutdown across all of
//! them.

use super::{
    handler::Handler,
    health::{DeadLetters, HealthReport, PipelineHealth},
    publisher::Pipeline,
    worker::Worker,
};
use crate::{
    config::PipelineConfig,
    error::{Error, Result},
};
use core::time::Duration;
use futures::future::{BoxFuture, FutureExt, join_all};
use parking_lot::Mutex;
use std::{any::Any, collections::BTreeMap, sync::Arc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Type-erased operations the manager needs on every pipeline.
trait PipelineControl: Send + Sync {
    fn health(&self) -> HealthReport;
    fn stop(&self, wait: Duration) -> BoxFuture<'static, Result<()>>;
}

impl<M: Send + 'static> PipelineControl for Pipeline<M> {
    fn health(&self) -> HealthReport {
        Pipeline::health(self)
    }

    fn stop(&self, wait: Duration) -> BoxFuture<'static, Result<()>> {
        let pipeline = self.clone();
        async move { pipeline.stop(wait).await }.boxed()
    }
}

struct Registration {
    /// The typed `Pipeline<M>`, recovered by downcasting in [`PipelineManager::get`].
    publisher: Box<dyn Any + Send + Sync>,
    control: Arc<dyn PipelineControl>,
}

/// Owner of every named pipeline in a process.
pub struct PipelineManager {
    pipelines: Mutex<BTreeMap<String, Registration>>,
    shutdown_token: CancellationToken,
    shutdown_timeout: Duration,
}

impl PipelineManager {
    /// Creates an empty manager. `shutdown_timeout` bounds how long
    /// [`PipelineManager::shutdown`] waits for each worker to drain.
    pub fn new(shutdown_timeout: Duration) -> Self {
        Self {
            pipelines: Mutex::new(BTreeMap::new()),
            shutdown_token: CancellationToken::new(),
            shutdown_timeout,
        }
    }

    /// Creates the pipeline `name` and starts its worker with `handler`.
    ///
    /// # Errors
    ///
    /// - [`Error::PipelineExists`] if `name` is already registered.
    /// - [`Error::ServiceShutdown`] if the manager is shutting down.
    /// - [`Error::WorkerSpawn`] if the worker thread could not be started.
    pub fn spawn<M, H>(&self, name: &str, handler: H, config: &PipelineConfig) -> Result<Pipeline<M>>
    where
        M: Send + 'static,
        H: Handler<M>,
    {
        let mut pipelines = self.pipelines.lock();
        if pipelines.contains_key(name) {
            return Err(Error::PipelineExists {
                name: name.to_owned(),
            });
        }
        self.start(&mut pipelines, name, handler, config)
    }

    /// Returns the pipeline `name`, creating it with the handler built by
    /// `make` if it does not exist yet.
    ///
    /// Creation happens under the registry lock, so concurrent callers agree
    /// on a single pipeline and `make` runs at most once per name.
    ///
    /// # Errors
    ///
    /// - [`Error::PipelineMissing`] if `name` exists with another message
    ///   type.
    /// - Any error of [`PipelineManager::spawn`].
    pub fn get_or_spawn<M, H, F>(&self, name: &str, config: &PipelineConfig, make: F) -> Result<Pipeline<M>>
    where
        M: Send + 'static,
        H: Handler<M>,
        F: FnOnce() -> H,
    {
        let mut pipelines = self.pipelines.lock();
        if let Some(registration) = pipelines.get(name) {
            return downcast(name, registration);
        }
        self.start(&mut pipelines, name, make(), config)
    }

    /// Returns a publisher for the existing pipeline `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PipelineMissing`] if no pipeline with that name and
    /// message type exists.
    pub fn get<M: Send + 'static>(&self, name: &str) -> Result<Pipeline<M>> {
        let pipelines = self.pipelines.lock();
        let registration = pipelines.get(name).ok_or_else(|| Error::PipelineMissing {
            name: name.to_owned(),
        })?;
        downcast(name, registration)
    }

    /// Health of every registered pipeline, ordered by name.
    pub fn health(&self) -> Vec<HealthReport> {
        self.pipelines
            .lock()
            .values()
            .map(|registration| registration.control.health())
            .collect()
    }

    /// Returns `true` once [`PipelineManager::shutdown`] has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Gracefully stops every pipeline.
    ///
    /// - Cancels the shared token so publishers are refused.
    /// - Sends a shutdown request to each worker. It is queued behind any
    ///   pending messages, which are still handled and flushed.
    /// - Waits up to the configured timeout per worker for the
    ///   acknowledgement.
    ///
    /// Failures of individual workers are logged; the first one is returned
    /// after every worker had its chance to stop.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Refusing new pipeline messages");
        self.shutdown_token.cancel();

        let controls: Vec<_> = self
            .pipelines
            .lock()
            .values()
            .map(|registration| Arc::clone(&registration.control))
            .collect();

        tracing::debug!(
            "Waiting up to {:?} per pipeline for {} workers to drain",
            self.shutdown_timeout,
            controls.len()
        );

        let results = join_all(
            controls
                .iter()
                .map(|control| control.stop(self.shutdown_timeout)),
        )
        .await;

        let mut first_error = None;
        for result in results {
            if let Err(e) = result {
                tracing::error!("Pipeline shutdown failed: {e}");
                first_error.get_or_insert(e);
            }
        }

        tracing::info!("Pipeline shutdown complete");
        first_error.map_or(Ok(()), Err)
    }

    fn start<M, H>(
        &self,
        pipelines: &mut BTreeMap<String, Registration>,
        name: &str,
        handler: H,
        config: &PipelineConfig,
    ) -> Result<Pipeline<M>>
    where
        M: Send + 'static,
        H: Handler<M>,
    {
        if self.is_shutting_down() {
            return Err(Error::ServiceShutdown);
        }

        let name: Arc<str> = Arc::from(name);
        let (tx, rx) = mpsc::unbounded_channel();
        let health = Arc::new(PipelineHealth::new());
        let dead_letters = Arc::new(DeadLetters::new(config.dead_letter_capacity));

        Worker {
            name: Arc::clone(&name),
            rx,
            handler,
            health: Arc::clone(&health),
            dead_letters: Arc::clone(&dead_letters),
            max_batch: config.max_batch.max(1),
        }
        .spawn()
        .map_err(|e| Error::WorkerSpawn {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

        let pipeline = Pipeline::new(
            Arc::clone(&name),
            tx,
            health,
            dead_letters,
            self.shutdown_token.clone(),
        );

        pipelines.insert(
            name.to_string(),
            Registration {
                publisher: Box::new(pipeline.clone()),
                control: Arc::new(pipeline.clone()),
            },
        );

        tracing::info!(pipeline = %name, max_batch = config.max_batch, "Pipeline started");
        Ok(pipeline)
    }
}

impl Default for PipelineManager {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

fn downcast<M: Send + 'static>(name: &str, registration: &Registration) -> Result<Pipeline<M>> {
    registration
        .publisher
        .downcast_ref::<Pipeline<M>>()
        .cloned()
        .ok_or_else(|| Error::PipelineMissing {
            name: name.to_owned(),
        })
}
