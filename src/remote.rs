//! Async data services on the tokio runtime.
//!
//! [`SpawnedService`] adapts an [`AsyncDataService`] to the engine's polled
//! [`DataService`] seam: every submitted query runs as its own task and its
//! outcome lands on a channel the engine drains in [`ViewEngine::poll`].
//! Cancelling a ticket aborts its task. Every finished task also fires the
//! service's [`SpawnedService::ready_signal`], which [`settle`] waits on.

use crate::engine::ViewEngine;
use crate::error::ServiceError;
use crate::service::{DataService, QueryArguments, QueryOutcome, QueryTicket};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

/// A data service answering queries asynchronously.
#[async_trait]
pub trait AsyncDataService: Send + Sync {
    /// Whether the service exposes `method`.
    fn supports(&self, _method: &str) -> bool {
        true
    }

    async fn query(&self, method: &str, args: QueryArguments) -> QueryOutcome;
}

type Completion = (QueryTicket, QueryOutcome);

/// Runs each query of an [`AsyncDataService`] as a tokio task.
pub struct SpawnedService<S> {
    service: Arc<S>,
    runtime: Handle,
    sender: mpsc::UnboundedSender<Completion>,
    receiver: mpsc::UnboundedReceiver<Completion>,
    tasks: HashMap<QueryTicket, JoinHandle<()>>,
    ready: Arc<Notify>,
}

impl<S: AsyncDataService + 'static> SpawnedService<S> {
    pub fn new(service: S, runtime: Handle) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        SpawnedService {
            service: Arc::new(service),
            runtime,
            sender,
            receiver,
            tasks: HashMap::new(),
            ready: Arc::new(Notify::new()),
        }
    }

    /// Spawns on the runtime the caller is running in.
    pub fn current(service: S) -> Result<Self, ServiceError> {
        let runtime = Handle::try_current().map_err(|e| ServiceError::Transport(e.to_string()))?;
        Ok(Self::new(service, runtime))
    }

    /// Fired each time a query outcome is queued. Keep a clone before handing
    /// the service to an engine.
    pub fn ready_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.ready)
    }

    /// Queries still running.
    pub fn running(&self) -> usize {
        self.tasks.values().filter(|t| !t.is_finished()).count()
    }

    /// Waits for the next outcome.
    pub async fn next_completion(&mut self) -> Option<(QueryTicket, QueryOutcome)> {
        let completion = self.receiver.recv().await;
        if let Some((ticket, _)) = &completion {
            self.tasks.remove(ticket);
        }
        completion
    }
}

impl<S: AsyncDataService + 'static> DataService for SpawnedService<S> {
    fn supports(&self, method: &str) -> bool {
        self.service.supports(method)
    }

    fn submit(&mut self, ticket: QueryTicket, method: &str, args: QueryArguments) {
        self.tasks.retain(|_, task| !task.is_finished());

        let service = Arc::clone(&self.service);
        let sender = self.sender.clone();
        let ready = Arc::clone(&self.ready);
        let method = method.to_string();
        let task = self.runtime.spawn(async move {
            let outcome = service.query(&method, args).await;
            if sender.send((ticket, outcome)).is_err() {
                log::debug!("query {} finished after its service was dropped", ticket);
                return;
            }
            ready.notify_one();
        });
        self.tasks.insert(ticket, task);
    }

    fn cancel(&mut self, ticket: QueryTicket) {
        if let Some(task) = self.tasks.remove(&ticket) {
            task.abort();
        }
    }

    fn poll(&mut self) -> Vec<(QueryTicket, QueryOutcome)> {
        let mut ready = Vec::new();
        while let Ok((ticket, outcome)) = self.receiver.try_recv() {
            self.tasks.remove(&ticket);
            ready.push((ticket, outcome));
        }
        ready
    }
}

impl<S> Drop for SpawnedService<S> {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}

/// Polls `engine` each time `ready` fires until no query is in flight.
///
/// `ready` is the [`SpawnedService::ready_signal`] of the engine's service.
pub async fn settle(engine: &mut ViewEngine, ready: &Notify) {
    engine.poll();
    while engine.is_loading() {
        ready.notified().await;
        engine.poll();
    }
}
