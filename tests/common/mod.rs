//! Shared helpers for listener integration tests

#![allow(dead_code)]

pub mod strategies;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{watch, Notify};

use runbook_listener::config::AckMode;
use runbook_listener::consumer::{ConsumerState, RemediationConsumer};
use runbook_listener::messaging::{InMemoryMessagingService, MessagingService};
use runbook_listener::runbook::{
    CommandTemplate, Dispatcher, ExecutionError, ExecutionResult, RunbookAction, RunbookExecutor,
    ServicePolicy,
};

pub const QUEUE: &str = "alerts";

/// Executor double that records every invocation instead of spawning
#[derive(Debug, Clone, Default)]
pub struct RecordingExecutor {
    calls: Arc<Mutex<Vec<Vec<String>>>>,
    exit_statuses: Arc<Mutex<HashMap<String, i32>>>,
    failing_targets: Arc<Mutex<HashSet<String>>>,
    observer: Option<Arc<InMemoryMessagingService>>,
    acks_at_execution: Arc<Mutex<Vec<usize>>>,
    state: Arc<Mutex<Option<watch::Receiver<ConsumerState>>>>,
    states_at_execution: Arc<Mutex<Vec<ConsumerState>>>,
    executed: Option<Arc<Notify>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record how many acks the broker had seen each time `execute` runs
    pub fn observing(mut self, messaging: &InMemoryMessagingService) -> Self {
        self.observer = Some(Arc::new(messaging.handle()));
        self
    }

    /// Record the consumer state each time `execute` runs
    ///
    /// Applies to every clone, so it can be set after the consumer took one.
    pub fn observe_state(&self, state: watch::Receiver<ConsumerState>) {
        *self.state.lock() = Some(state);
    }

    /// Signal `executed` after every call
    pub fn notifying(mut self, executed: Arc<Notify>) -> Self {
        self.executed = Some(executed);
        self
    }

    pub fn exit_with(self, target: &str, status: i32) -> Self {
        self.exit_statuses.lock().insert(target.to_string(), status);
        self
    }

    pub fn fail_to_spawn(self, target: &str) -> Self {
        self.failing_targets.lock().insert(target.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().clone()
    }

    pub fn targets(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|argv| argv.last().cloned())
            .collect()
    }

    pub fn acks_at_execution(&self) -> Vec<usize> {
        self.acks_at_execution.lock().clone()
    }

    pub fn states_at_execution(&self) -> Vec<ConsumerState> {
        self.states_at_execution.lock().clone()
    }
}

#[async_trait]
impl RunbookExecutor for RecordingExecutor {
    async fn execute(&self, action: &RunbookAction) -> Result<ExecutionResult, ExecutionError> {
        self.calls.lock().push(action.argv());
        if let Some(observer) = &self.observer {
            self.acks_at_execution
                .lock()
                .push(observer.acknowledged().len());
        }
        let state = self.state.lock().as_ref().map(|state| *state.borrow());
        if let Some(state) = state {
            self.states_at_execution.lock().push(state);
        }
        if let Some(executed) = &self.executed {
            executed.notify_one();
        }

        let target = action.target.as_str();
        if self.failing_targets.lock().contains(target) {
            return Err(ExecutionError::Spawn {
                program: action.program(),
                message: "No such file or directory".to_string(),
            });
        }

        let status = self.exit_statuses.lock().get(target).copied().unwrap_or(0);
        Ok(ExecutionResult::from_exit_status(status, Duration::ZERO))
    }
}

/// In-memory broker with the alert queue declared and `payloads` enqueued
pub async fn broker_with(payloads: &[&[u8]]) -> InMemoryMessagingService {
    let broker = InMemoryMessagingService::with_queues(&[QUEUE]);
    for payload in payloads {
        broker
            .send_message(QUEUE, payload)
            .await
            .expect("queue declared");
    }
    broker
}

pub fn default_dispatcher() -> Dispatcher {
    Dispatcher::new(ServicePolicy::default(), CommandTemplate::default())
}

pub fn consumer<E: RunbookExecutor>(
    broker: InMemoryMessagingService,
    executor: E,
    ack_mode: AckMode,
) -> RemediationConsumer<InMemoryMessagingService, E> {
    RemediationConsumer::new(broker, executor, default_dispatcher(), QUEUE, ack_mode)
}
