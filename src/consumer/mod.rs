//! # Remediation Consumer
//!
//! The consumer loop: wait for an alert, resolve it to a restart, run it,
//! acknowledge, repeat. Exactly one message is in flight at a time and the
//! next one is not pulled until the executor returns.
//!
//! ## Acknowledgment
//!
//! Every delivery is acknowledged exactly once, whatever happens to it. With
//! [`AckMode::OnReceipt`] (the default) the ack goes out before dispatch, so a
//! crash mid-remediation loses the alert. [`AckMode::AfterExecution`] moves the
//! ack after the executor returns; an unacked delivery is then redelivered
//! when the connection drops, and the restart it triggers runs again.
//!
//! ## Failure policy
//!
//! Bad payloads and failed commands are logged and the loop moves on. Anything
//! wrong with the broker (ack failure, closed stream) ends the loop with an
//! error; the messaging service is closed on every exit path.

mod state;

use std::future::Future;

use tokio::sync::watch;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

pub use state::{ConsumerState, ConsumerStats, MessageOutcome};

use crate::config::{AckMode, ConfigResult, ListenerConfig};
use crate::error::{ListenerError, Result};
use crate::logging::{log_error, log_remediation_operation};
use crate::messaging::{MessagingError, MessagingService, QueuedMessage, ReceiptHandle};
use crate::runbook::{Dispatcher, RunbookExecutor};

/// Characters of payload echoed into logs
const PAYLOAD_PREVIEW_CHARS: usize = 128;

pub struct RemediationConsumer<S, E> {
    messaging: S,
    executor: E,
    dispatcher: Dispatcher,
    queue_name: String,
    ack_mode: AckMode,
    state: watch::Sender<ConsumerState>,
    stats: ConsumerStats,
}

impl<S, E> RemediationConsumer<S, E>
where
    S: MessagingService,
    E: RunbookExecutor,
{
    pub fn new(
        messaging: S,
        executor: E,
        dispatcher: Dispatcher,
        queue_name: impl Into<String>,
        ack_mode: AckMode,
    ) -> Self {
        Self {
            messaging,
            executor,
            dispatcher,
            queue_name: queue_name.into(),
            ack_mode,
            state: watch::channel(ConsumerState::Connecting).0,
            stats: ConsumerStats::default(),
        }
    }

    pub fn from_config(messaging: S, executor: E, config: &ListenerConfig) -> ConfigResult<Self> {
        Ok(Self::new(
            messaging,
            executor,
            Dispatcher::from_config(&config.runbook)?,
            config.broker.queue.clone(),
            config.runbook.ack_mode,
        ))
    }

    pub fn state(&self) -> ConsumerState {
        *self.state.borrow()
    }

    /// Follow state transitions while `run` holds the consumer
    pub fn subscribe_state(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    pub fn stats(&self) -> ConsumerStats {
        self.stats
    }

    pub fn messaging(&self) -> &S {
        &self.messaging
    }

    /// Consume until `shutdown` resolves or the broker fails
    ///
    /// `shutdown` is only observed while waiting for a delivery; a remediation
    /// in progress runs to completion (or its timeout) first. The messaging
    /// service is closed before this returns, on success and on error.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let result = self.consume(shutdown).await;
        self.transition(ConsumerState::Terminated);

        let closed = self.messaging.close().await;

        info!(
            queue = %self.queue_name,
            received = self.stats.received,
            acknowledged = self.stats.acknowledged,
            remediated = self.stats.remediated,
            failed = self.stats.failed,
            rejected = self.stats.rejected,
            "Consumer stopped"
        );

        match (result, closed) {
            (Err(e), Err(close_err)) => {
                warn!(error = %close_err, "Close after failure also failed");
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(()), Err(close_err)) => Err(close_err.into()),
            (Ok(()), Ok(())) => Ok(()),
        }
    }

    async fn consume<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.messaging.start_consuming(&self.queue_name).await?;

        info!(
            queue = %self.queue_name,
            provider = self.messaging.provider_name(),
            ack_mode = %self.ack_mode,
            "Waiting for alerts"
        );

        tokio::pin!(shutdown);

        loop {
            self.transition(ConsumerState::Listening);

            let delivery = tokio::select! {
                biased;
                () = &mut shutdown => {
                    info!("Shutdown requested while listening");
                    return Ok(());
                }
                delivery = self.messaging.next_delivery() => delivery?,
            };

            let Some(message) = delivery else {
                return Err(ListenerError::from(MessagingError::connection_closed(
                    &self.queue_name,
                )));
            };

            self.transition(ConsumerState::Processing);
            self.process_delivery(message).await?;
        }
    }

    /// Run one delivery through dispatch and execution and acknowledge it
    ///
    /// Only an acknowledgment failure is returned as an error; every other
    /// failure is folded into the [`MessageOutcome`].
    pub async fn process_delivery(
        &mut self,
        message: QueuedMessage,
    ) -> std::result::Result<MessageOutcome, MessagingError> {
        let span = info_span!(
            "remediation",
            correlation_id = %Uuid::new_v4(),
            receipt_handle = %message.receipt_handle,
            redelivered = message.redelivered,
        );

        async move {
            self.stats.received += 1;
            info!(
                payload = %payload_preview(&message.payload),
                bytes = message.payload.len(),
                "Received alert"
            );

            if self.ack_mode == AckMode::OnReceipt {
                self.acknowledge(&message.receipt_handle).await?;
            }

            let outcome = match self.dispatcher.resolve(&message.payload) {
                Err(e) => {
                    warn!(error = %e, "Alert rejected; no remediation run");
                    MessageOutcome::Rejected(e)
                }
                Ok(action) => {
                    info!(
                        target_service = %action.target,
                        command = %action.command_line(),
                        "Executing runbook"
                    );
                    match self.executor.execute(&action).await {
                        Ok(result) => MessageOutcome::Remediated(result),
                        Err(e) => {
                            log_error(
                                "executor",
                                "execute",
                                &e.to_string(),
                                Some(action.target.as_str()),
                            );
                            MessageOutcome::ExecutionFailed(e)
                        }
                    }
                }
            };
            self.stats.record(&outcome);

            if self.ack_mode == AckMode::AfterExecution {
                self.acknowledge(&message.receipt_handle).await?;
            }

            let service = match &outcome {
                MessageOutcome::Rejected(_) => None,
                _ => std::str::from_utf8(&message.payload).ok(),
            };
            let exit_status = match &outcome {
                MessageOutcome::Remediated(result) => Some(result.exit_status),
                _ => None,
            };
            let details = match &outcome {
                MessageOutcome::Rejected(e) => Some(e.to_string()),
                MessageOutcome::ExecutionFailed(e) => Some(e.to_string()),
                MessageOutcome::Remediated(_) => None,
            };
            log_remediation_operation(
                "restart",
                service,
                message.receipt_handle.as_str(),
                outcome.status_label(),
                exit_status,
                details.as_deref(),
            );

            Ok(outcome)
        }
        .instrument(span)
        .await
    }

    async fn acknowledge(
        &mut self,
        receipt_handle: &ReceiptHandle,
    ) -> std::result::Result<(), MessagingError> {
        self.messaging.ack_message(receipt_handle).await?;
        self.stats.acknowledged += 1;
        debug!(receipt_handle = %receipt_handle, "Delivery acknowledged");
        Ok(())
    }

    fn transition(&mut self, next: ConsumerState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "Consumer state transition");
        }
    }
}

/// Printable, bounded rendering of an untrusted payload
fn payload_preview(payload: &[u8]) -> String {
    let text = String::from_utf8_lossy(payload);
    let mut preview: String = text
        .chars()
        .take(PAYLOAD_PREVIEW_CHARS)
        .flat_map(char::escape_debug)
        .collect();
    if text.chars().count() > PAYLOAD_PREVIEW_CHARS {
        preview.push_str("...");
    }
    preview
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_preview_escapes_and_truncates() {
        assert_eq!(payload_preview(b"web\nservice"), "web\\nservice");

        let long = "a".repeat(PAYLOAD_PREVIEW_CHARS + 10);
        let preview = payload_preview(long.as_bytes());
        assert!(preview.ends_with("..."));
        assert_eq!(preview.len(), PAYLOAD_PREVIEW_CHARS + 3);
    }
}
