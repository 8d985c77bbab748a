//! # Runbook Listener
//!
//! Consumes alerts from RabbitMQ and restarts the named service. Takes no
//! command-line flags; see [`runbook_listener::config`] for the environment
//! it reads.
//!
//! ## Usage
//!
//! ```bash
//! RABBITMQ_HOST=rabbitmq RABBITMQ_QUEUE=alerts runbook-listener
//!
//! # Publish an alert
//! rabbitmqadmin publish routing_key=alerts payload=inventory-service
//! ```
//!
//! Exits 0 on Ctrl+C/SIGTERM and non-zero when the broker is unreachable or
//! the connection drops; restarting is left to the supervisor.

use anyhow::Context;
use tokio::signal;
use tracing::{error, info};

use runbook_listener::config::ListenerConfig;
use runbook_listener::consumer::RemediationConsumer;
use runbook_listener::logging;
use runbook_listener::messaging::{MessagingService, RabbitMqMessagingService};
use runbook_listener::runbook::ProcessExecutor;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    logging::init_structured_logging();

    info!("Starting runbook listener");
    info!("   Version: {}", env!("CARGO_PKG_VERSION"));

    let config = ListenerConfig::from_env().context("Failed to load configuration")?;

    info!("   Broker: {}", config.broker.redacted_uri());
    info!("   Queue: {}", config.broker.queue);
    info!("   Command: {}", config.runbook.command);
    info!("   Timeout: {}s", config.runbook.timeout_seconds);
    info!("   Ack mode: {}", config.runbook.ack_mode);
    if config.runbook.allowed_services.is_empty() {
        info!("   Allow-list: none (pattern {})", config.runbook.service_pattern);
    } else {
        info!("   Allow-list: {:?}", config.runbook.allowed_services);
    }

    let messaging = RabbitMqMessagingService::connect(&config.broker)
        .await
        .context("Failed to connect to the message broker")?;
    let healthy = messaging
        .health_check()
        .await
        .context("Broker connection unhealthy after connect")?;
    info!("   Broker connection healthy: {}", healthy);
    let executor = ProcessExecutor::from_config(&config.runbook);

    let mut consumer = RemediationConsumer::from_config(messaging, executor, &config)
        .context("Failed to build remediation consumer")?;

    info!("   Waiting for messages. To exit press CTRL+C");

    match consumer.run(shutdown_signal()).await {
        Ok(()) => {
            info!("Runbook listener shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!(
                error = %e,
                connection_failure = e.is_connection_failure(),
                "Runbook listener terminated"
            );
            Err(e).context("Consumer loop failed")
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received SIGTERM");
        },
    }
}
