//! Run command - listen until interrupted, printing notifications.
//!
//! The registry is read once at start; it is not written back.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::watches::Workspace;
use crate::config::Settings;
use crate::notify::{Delivery, MessageTemplate, StructuredMessage, spawn_delivery};
use crate::watch::Destination;

/// How long queued notifications get to print after stopping.
const DELIVERY_DRAIN: Duration = Duration::from_secs(1);

/// Prints every notification to stdout, one line per destination.
pub struct StdoutDelivery {
    template: MessageTemplate,
}

impl StdoutDelivery {
    pub fn new(template: MessageTemplate) -> Self {
        Self { template }
    }

    fn lines(&self, destinations: &[Destination], message: &StructuredMessage) -> Vec<String> {
        let text = self.template.render(message);
        destinations
            .iter()
            .map(|destination| format!("{destination}: {text}"))
            .collect()
    }
}

#[async_trait]
impl Delivery for StdoutDelivery {
    fn name(&self) -> &str {
        "stdout"
    }

    async fn deliver(
        &self,
        destinations: &[Destination],
        message: &StructuredMessage,
    ) -> anyhow::Result<()> {
        for line in self.lines(destinations, message) {
            println!("{line}");
        }
        Ok(())
    }
}

pub async fn run(settings: &Settings) -> anyhow::Result<()> {
    let mut manager = Workspace::open(settings)?.into_manager();

    let delivery = Arc::new(StdoutDelivery::new(settings.notify.event_format.clone()));
    let delivery_task = spawn_delivery(
        manager.subscribe_notifications(),
        delivery,
        settings.notify.show_hidden,
    );

    manager.start()?;
    let status = manager.status();
    eprintln!(
        "Listening on {} of {} watches. Press Ctrl-C to stop.",
        status.armed, status.watches
    );

    tokio::signal::ctrl_c().await?;
    eprintln!("Stopping...");

    let stopped = manager.stop().await;

    // dropping the manager closes the channel and ends delivery
    drop(manager);
    match tokio::time::timeout(DELIVERY_DRAIN, delivery_task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("[cli] delivery task failed: {e}"),
        Err(_) => tracing::warn!("[cli] delivery still running after {DELIVERY_DRAIN:?}"),
    }

    stopped?;
    Ok(())
}
