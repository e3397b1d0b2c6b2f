//! Outbox helpers.
//!
//! Delivery is asynchronous through call actors, so tests wait for events
//! with a short timeout instead of polling `try_recv`.

use anyhow::{anyhow, Result};
use signaling_service::actors::ConnectionOutbox;
use signaling_service::protocol::ServerEvent;
use std::time::Duration;

/// How long to wait for an expected event.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

/// How long to wait before concluding no event is coming.
pub const SILENCE_WINDOW: Duration = Duration::from_millis(50);

/// Next event on the outbox, failing after [`EVENT_TIMEOUT`].
pub async fn next_event(outbox: &mut ConnectionOutbox) -> Result<ServerEvent> {
    match tokio::time::timeout(EVENT_TIMEOUT, outbox.recv()).await {
        Ok(Some(event)) => Ok(event),
        Ok(None) => Err(anyhow!("outbox {} closed", outbox.id())),
        Err(_) => Err(anyhow!(
            "no event on outbox {} within {:?}",
            outbox.id(),
            EVENT_TIMEOUT
        )),
    }
}

/// The next `count` events, in delivery order.
pub async fn next_events(outbox: &mut ConnectionOutbox, count: usize) -> Result<Vec<ServerEvent>> {
    let mut events = Vec::with_capacity(count);
    for _ in 0..count {
        events.push(next_event(outbox).await?);
    }
    Ok(events)
}

/// Everything delivered so far, without waiting.
pub fn drain(outbox: &mut ConnectionOutbox) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Some(event) = outbox.try_recv() {
        events.push(event);
    }
    events
}

/// Succeeds if nothing arrives within [`SILENCE_WINDOW`].
pub async fn expect_silence(outbox: &mut ConnectionOutbox) -> Result<()> {
    match tokio::time::timeout(SILENCE_WINDOW, outbox.recv()).await {
        Ok(Some(event)) => Err(anyhow!(
            "expected silence on outbox {}, got {}",
            outbox.id(),
            event.name()
        )),
        Ok(None) | Err(_) => Ok(()),
    }
}
