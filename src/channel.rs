//! Session log channel
//!
//! The engine writes [`SessionEvent`]s into an [`EventSink`]; whoever holds
//! the matching [`EventStream`] persists or displays them. The engine never
//! reads its own log back.

use tokio::sync::mpsc;

use crate::events::SessionEvent;

/// Write half of the session log
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<SessionEvent>>,
}

impl EventSink {
    /// A sink that drops every event
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Append an event; a closed or disabled sink silently drops it
    pub fn emit(&self, event: SessionEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    /// Check if events still reach a reader
    pub fn is_closed(&self) -> bool {
        self.tx.as_ref().map_or(true, |tx| tx.is_closed())
    }
}

/// Read half of the session log
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl EventStream {
    /// Try to receive an event (non-blocking)
    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        self.rx.try_recv().ok()
    }

    /// Receive the next event, `None` once every sink is dropped
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.rx.recv().await
    }

    /// Everything currently buffered
    pub fn drain(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Create a connected sink/stream pair
pub fn event_channel() -> (EventSink, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink { tx: Some(tx) }, EventStream { rx })
}
