//! Inbound frame dispatch
//!
//! Every frame read from the connection goes through
//! [`Dispatcher::dispatch`], which decides its fate:
//!
//! ```text
//!              ┌───────────────┐  Response + ActionID   ┌─────────────────────┐
//!  Frame ─────▶│   classify    │───────────────────────▶│ CorrelationRegistry │
//!              └───────┬───────┘                        └─────────────────────┘
//!                      │ Event                          ┌─────────────────────┐
//!                      ├───────────────────────────────▶│ EventHandler (kind) │
//!                      │ anything else                  └─────────────────────┘
//!                      ▼
//!               logged and dropped
//! ```
//!
//! Dispatch never stops on a bad frame. Frames are processed one at a time
//! in arrival order, each to completion before the next.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::correlation::{panic_message, CorrelationRegistry, ResolveOutcome};
use crate::error::AmiResult;
use crate::event::{default_handlers, EventHandler, EventSink, SinkSlot};
use crate::frame::{Frame, FrameClass};
use crate::transport::ConnectionEvent;

/// What happened to a dispatched frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Response handed to its pending callback
    Correlated,
    /// Response for an action ID nobody is waiting on
    Unmatched,
    /// Event handed to its handler
    Routed { event: String },
    /// Event kind without a handler
    UnknownEvent { event: String },
    /// Neither a response nor an event
    Unrecognized,
    /// The handler panicked; the frame was dropped
    HandlerFault { event: String },
}

/// Routes inbound frames to the registry or to event handlers
pub struct Dispatcher {
    registry: Arc<CorrelationRegistry>,
    handlers: HashMap<String, Arc<dyn EventHandler>>,
    sink: Arc<SinkSlot>,
}

impl Dispatcher {
    /// Dispatcher with no event handlers
    pub fn new(registry: Arc<CorrelationRegistry>, sink: Arc<SinkSlot>) -> Self {
        Self {
            registry,
            handlers: HashMap::new(),
            sink,
        }
    }

    /// Dispatcher with every built-in event handler
    pub fn with_defaults(registry: Arc<CorrelationRegistry>, sink: Arc<SinkSlot>) -> Self {
        let mut dispatcher = Self::new(registry, sink);
        for handler in default_handlers(&dispatcher.sink) {
            dispatcher.register_handler(handler);
        }
        dispatcher
    }

    /// Route events named `handler.event_name()` to `handler`
    pub fn register_handler(&mut self, handler: Arc<dyn EventHandler>) {
        let key = handler.event_name().to_ascii_lowercase();
        if self.handlers.insert(key, handler.clone()).is_some() {
            warn!("Event handler for {} registered twice, replacing", handler.event_name());
        }
    }

    /// Attach the downstream sink shared by the event handlers
    pub fn attach(&self, sink: Arc<dyn EventSink>) -> AmiResult<()> {
        self.sink.attach(sink)
    }

    pub fn registry(&self) -> &Arc<CorrelationRegistry> {
        &self.registry
    }

    pub fn handles(&self, event: &str) -> bool {
        self.handlers.contains_key(&event.to_ascii_lowercase())
    }

    /// Route a single frame
    pub fn dispatch(&self, frame: &Frame) -> DispatchOutcome {
        match frame.classify() {
            FrameClass::Response { action_id, .. } => match self.registry.resolve(&action_id, frame) {
                ResolveOutcome::Resolved => DispatchOutcome::Correlated,
                ResolveOutcome::Unmatched => DispatchOutcome::Unmatched,
            },
            FrameClass::Event { name } => self.route_event(name, frame),
            FrameClass::Unrecognized => {
                warn!("Frame not recognized: {}", frame);
                DispatchOutcome::Unrecognized
            }
        }
    }

    fn route_event(&self, name: String, frame: &Frame) -> DispatchOutcome {
        let Some(handler) = self.handlers.get(&name.to_ascii_lowercase()) else {
            debug!("No handler for event {}", name);
            return DispatchOutcome::UnknownEvent { event: name };
        };

        match panic::catch_unwind(AssertUnwindSafe(|| handler.data(frame))) {
            Ok(()) => DispatchOutcome::Routed { event: name },
            Err(payload) => {
                error!("Handler for {} panicked: {} (frame {})", name, panic_message(&payload), frame);
                DispatchOutcome::HandlerFault { event: name }
            }
        }
    }

    /// Process connection events in order until the connection closes
    ///
    /// Pending actions are failed when the connection reports `Closed` or
    /// the event stream ends.
    pub async fn run(&self, mut events: mpsc::Receiver<ConnectionEvent>) {
        info!("AMI dispatcher started");
        let reason = loop {
            match events.recv().await {
                Some(ConnectionEvent::Frame(frame)) => {
                    self.dispatch(&frame);
                }
                Some(ConnectionEvent::Error { error }) => {
                    warn!("AMI connection error: {}", error);
                }
                Some(ConnectionEvent::Closed { reason }) => break reason,
                None => break "connection closed".to_string(),
            }
        };

        let failed = self.registry.fail_all(&reason);
        info!("AMI dispatcher stopped ({}), failed {} pending actions", reason, failed);
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut events: Vec<_> = self.handlers.values().map(|h| h.event_name()).collect();
        events.sort_unstable();
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("events", &events)
            .field("sink", &self.sink)
            .finish()
    }
}
