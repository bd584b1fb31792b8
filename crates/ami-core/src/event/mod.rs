//! AMI event handlers
//!
//! Unsolicited events have no caller waiting on them. Each handler checks
//! that a frame is the event it expects and carries the fields it needs,
//! resolves the channel names it contains into [`ExtensionId`]s and
//! forwards a complete [`ProxyEvent`] to the downstream [`EventSink`].
//! Anything short of that is logged and dropped.
//!
//! All handlers share one [`SinkSlot`]. The sink is attached once, before
//! traffic flows; events that arrive earlier are dropped with a warning.

mod chanspy;
mod device_state;
mod hangup;

pub use chanspy::{ChanSpyStart, ChanSpyStop};
pub use device_state::{DeviceState, DeviceStateChange};
pub use hangup::HangupEvent;

use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::channel::ExtensionId;
use crate::error::{AmiError, AmiResult};
use crate::frame::Frame;

/// Domain event forwarded to the proxy layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProxyEvent {
    /// An extension started spying on a conversation
    SpyStarted { spier_id: ExtensionId },
    /// An extension stopped spying
    SpyStopped { spier_id: ExtensionId },
    /// A channel owned by an extension hung up
    ChannelHungUp {
        extension: ExtensionId,
        channel: String,
        cause: Option<u16>,
        cause_text: Option<String>,
    },
    /// The device of an extension changed state
    DeviceStateChanged {
        extension: ExtensionId,
        device: String,
        state: DeviceState,
    },
}

/// Receiver of domain events
pub trait EventSink: Send + Sync {
    fn publish(&self, event: ProxyEvent);
}

impl EventSink for mpsc::UnboundedSender<ProxyEvent> {
    fn publish(&self, event: ProxyEvent) {
        if let Err(e) = self.send(event) {
            warn!("Event sink closed, dropping {:?}", e.0);
        }
    }
}

impl EventSink for mpsc::Sender<ProxyEvent> {
    fn publish(&self, event: ProxyEvent) {
        if let Err(e) = self.try_send(event) {
            warn!("Event sink rejected event: {}", e);
        }
    }
}

/// One-time attachment point for the downstream sink
#[derive(Default)]
pub struct SinkSlot {
    sink: OnceLock<Arc<dyn EventSink>>,
}

impl SinkSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// A slot with `sink` already attached
    pub fn attached(sink: Arc<dyn EventSink>) -> Self {
        let slot = Self::new();
        let _ = slot.sink.set(sink);
        slot
    }

    /// Attach the sink; only the first call succeeds
    pub fn attach(&self, sink: Arc<dyn EventSink>) -> AmiResult<()> {
        self.sink.set(sink).map_err(|_| {
            warn!("Event sink already attached, ignoring");
            AmiError::AlreadyAttached
        })?;
        info!("Event sink attached");
        Ok(())
    }

    pub fn is_attached(&self) -> bool {
        self.sink.get().is_some()
    }

    /// Forward `event` if a sink is attached; returns whether it was forwarded
    pub fn publish(&self, event: ProxyEvent) -> bool {
        match self.sink.get() {
            Some(sink) => {
                debug!("Forwarding {:?}", event);
                sink.publish(event);
                true
            }
            None => {
                warn!("No event sink attached, dropping {:?}", event);
                false
            }
        }
    }
}

impl fmt::Debug for SinkSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkSlot").field("attached", &self.is_attached()).finish()
    }
}

/// One AMI event variant
pub trait EventHandler: Send + Sync {
    /// `Event:` header value this handler is routed
    fn event_name(&self) -> &'static str;

    /// Process one frame routed to this handler
    fn data(&self, frame: &Frame);
}

/// True if `frame` is the `expected` event
pub(crate) fn is_event(frame: &Frame, expected: &str) -> bool {
    frame.event_name().is_some_and(|name| name.eq_ignore_ascii_case(expected))
}

/// Every built-in event handler, sharing `slot`
pub fn default_handlers(slot: &Arc<SinkSlot>) -> Vec<Arc<dyn EventHandler>> {
    vec![
        Arc::new(ChanSpyStart::new(slot.clone())),
        Arc::new(ChanSpyStop::new(slot.clone())),
        Arc::new(HangupEvent::new(slot.clone())),
        Arc::new(DeviceStateChange::new(slot.clone())),
    ]
}
