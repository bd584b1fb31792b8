//! `ChanSpyStart` / `ChanSpyStop`

use std::sync::Arc;

use tracing::{info, warn};

use crate::channel::extract_extension;
use crate::frame::Frame;

use super::{is_event, EventHandler, ProxyEvent, SinkSlot};

/// An extension began listening in on another channel
#[derive(Debug)]
pub struct ChanSpyStart {
    sink: Arc<SinkSlot>,
}

impl ChanSpyStart {
    pub fn new(sink: Arc<SinkSlot>) -> Self {
        Self { sink }
    }
}

impl EventHandler for ChanSpyStart {
    fn event_name(&self) -> &'static str {
        "ChanSpyStart"
    }

    fn data(&self, frame: &Frame) {
        let spyer = match frame.get_non_empty("spyerchannel") {
            Some(channel) if is_event(frame, self.event_name()) => channel,
            _ => {
                warn!("ChanSpyStart event not recognized: {}", frame);
                return;
            }
        };
        info!("Received event ChanSpyStart");

        match extract_extension(spyer) {
            Some(spier_id) => {
                self.sink.publish(ProxyEvent::SpyStarted { spier_id });
            }
            None => warn!("Event ChanSpyStart with unknown spier channel {}", spyer),
        }
    }
}

/// An extension stopped listening in
#[derive(Debug)]
pub struct ChanSpyStop {
    sink: Arc<SinkSlot>,
}

impl ChanSpyStop {
    pub fn new(sink: Arc<SinkSlot>) -> Self {
        Self { sink }
    }
}

impl EventHandler for ChanSpyStop {
    fn event_name(&self) -> &'static str {
        "ChanSpyStop"
    }

    fn data(&self, frame: &Frame) {
        let spyer = match frame.get_non_empty("spyerchannel") {
            Some(channel) if is_event(frame, self.event_name()) => channel,
            _ => {
                warn!("ChanSpyStop event not recognized: {}", frame);
                return;
            }
        };
        info!("Received event ChanSpyStop");

        match extract_extension(spyer) {
            Some(spier_id) => {
                self.sink.publish(ProxyEvent::SpyStopped { spier_id });
            }
            None => warn!("Event ChanSpyStop with unknown spier channel {}", spyer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::test_support::attached_slot;

    #[test]
    fn test_spy_start_forwards_spier() {
        let (slot, mut rx) = attached_slot();
        let frame = Frame::from_pairs([
            ("Event", "ChanSpyStart"),
            ("SpyerChannel", "SIP/214-0000012"),
            ("SpyeeChannel", "SIP/220-0000013"),
        ]);

        ChanSpyStart::new(slot).data(&frame);
        assert_eq!(rx.try_recv().unwrap(), ProxyEvent::SpyStarted { spier_id: "214".into() });
    }

    #[test]
    fn test_spy_start_missing_field_is_dropped() {
        let (slot, mut rx) = attached_slot();
        ChanSpyStart::new(slot).data(&Frame::from_pairs([("Event", "ChanSpyStart")]));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_spy_start_unresolvable_channel_is_dropped() {
        let (slot, mut rx) = attached_slot();
        let frame = Frame::from_pairs([("Event", "ChanSpyStart"), ("SpyerChannel", "DAHDI/i1/5551234-1")]);
        ChanSpyStart::new(slot).data(&frame);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_wrong_event_is_dropped() {
        let (slot, mut rx) = attached_slot();
        let frame = Frame::from_pairs([("Event", "ChanSpyStop"), ("SpyerChannel", "SIP/214-0000012")]);
        ChanSpyStart::new(slot).data(&frame);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_before_attach_is_dropped() {
        let slot = Arc::new(SinkSlot::new());
        let frame = Frame::from_pairs([("Event", "ChanSpyStart"), ("SpyerChannel", "SIP/214-0000012")]);
        ChanSpyStart::new(slot.clone()).data(&frame);
        assert!(!slot.is_attached());
    }

    #[test]
    fn test_spy_stop() {
        let (slot, mut rx) = attached_slot();
        let frame = Frame::from_pairs([("Event", "ChanSpyStop"), ("SpyerChannel", "PJSIP/301-000000a0")]);
        ChanSpyStop::new(slot).data(&frame);
        assert_eq!(rx.try_recv().unwrap(), ProxyEvent::SpyStopped { spier_id: "301".into() });
    }
}
