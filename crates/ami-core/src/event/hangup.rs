//! `Hangup`

use std::sync::Arc;

use tracing::warn;

use crate::channel::extract_extension;
use crate::frame::Frame;

use super::{is_event, EventHandler, ProxyEvent, SinkSlot};

/// A channel was hung up
#[derive(Debug)]
pub struct HangupEvent {
    sink: Arc<SinkSlot>,
}

impl HangupEvent {
    pub fn new(sink: Arc<SinkSlot>) -> Self {
        Self { sink }
    }
}

impl EventHandler for HangupEvent {
    fn event_name(&self) -> &'static str {
        "Hangup"
    }

    fn data(&self, frame: &Frame) {
        let channel = match frame.get_non_empty("channel") {
            Some(channel) if is_event(frame, self.event_name()) => channel,
            _ => {
                warn!("Hangup event not recognized: {}", frame);
                return;
            }
        };

        let Some(extension) = extract_extension(channel) else {
            warn!("Hangup of channel {} without extension, dropping", channel);
            return;
        };

        let cause = match frame.get_non_empty("cause").map(str::parse::<u16>) {
            Some(Ok(code)) => Some(code),
            Some(Err(_)) => {
                warn!("Hangup event with invalid cause for {}: {}", channel, frame);
                return;
            }
            None => None,
        };

        self.sink.publish(ProxyEvent::ChannelHungUp {
            extension,
            channel: channel.to_string(),
            cause,
            cause_text: frame.get_non_empty("cause-txt").map(str::to_string),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::test_support::attached_slot;

    #[test]
    fn test_hangup_forwards_cause() {
        let (slot, mut rx) = attached_slot();
        let frame = Frame::from_pairs([
            ("Event", "Hangup"),
            ("Channel", "SIP/214-0000012"),
            ("Cause", "16"),
            ("Cause-txt", "Normal Clearing"),
        ]);

        HangupEvent::new(slot).data(&frame);
        assert_eq!(
            rx.try_recv().unwrap(),
            ProxyEvent::ChannelHungUp {
                extension: "214".into(),
                channel: "SIP/214-0000012".into(),
                cause: Some(16),
                cause_text: Some("Normal Clearing".into()),
            }
        );
    }

    #[test]
    fn test_hangup_invalid_cause_is_dropped() {
        let (slot, mut rx) = attached_slot();
        let frame = Frame::from_pairs([("Event", "Hangup"), ("Channel", "SIP/214-0000012"), ("Cause", "x")]);
        HangupEvent::new(slot).data(&frame);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_hangup_without_channel_is_dropped() {
        let (slot, mut rx) = attached_slot();
        HangupEvent::new(slot).data(&Frame::from_pairs([("Event", "Hangup"), ("Cause", "16")]));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_hangup_of_unresolvable_channel_is_dropped() {
        let (slot, mut rx) = attached_slot();
        HangupEvent::new(slot).data(&Frame::from_pairs([("Event", "Hangup"), ("Channel", "DAHDI/i1/5551234-1")]));
        assert!(rx.try_recv().is_err());
    }
}
