//! `DeviceStateChange`

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::channel::extract_extension;
use crate::frame::Frame;

use super::{is_event, EventHandler, ProxyEvent, SinkSlot};

/// Asterisk device state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    NotInUse,
    InUse,
    Busy,
    Invalid,
    Unavailable,
    Ringing,
    RingInUse,
    OnHold,
    Unknown,
}

impl FromStr for DeviceState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NOT_INUSE" => Ok(DeviceState::NotInUse),
            "INUSE" => Ok(DeviceState::InUse),
            "BUSY" => Ok(DeviceState::Busy),
            "INVALID" => Ok(DeviceState::Invalid),
            "UNAVAILABLE" => Ok(DeviceState::Unavailable),
            "RINGING" => Ok(DeviceState::Ringing),
            "RINGINUSE" => Ok(DeviceState::RingInUse),
            "ONHOLD" => Ok(DeviceState::OnHold),
            "UNKNOWN" => Ok(DeviceState::Unknown),
            _ => Err(()),
        }
    }
}

/// The state of a device changed
#[derive(Debug)]
pub struct DeviceStateChange {
    sink: Arc<SinkSlot>,
}

impl DeviceStateChange {
    pub fn new(sink: Arc<SinkSlot>) -> Self {
        Self { sink }
    }
}

impl EventHandler for DeviceStateChange {
    fn event_name(&self) -> &'static str {
        "DeviceStateChange"
    }

    fn data(&self, frame: &Frame) {
        let (device, state) = match (frame.get_non_empty("device"), frame.get_non_empty("state")) {
            (Some(device), Some(state)) if is_event(frame, self.event_name()) => (device, state),
            _ => {
                warn!("DeviceStateChange event not recognized: {}", frame);
                return;
            }
        };

        let Ok(state) = state.parse::<DeviceState>() else {
            warn!("DeviceStateChange for {} with unknown state {}", device, state);
            return;
        };
        let Some(extension) = extract_extension(device) else {
            warn!("DeviceStateChange with unknown device {}", device);
            return;
        };

        self.sink.publish(ProxyEvent::DeviceStateChanged {
            extension,
            device: device.to_string(),
            state,
        });
    }
}
