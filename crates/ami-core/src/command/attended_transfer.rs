//! Attended transfer (`Atxfer`)

use crate::error::AmiResult;
use crate::frame::Action;

use super::{CommandArgs, CommandHandler};

/// Attended transfer of a channel to an extension
///
/// Arguments: `chToTransfer` (the channel to transfer) and `to` (the
/// destination extension).
#[derive(Debug, Clone)]
pub struct AttendedTransfer {
    context: String,
}

impl AttendedTransfer {
    pub fn new(context: impl Into<String>) -> Self {
        Self { context: context.into() }
    }
}

impl CommandHandler for AttendedTransfer {
    fn name(&self) -> &'static str {
        "attendedTransfer"
    }

    fn build(&self, args: &CommandArgs) -> AmiResult<Action> {
        let channel = args.require("chToTransfer")?;
        let to = args.require("to")?;

        // The trailing '#' makes Asterisk dial without waiting for more digits
        Ok(Action::new("Atxfer")
            .field("Exten", format!("{}#", to))
            .field("Context", &self.context)
            .field("Channel", channel)
            .field("Priority", 1))
    }
}
