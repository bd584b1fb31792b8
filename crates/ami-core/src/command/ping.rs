//! Keepalive (`Ping`)

use crate::error::AmiResult;
use crate::frame::{Action, Frame};

use super::{interpret_status, CommandArgs, CommandHandler, CommandOutput, CommandResult};

#[derive(Debug, Clone, Copy, Default)]
pub struct Ping;

impl CommandHandler for Ping {
    fn name(&self) -> &'static str {
        "ping"
    }

    fn build(&self, _args: &CommandArgs) -> AmiResult<Action> {
        Ok(Action::new("Ping"))
    }

    fn interpret(&self, frame: &Frame) -> CommandResult {
        interpret_status(frame, |frame| {
            Ok(CommandOutput::Pong {
                timestamp: frame.get_non_empty("timestamp").map(str::to_string),
            })
        })
    }
}
