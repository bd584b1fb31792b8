//! Variable lookup (`Getvar`)

use crate::error::AmiResult;
use crate::frame::{Action, Frame};

use super::{interpret_status, CommandArgs, CommandHandler, CommandOutput, CommandResult};

/// Reads a channel or global variable
///
/// Arguments: `variable`, optional `channel` (global lookup without it).
#[derive(Debug, Clone, Copy, Default)]
pub struct GetVariable;

impl CommandHandler for GetVariable {
    fn name(&self) -> &'static str {
        "getVariable"
    }

    fn build(&self, args: &CommandArgs) -> AmiResult<Action> {
        let mut action = Action::new("Getvar").field("Variable", args.require("variable")?);
        if let Some(channel) = args.get("channel") {
            action = action.field("Channel", channel);
        }
        Ok(action)
    }

    fn interpret(&self, frame: &Frame) -> CommandResult {
        interpret_status(frame, |frame| {
            Ok(CommandOutput::Variable {
                name: frame.get_non_empty("variable").unwrap_or_default().to_string(),
                value: frame.get_non_empty("value").map(str::to_string),
            })
        })
    }
}
