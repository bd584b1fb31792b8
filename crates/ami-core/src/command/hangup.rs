//! Channel hangup (`Hangup`)

use crate::error::{AmiError, AmiResult};
use crate::frame::Action;

use super::{CommandArgs, CommandHandler};

/// Hangs up a channel, optionally with a Q.850 cause code
///
/// Arguments: `channel`, optional `cause`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Hangup;

impl CommandHandler for Hangup {
    fn name(&self) -> &'static str {
        "hangup"
    }

    fn build(&self, args: &CommandArgs) -> AmiResult<Action> {
        let channel = args.require("channel")?;
        let mut action = Action::new("Hangup").field("Channel", channel);

        if let Some(cause) = args.get("cause") {
            let code: u8 = cause.parse().map_err(|_| AmiError::InvalidArgument {
                name: "cause",
                reason: format!("{:?} is not a cause code", cause),
            })?;
            action = action.field("Cause", code);
        }
        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_with_cause() {
        let action = Hangup
            .build(&CommandArgs::from_pairs([("channel", "SIP/214-0000012"), ("cause", "16")]))
            .unwrap();
        assert_eq!(action.get("Channel"), Some("SIP/214-0000012"));
        assert_eq!(action.get("Cause"), Some("16"));
    }

    #[test]
    fn test_build_rejects_bad_cause() {
        let result = Hangup.build(&CommandArgs::from_pairs([("channel", "SIP/214-1"), ("cause", "normal")]));
        assert!(matches!(result, Err(AmiError::InvalidArgument { name: "cause", .. })));
    }
}
