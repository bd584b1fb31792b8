//! Blind transfer (`Redirect`)

use crate::error::AmiResult;
use crate::frame::Action;

use super::{CommandArgs, CommandHandler};

/// Redirects a channel straight to an extension
///
/// Arguments: `channel` and `to`.
#[derive(Debug, Clone)]
pub struct RedirectChannel {
    context: String,
}

impl RedirectChannel {
    pub fn new(context: impl Into<String>) -> Self {
        Self { context: context.into() }
    }
}

impl CommandHandler for RedirectChannel {
    fn name(&self) -> &'static str {
        "redirectChannel"
    }

    fn build(&self, args: &CommandArgs) -> AmiResult<Action> {
        let channel = args.require("channel")?;
        let to = args.require("to")?;

        Ok(Action::new("Redirect")
            .field("Channel", channel)
            .field("Exten", to)
            .field("Context", &self.context)
            .field("Priority", 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build() {
        let action = RedirectChannel::new("ext-local")
            .build(&CommandArgs::from_pairs([("channel", "PJSIP/201-00000007"), ("to", "300")]))
            .unwrap();
        assert_eq!(action.name(), "Redirect");
        assert_eq!(action.get("Exten"), Some("300"));
        assert_eq!(action.get("Context"), Some("ext-local"));
        assert_eq!(action.get("Priority"), Some("1"));
    }
}
