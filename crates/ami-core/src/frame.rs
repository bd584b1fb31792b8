//! AMI frames and actions
//!
//! An inbound AMI packet is a block of `Key: Value` lines. The same shape
//! carries both responses to actions (`Response:` + `ActionID:`) and
//! unsolicited events (`Event:`). [`Frame`] stores such a block with keys
//! normalised to lowercase; [`Frame::classify`] tells the dispatcher which
//! of the two it is looking at.
//!
//! Outbound packets are [`Action`]s.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::correlation::ActionId;

/// One inbound AMI packet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    fields: Vec<(String, String)>,
}

/// Response status carried in the `Response` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseStatus {
    Success,
    Error,
    /// `Follows`, `Goodbye` or anything else Asterisk may send
    Other(String),
}

impl ResponseStatus {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("success") {
            ResponseStatus::Success
        } else if value.eq_ignore_ascii_case("error") {
            ResponseStatus::Error
        } else {
            ResponseStatus::Other(value.to_string())
        }
    }
}

/// What an inbound frame turned out to be
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameClass {
    /// A response correlated by action ID
    Response {
        action_id: ActionId,
        status: ResponseStatus,
        message: Option<String>,
    },
    /// An unsolicited event
    Event { name: String },
    /// Neither shape matched
    Unrecognized,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a frame from header pairs, keys are stored lowercase
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut frame = Frame::new();
        for (key, value) in pairs {
            frame.insert(key.as_ref(), value);
        }
        frame
    }

    /// Add a header. Repeated keys are kept in arrival order.
    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.fields.push((key.trim().to_ascii_lowercase(), value.into()));
    }

    /// First value of `key`, looked up case-insensitively
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// First non-blank value of `key`
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    /// All values of `key` in arrival order
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The `ActionID` header, if present and non-blank
    pub fn action_id(&self) -> Option<ActionId> {
        self.get_non_empty("actionid").map(ActionId::from)
    }

    /// The `Event` header
    pub fn event_name(&self) -> Option<&str> {
        self.get_non_empty("event")
    }

    /// The `Response` header, parsed
    pub fn response_status(&self) -> Option<ResponseStatus> {
        self.get_non_empty("response").map(ResponseStatus::parse)
    }

    /// Decide whether this frame answers an action or reports an event
    ///
    /// A `Response` header takes precedence over `Event`; a response
    /// without an `ActionID` cannot be correlated and is unrecognized.
    pub fn classify(&self) -> FrameClass {
        if let Some(status) = self.response_status() {
            return match self.action_id() {
                Some(action_id) => FrameClass::Response {
                    action_id,
                    status,
                    message: self.get_non_empty("message").map(str::to_string),
                },
                None => FrameClass::Unrecognized,
            };
        }
        match self.event_name() {
            Some(name) => FrameClass::Event { name: name.to_string() },
            None => FrameClass::Unrecognized,
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.fields.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// One outbound AMI action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    name: String,
    action_id: Option<ActionId>,
    fields: Vec<(String, String)>,
}

impl Action {
    /// Create an action with the given `Action:` name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            action_id: None,
            fields: Vec::new(),
        }
    }

    /// Append a header
    pub fn field(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.fields.push((key.into(), value.to_string()));
        self
    }

    /// Stamp the action with its correlation tag
    pub fn set_action_id(&mut self, action_id: ActionId) {
        self.action_id = Some(action_id);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn action_id(&self) -> Option<&ActionId> {
        self.action_id.as_ref()
    }

    /// Value of a header, looked up case-insensitively
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Render the action in AMI wire format, terminated by a blank line
    pub fn to_wire(&self) -> String {
        let mut out = format!("Action: {}\r\n", self.name);
        if let Some(id) = &self.action_id {
            out.push_str(&format!("ActionID: {}\r\n", id));
        }
        for (key, value) in &self.fields {
            // Header values cannot span lines
            let value = value.replace(['\r', '\n'], " ");
            out.push_str(&format!("{}: {}\r\n", key, value));
        }
        out.push_str("\r\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let frame = Frame::from_pairs([("ActionID", "abc-1"), ("Response", "Success")]);
        assert_eq!(frame.get("actionid"), Some("abc-1"));
        assert_eq!(frame.get("ACTIONID"), Some("abc-1"));
        assert_eq!(frame.action_id(), Some(ActionId::from("abc-1")));
    }

    #[test]
    fn test_classify_response() {
        let frame = Frame::from_pairs([
            ("Response", "Error"),
            ("ActionID", "t-7"),
            ("Message", "Channel not found"),
        ]);
        assert_eq!(
            frame.classify(),
            FrameClass::Response {
                action_id: ActionId::from("t-7"),
                status: ResponseStatus::Error,
                message: Some("Channel not found".to_string()),
            }
        );
    }

    #[test]
    fn test_classify_event() {
        let frame = Frame::from_pairs([("Event", "ChanSpyStart"), ("SpyerChannel", "SIP/214-0000012")]);
        assert_eq!(frame.classify(), FrameClass::Event { name: "ChanSpyStart".to_string() });
    }

    #[test]
    fn test_event_carrying_action_id_is_still_an_event() {
        let frame = Frame::from_pairs([("Event", "StatusComplete"), ("ActionID", "t-1")]);
        assert!(matches!(frame.classify(), FrameClass::Event { .. }));
    }

    #[test]
    fn test_response_without_action_id_is_unrecognized() {
        let frame = Frame::from_pairs([("Response", "Success"), ("Message", "Authentication accepted")]);
        assert_eq!(frame.classify(), FrameClass::Unrecognized);
        assert_eq!(Frame::from_pairs([("Foo", "bar")]).classify(), FrameClass::Unrecognized);
    }

    #[test]
    fn test_unknown_status_is_other() {
        let frame = Frame::from_pairs([("Response", "Follows"), ("ActionID", "t-2")]);
        assert_eq!(frame.response_status(), Some(ResponseStatus::Other("Follows".to_string())));
    }

    #[test]
    fn test_action_to_wire() {
        let mut action = Action::new("Atxfer")
            .field("Exten", "220#")
            .field("Priority", 1);
        action.set_action_id(ActionId::from("x-attendedTransfer-1"));
        assert_eq!(
            action.to_wire(),
            "Action: Atxfer\r\nActionID: x-attendedTransfer-1\r\nExten: 220#\r\nPriority: 1\r\n\r\n"
        );
    }

    #[test]
    fn test_action_to_wire_strips_line_breaks() {
        let action = Action::new("Setvar").field("Value", "a\r\nAction: Hangup");
        assert!(action.to_wire().contains("Value: a  Action: Hangup\r\n"));
    }
}
