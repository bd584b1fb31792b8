//! AMI command handlers
//!
//! A command turns a flat set of caller arguments into an [`Action`],
//! sends it, and later turns the correlated response back into a
//! [`CommandOutput`]. Each variant implements [`CommandHandler`]; the
//! shared plumbing (tag allocation, registration, transmission and the
//! send-failure path) lives in [`CommandExecutor`].
//!
//! ## Outcome rule
//!
//! Every variant derives its outcome the same way, see [`interpret_status`]:
//!
//! - `Response: Success` → the variant's domain result
//! - `Response: Error` with a `Message` → [`AmiError::Protocol`]
//! - anything else → [`AmiError::Failed`]
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use ami_core::command::{CommandArgs, CommandExecutor};
//! use ami_core::config::AmiConfig;
//! use ami_core::correlation::{ActionIdGenerator, CorrelationRegistry};
//! use ami_core::transport::ChannelConnection;
//!
//! let registry = Arc::new(CorrelationRegistry::new());
//! let executor = CommandExecutor::with_defaults(
//!     registry.clone(),
//!     Arc::new(ActionIdGenerator::with_prefix("doc")),
//!     &AmiConfig::default(),
//! );
//! let (connection, mut outbound) = ChannelConnection::new();
//!
//! let args = CommandArgs::from_pairs([("chToTransfer", "SIP/214-0000012"), ("to", "220")]);
//! let id = executor.execute(&connection, "attendedTransfer", &args, Box::new(|_result| {}));
//!
//! assert!(id.is_some());
//! assert_eq!(registry.len(), 1);
//! assert_eq!(outbound.try_recv().unwrap().name(), "Atxfer");
//! ```

mod attended_transfer;
mod get_variable;
mod hangup;
mod ping;
mod redirect;

pub use attended_transfer::AttendedTransfer;
pub use get_variable::GetVariable;
pub use hangup::Hangup;
pub use ping::Ping;
pub use redirect::RedirectChannel;

use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::config::AmiConfig;
use crate::correlation::{
    panic_message, ActionId, ActionIdGenerator, CorrelationRegistry, PendingCommand, ResponseCallback, ResponseInterpreter,
};
use crate::error::{AmiError, AmiResult};
use crate::frame::{Action, Frame, ResponseStatus};
use crate::transport::AmiConnection;

/// Domain result of a successful command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandOutput {
    /// The action was accepted, nothing else to report
    Done,
    /// Answer to `Ping`
    Pong { timestamp: Option<String> },
    /// Answer to `Getvar`
    Variable { name: String, value: Option<String> },
}

/// Outcome delivered to a command callback
pub type CommandResult = AmiResult<CommandOutput>;

/// Flat argument set for a command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandArgs(BTreeMap<String, String>);

impl CommandArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// Build from a JSON object, scalars are stringified and nulls skipped
    pub fn from_json(value: &serde_json::Value) -> AmiResult<Self> {
        let object = value.as_object().ok_or_else(|| AmiError::InvalidArgument {
            name: "args",
            reason: "expected a JSON object".to_string(),
        })?;

        let mut args = BTreeMap::new();
        for (key, value) in object {
            let text = match value {
                serde_json::Value::Null => continue,
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Bool(b) => b.to_string(),
                serde_json::Value::Number(n) => n.to_string(),
                _ => {
                    return Err(AmiError::InvalidArgument {
                        name: "args",
                        reason: format!("field {} is not a scalar", key),
                    })
                }
            };
            args.insert(key.clone(), text);
        }
        Ok(Self(args))
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Value of `key` if present and non-blank
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
    }

    /// Value of `key`, or `MissingArgument`
    pub fn require(&self, key: &'static str) -> AmiResult<&str> {
        self.get(key).ok_or(AmiError::MissingArgument(key))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One AMI command variant
pub trait CommandHandler: Send + Sync {
    /// Name callers use to select this command
    fn name(&self) -> &'static str;

    /// Build the action body, without its action ID
    fn build(&self, args: &CommandArgs) -> AmiResult<Action>;

    /// Derive the outcome from the correlated response
    fn interpret(&self, frame: &Frame) -> CommandResult {
        interpret_status(frame, |_| Ok(CommandOutput::Done))
    }
}

/// Apply the common response status rule, delegating successes to `on_success`
pub fn interpret_status<F>(frame: &Frame, on_success: F) -> CommandResult
where
    F: FnOnce(&Frame) -> CommandResult,
{
    match frame.response_status() {
        Some(ResponseStatus::Success) => on_success(frame),
        Some(ResponseStatus::Error) => match frame.get_non_empty("message") {
            Some(message) => Err(AmiError::Protocol { message: message.to_string() }),
            None => Err(AmiError::Failed),
        },
        _ => Err(AmiError::Failed),
    }
}

/// Routes caller commands to their handlers and registers the responses
pub struct CommandExecutor {
    registry: Arc<CorrelationRegistry>,
    action_ids: Arc<ActionIdGenerator>,
    commands: HashMap<&'static str, Arc<dyn CommandHandler>>,
}

impl CommandExecutor {
    /// Executor with no commands registered
    pub fn new(registry: Arc<CorrelationRegistry>, action_ids: Arc<ActionIdGenerator>) -> Self {
        Self {
            registry,
            action_ids,
            commands: HashMap::new(),
        }
    }

    /// Executor with every built-in command registered
    pub fn with_defaults(
        registry: Arc<CorrelationRegistry>,
        action_ids: Arc<ActionIdGenerator>,
        config: &AmiConfig,
    ) -> Self {
        let mut executor = Self::new(registry, action_ids);
        executor.register_command(Arc::new(AttendedTransfer::new(config.transfer_context.clone())));
        executor.register_command(Arc::new(RedirectChannel::new(config.transfer_context.clone())));
        executor.register_command(Arc::new(Hangup));
        executor.register_command(Arc::new(Ping));
        executor.register_command(Arc::new(GetVariable));
        executor
    }

    /// Add a command, replacing any previous one with the same name
    pub fn register_command(&mut self, handler: Arc<dyn CommandHandler>) -> Option<Arc<dyn CommandHandler>> {
        let previous = self.commands.insert(handler.name(), handler);
        if let Some(previous) = &previous {
            warn!("Command {} registered twice, replacing", previous.name());
        }
        previous
    }

    pub fn has_command(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Names of the registered commands, sorted
    pub fn command_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.commands.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn registry(&self) -> &Arc<CorrelationRegistry> {
        &self.registry
    }

    /// Build, register and send `command`
    ///
    /// `callback` is invoked exactly once: with the interpreted response, or
    /// right away if the command is unknown, its arguments are unusable or
    /// the connection refuses the action. A panic while building or sending
    /// is reported as `AmiError::Internal`. Returns the action ID when the
    /// action was handed to the connection and is now pending.
    pub fn execute(
        &self,
        connection: &dyn AmiConnection,
        command: &str,
        args: &CommandArgs,
        callback: ResponseCallback,
    ) -> Option<ActionId> {
        let Some(handler) = self.commands.get(command).cloned() else {
            warn!("Unknown command {}", command);
            callback(Err(AmiError::UnknownCommand(command.to_string())));
            return None;
        };

        let built = panic::catch_unwind(AssertUnwindSafe(|| handler.build(args))).unwrap_or_else(|payload| {
            let reason = panic_message(&payload);
            error!("Building {} panicked: {}", command, reason);
            Err(AmiError::Internal(reason))
        });
        let mut action = match built {
            Ok(action) => action,
            Err(e) => {
                warn!("Cannot build {}: {}", command, e);
                callback(Err(e));
                return None;
            }
        };

        let action_id = self.action_ids.next(handler.name());
        action.set_action_id(action_id.clone());

        let interpreter: ResponseInterpreter = {
            let handler = handler.clone();
            Arc::new(move |frame: &Frame| handler.interpret(frame))
        };
        let pending = PendingCommand::new(handler.name(), interpreter, callback);
        if self.registry.register(action_id.clone(), pending).is_err() {
            // The registry already answered the callback
            return None;
        }

        debug!("Sending {} as {}", action.name(), action_id);
        let sent = panic::catch_unwind(AssertUnwindSafe(|| connection.send(&action))).unwrap_or_else(|payload| {
            let reason = panic_message(&payload);
            error!("Sending {} panicked: {}", command, reason);
            Err(AmiError::Internal(reason))
        });
        if let Err(e) = sent {
            error!("Failed to send {} ({}): {}", command, action_id, e);
            // A racing response may already have resolved it
            if let Some(pending) = self.registry.cancel(&action_id) {
                pending.complete(Err(e));
            }
            return None;
        }

        Some(action_id)
    }
}
