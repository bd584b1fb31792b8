//! AMI client facade
//!
//! Assembles the pieces once: one registry, one action ID generator, the
//! command table, the dispatcher with its event handlers, the outbound
//! connection and the downstream sink.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ami_core::{AmiClient, AmiConfig, CommandArgs};
//! use ami_core::transport::{spawn_action_writer, spawn_frame_reader, ChannelConnection};
//!
//! # async fn example(stream: tokio::net::TcpStream) -> ami_core::AmiResult<()> {
//! let (connection, outbound) = ChannelConnection::new();
//! let (events_tx, _events_rx) = tokio::sync::mpsc::unbounded_channel();
//! let client = AmiClient::builder(AmiConfig::default())
//!     .connection(Arc::new(connection))
//!     .sink(Arc::new(events_tx))
//!     .build()?;
//!
//! let (read_half, write_half) = stream.into_split();
//! let (frames_tx, frames_rx) = tokio::sync::mpsc::channel(client.config().event_channel_capacity);
//! spawn_frame_reader(read_half, frames_tx);
//! spawn_action_writer(write_half, outbound);
//! client.spawn_dispatcher(frames_rx);
//! client.spawn_reaper();
//!
//! let args = CommandArgs::from_pairs([("chToTransfer", "SIP/214-0000012"), ("to", "220")]);
//! client.call("attendedTransfer", &args).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::command::{CommandArgs, CommandExecutor, CommandHandler, CommandResult};
use crate::config::AmiConfig;
use crate::correlation::{ActionId, ActionIdGenerator, CorrelationRegistry, ResponseCallback};
use crate::dispatcher::Dispatcher;
use crate::error::{AmiError, AmiResult};
use crate::event::{EventHandler, EventSink, SinkSlot};
use crate::transport::{AmiConnection, ConnectionEvent};

type EventHandlerFactory = Box<dyn FnOnce(&Arc<SinkSlot>) -> Arc<dyn EventHandler>>;

/// Builder for [`AmiClient`]
pub struct AmiClientBuilder {
    config: AmiConfig,
    connection: Option<Arc<dyn AmiConnection>>,
    sink: Option<Arc<dyn EventSink>>,
    commands: Vec<Arc<dyn CommandHandler>>,
    event_handlers: Vec<EventHandlerFactory>,
}

impl AmiClientBuilder {
    /// Outbound connection actions are sent on (required)
    pub fn connection(mut self, connection: Arc<dyn AmiConnection>) -> Self {
        self.connection = Some(connection);
        self
    }

    /// Downstream sink for domain events; may instead be attached later
    pub fn sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Register an extra command next to the built-in ones
    pub fn command(mut self, handler: Arc<dyn CommandHandler>) -> Self {
        self.commands.push(handler);
        self
    }

    /// Register an extra event handler built around the shared sink slot
    pub fn event_handler<F>(mut self, factory: F) -> Self
    where
        F: FnOnce(&Arc<SinkSlot>) -> Arc<dyn EventHandler> + 'static,
    {
        self.event_handlers.push(Box::new(factory));
        self
    }

    pub fn build(self) -> AmiResult<AmiClient> {
        self.config.validate()?;
        let connection = self
            .connection
            .ok_or_else(|| AmiError::Config("AMI client requires a connection".into()))?;

        let registry = Arc::new(CorrelationRegistry::with_timeout(self.config.response_timeout));
        let action_ids = Arc::new(match &self.config.action_id_prefix {
            Some(prefix) => ActionIdGenerator::with_prefix(prefix.clone()),
            None => ActionIdGenerator::new(),
        });

        let mut executor = CommandExecutor::with_defaults(registry.clone(), action_ids, &self.config);
        for handler in self.commands {
            executor.register_command(handler);
        }

        let slot = Arc::new(match self.sink {
            Some(sink) => SinkSlot::attached(sink),
            None => SinkSlot::new(),
        });
        let mut dispatcher = Dispatcher::with_defaults(registry.clone(), slot.clone());
        for factory in self.event_handlers {
            dispatcher.register_handler(factory(&slot));
        }

        info!(
            "AMI client ready: commands={:?}, response_timeout={:?}",
            executor.command_names(),
            self.config.response_timeout
        );

        Ok(AmiClient {
            config: self.config,
            registry,
            executor,
            dispatcher: Arc::new(dispatcher),
            connection,
        })
    }
}

/// Entry point for issuing commands and consuming AMI traffic
pub struct AmiClient {
    config: AmiConfig,
    registry: Arc<CorrelationRegistry>,
    executor: CommandExecutor,
    dispatcher: Arc<Dispatcher>,
    connection: Arc<dyn AmiConnection>,
}

impl AmiClient {
    pub fn builder(config: AmiConfig) -> AmiClientBuilder {
        AmiClientBuilder {
            config,
            connection: None,
            sink: None,
            commands: Vec::new(),
            event_handlers: Vec::new(),
        }
    }

    pub fn config(&self) -> &AmiConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<CorrelationRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn pending_count(&self) -> usize {
        self.registry.len()
    }

    /// Attach the downstream sink if the builder did not
    pub fn attach(&self, sink: Arc<dyn EventSink>) -> AmiResult<()> {
        self.dispatcher.attach(sink)
    }

    /// Send `command`; `callback` receives its outcome exactly once
    pub fn execute(&self, command: &str, args: &CommandArgs, callback: ResponseCallback) -> Option<ActionId> {
        self.executor.execute(self.connection.as_ref(), command, args, callback)
    }

    /// Like [`execute`](Self::execute) for a JSON request of the form
    /// `{"command": "attendedTransfer", "chToTransfer": "...", "to": "..."}`
    pub fn execute_json(&self, request: &serde_json::Value, callback: ResponseCallback) -> Option<ActionId> {
        let command = match request.get("command").and_then(|c| c.as_str()) {
            Some(command) => command.to_string(),
            None => {
                callback(Err(AmiError::MissingArgument("command")));
                return None;
            }
        };

        let mut fields = request.clone();
        if let Some(object) = fields.as_object_mut() {
            object.remove("command");
        }
        match CommandArgs::from_json(&fields) {
            Ok(args) => self.execute(&command, &args, callback),
            Err(e) => {
                callback(Err(e));
                None
            }
        }
    }

    /// Send `command` and wait for its outcome
    pub async fn call(&self, command: &str, args: &CommandArgs) -> CommandResult {
        let (tx, rx) = oneshot::channel();
        self.execute(
            command,
            args,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
        rx.await
            .unwrap_or_else(|_| Err(AmiError::Internal("command callback dropped".into())))
    }

    /// Run the dispatcher over `events` on a background task
    pub fn spawn_dispatcher(&self, events: mpsc::Receiver<ConnectionEvent>) -> JoinHandle<()> {
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move { dispatcher.run(events).await })
    }

    /// Start expiring overdue commands; `None` when no timeout is configured
    pub fn spawn_reaper(&self) -> Option<JoinHandle<()>> {
        self.config.response_timeout?;
        debug!("Starting reaper every {:?}", self.config.reaper_interval);
        Some(CorrelationRegistry::spawn_reaper(&self.registry, self.config.reaper_interval))
    }

    /// Fail everything still pending, e.g. before reconnecting
    pub fn shutdown(&self, reason: &str) -> usize {
        self.registry.fail_all(reason)
    }
}
