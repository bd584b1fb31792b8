//! Asterisk Manager Interface correlation and dispatch
//!
//! AMI is a single text stream in both directions. Actions go out tagged
//! with an `ActionID`; their responses come back later on the same stream,
//! interleaved with unsolicited events. This crate pairs every response
//! with the callback of the action that caused it and routes every event to
//! the handler for its kind.
//!
//! ## Architecture
//!
//! ```text
//!  caller ──execute──▶ CommandExecutor ──register──▶ CorrelationRegistry
//!                            │                              ▲
//!                          send                          resolve
//!                            ▼                              │
//!                      AmiConnection              Dispatcher ◀── ConnectionEvent
//!                                                     │
//!                                               EventHandler ──▶ EventSink
//! ```
//!
//! - [`correlation`]: action ID generation and the pending registry
//! - [`command`]: command variants and the executor
//! - [`event`]: event variants and the downstream sink
//! - [`dispatcher`]: routing of inbound frames
//! - [`transport`], [`codec`], [`frame`]: connection plumbing and wire format
//! - [`client`]: the assembled facade

pub mod channel;
pub mod client;
pub mod codec;
pub mod command;
pub mod config;
pub mod correlation;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod frame;
pub mod logging;
pub mod transport;

pub use client::{AmiClient, AmiClientBuilder};
pub use command::{CommandArgs, CommandOutput, CommandResult};
pub use config::AmiConfig;
pub use correlation::{ActionId, CorrelationRegistry};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use error::{AmiError, AmiResult};
pub use event::ProxyEvent;
pub use frame::{Action, Frame};

/// Re-export of common types for easier use
pub mod prelude {
    pub use crate::{
        channel::{extract_extension, ExtensionId},
        command::{CommandArgs, CommandExecutor, CommandHandler, CommandOutput, CommandResult},
        config::AmiConfig,
        correlation::{ActionId, ActionIdGenerator, CorrelationRegistry, ResponseCallback},
        dispatcher::{DispatchOutcome, Dispatcher},
        error::{AmiError, AmiResult},
        event::{EventHandler, EventSink, ProxyEvent, SinkSlot},
        frame::{Action, Frame},
        transport::{AmiConnection, ChannelConnection, ConnectionEvent},
        AmiClient,
    };
}
