//! Action/response correlation
//!
//! [`ActionIdGenerator`] issues the tags stamped on outgoing actions and
//! [`CorrelationRegistry`] holds the callbacks waiting for the responses
//! that carry them back.

mod action_id;
mod registry;

pub use action_id::{ActionId, ActionIdGenerator};
pub use registry::{
    CorrelationRegistry, PendingCommand, ResolveOutcome, ResponseCallback, ResponseInterpreter,
};
pub(crate) use registry::panic_message;
