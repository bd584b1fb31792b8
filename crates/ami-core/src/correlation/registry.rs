//! Pending action registry
//!
//! Pairs each outstanding [`ActionId`] with the callback waiting for its
//! outcome. Every registration leaves the registry exactly once, through
//! one of:
//!
//! - [`CorrelationRegistry::resolve`] when the matching response arrives
//! - [`CorrelationRegistry::fail_all`] on connection teardown
//! - [`CorrelationRegistry::expire_overdue`] when its deadline passes
//! - [`CorrelationRegistry::cancel`] when the caller takes it back (send failure)
//!
//! The entry is always removed under the lock and the callback invoked
//! after the lock is released, so a callback that issues further actions
//! cannot observe or re-resolve its own entry.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::command::CommandResult;
use crate::error::{AmiError, AmiResult};
use crate::frame::Frame;

use super::ActionId;

/// One-shot sink for a command outcome
pub type ResponseCallback = Box<dyn FnOnce(CommandResult) + Send + 'static>;

/// Turns the raw response frame into the command's outcome
pub type ResponseInterpreter = Arc<dyn Fn(&Frame) -> CommandResult + Send + Sync>;

/// Result of handing a response frame to the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// A pending callback was found and invoked
    Resolved,
    /// No registration with that action ID was pending
    Unmatched,
}

/// A registration awaiting its response
pub struct PendingCommand {
    command: String,
    interpreter: ResponseInterpreter,
    callback: ResponseCallback,
    registered_at: Instant,
    deadline: Option<Instant>,
}

impl PendingCommand {
    pub fn new(command: impl Into<String>, interpreter: ResponseInterpreter, callback: ResponseCallback) -> Self {
        Self {
            command: command.into(),
            interpreter,
            callback,
            registered_at: Instant::now(),
            deadline: None,
        }
    }

    /// Fail the registration with `Timeout` if no response arrives by `deadline`
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn age(&self) -> Duration {
        self.registered_at.elapsed()
    }

    /// Derive the outcome from a response frame
    ///
    /// A panicking interpreter is reported as `AmiError::Internal` so the
    /// caller still gets an answer.
    fn interpret(&self, frame: &Frame) -> CommandResult {
        match panic::catch_unwind(AssertUnwindSafe(|| (self.interpreter)(frame))) {
            Ok(result) => result,
            Err(payload) => {
                let reason = panic_message(&payload);
                error!("Response interpreter for {} panicked: {} (frame {})", self.command, reason, frame);
                Err(AmiError::Internal(reason))
            }
        }
    }

    /// Deliver the outcome, consuming the registration
    pub fn complete(self, result: CommandResult) {
        let command = self.command;
        let callback = self.callback;
        if panic::catch_unwind(AssertUnwindSafe(move || callback(result))).is_err() {
            error!("Callback for {} panicked", command);
        }
    }
}

impl fmt::Debug for PendingCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCommand")
            .field("command", &self.command)
            .field("registered_at", &self.registered_at)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

pub(crate) fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Owner of all pending action registrations for one connection
pub struct CorrelationRegistry {
    pending: Mutex<HashMap<ActionId, PendingCommand>>,
    default_timeout: Option<Duration>,
}

impl Default for CorrelationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelationRegistry {
    /// Registry without deadlines
    pub fn new() -> Self {
        Self::with_timeout(None)
    }

    /// Registry that applies `timeout` to registrations without their own deadline
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            default_timeout: timeout,
        }
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    /// Store a registration under `action_id`
    ///
    /// If the ID is already pending the existing registration is untouched,
    /// the rejected callback receives `DuplicateActionId` and the same error
    /// is returned.
    pub fn register(&self, action_id: ActionId, mut pending: PendingCommand) -> AmiResult<()> {
        if pending.deadline.is_none() {
            if let Some(timeout) = self.default_timeout {
                pending.deadline = Some(pending.registered_at + timeout);
            }
        }

        let rejected = {
            let mut map = self.pending.lock();
            if map.contains_key(&action_id) {
                Some(pending)
            } else {
                debug!("Registered {} for {}", action_id, pending.command);
                map.insert(action_id.clone(), pending);
                None
            }
        };

        match rejected {
            None => Ok(()),
            Some(pending) => {
                warn!("Action ID {} is already pending, rejecting {}", action_id, pending.command);
                let err = AmiError::DuplicateActionId(action_id);
                pending.complete(Err(err.clone()));
                Err(err)
            }
        }
    }

    /// Hand a response frame to the registration waiting for `action_id`
    ///
    /// An unknown ID is logged and ignored; this covers a second response
    /// for an already resolved action as well.
    pub fn resolve(&self, action_id: &ActionId, frame: &Frame) -> ResolveOutcome {
        let removed = self.pending.lock().remove(action_id);
        let Some(pending) = removed else {
            warn!("Unmatched action ID {}: {}", action_id, frame);
            return ResolveOutcome::Unmatched;
        };

        let result = pending.interpret(frame);
        debug!("Resolved {} for {} after {:?}: ok={}", action_id, pending.command, pending.age(), result.is_ok());
        pending.complete(result);
        ResolveOutcome::Resolved
    }

    /// Resolve a single registration with an error
    pub fn fail(&self, action_id: &ActionId, error: AmiError) -> bool {
        match self.cancel(action_id) {
            Some(pending) => {
                pending.complete(Err(error));
                true
            }
            None => false,
        }
    }

    /// Remove a registration without invoking its callback
    pub fn cancel(&self, action_id: &ActionId) -> Option<PendingCommand> {
        self.pending.lock().remove(action_id)
    }

    /// Fail every pending registration with `ConnectionLost(reason)`
    ///
    /// Returns how many callbacks were invoked. Registrations made while
    /// the callbacks run are left pending.
    pub fn fail_all(&self, reason: &str) -> usize {
        let drained: Vec<(ActionId, PendingCommand)> = self.pending.lock().drain().collect();
        if drained.is_empty() {
            return 0;
        }

        info!("Failing {} pending actions: {}", drained.len(), reason);
        let count = drained.len();
        for (action_id, pending) in drained {
            debug!("Failing {} ({})", action_id, pending.command);
            pending.complete(Err(AmiError::ConnectionLost { reason: reason.to_string() }));
        }
        count
    }

    /// Fail every registration whose deadline is at or before `now`
    pub fn expire_overdue(&self, now: Instant) -> usize {
        let expired: Vec<(ActionId, PendingCommand)> = {
            let mut map = self.pending.lock();
            let overdue: Vec<ActionId> = map
                .iter()
                .filter(|(_, p)| p.deadline.is_some_and(|d| d <= now))
                .map(|(id, _)| id.clone())
                .collect();
            overdue
                .into_iter()
                .filter_map(|id| map.remove(&id).map(|p| (id, p)))
                .collect()
        };

        let count = expired.len();
        for (action_id, pending) in expired {
            warn!("No response for {} ({}) within deadline", action_id, pending.command);
            pending.complete(Err(AmiError::Timeout(action_id)));
        }
        count
    }

    /// Periodically expire overdue registrations
    ///
    /// The task holds only a weak reference and stops once the registry is
    /// dropped.
    pub fn spawn_reaper(registry: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(registry);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(registry) = weak.upgrade() else {
                    debug!("Registry dropped, reaper exiting");
                    break;
                };
                let expired = registry.expire_overdue(Instant::now());
                if expired > 0 {
                    debug!("Reaper expired {} pending actions", expired);
                }
            }
        })
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    pub fn contains(&self, action_id: &ActionId) -> bool {
        self.pending.lock().contains_key(action_id)
    }

    /// Snapshot of the pending action IDs
    pub fn pending_ids(&self) -> Vec<ActionId> {
        self.pending.lock().keys().cloned().collect()
    }
}

impl fmt::Debug for CorrelationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelationRegistry")
            .field("pending", &self.len())
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

impl Drop for CorrelationRegistry {
    fn drop(&mut self) {
        let remaining = self.fail_all("registry dropped");
        if remaining > 0 {
            warn!("Registry dropped with {} pending actions", remaining);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandOutput;
    use crate::frame::ResponseStatus;

    type Calls = Arc<Mutex<Vec<CommandResult>>>;

    fn spy() -> (Calls, ResponseCallback) {
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        (calls, Box::new(move |result| sink.lock().push(result)))
    }

    fn status_interpreter() -> ResponseInterpreter {
        Arc::new(|frame: &Frame| match frame.response_status() {
            Some(ResponseStatus::Success) => Ok(CommandOutput::Done),
            _ => Err(AmiError::Failed),
        })
    }

    fn pending(callback: ResponseCallback) -> PendingCommand {
        PendingCommand::new("test", status_interpreter(), callback)
    }

    fn success(id: &str) -> Frame {
        Frame::from_pairs([("Response", "Success"), ("ActionID", id)])
    }

    #[test]
    fn test_resolve_invokes_only_matching_callback() {
        let registry = CorrelationRegistry::new();
        let spies: Vec<Calls> = (0..5)
            .map(|i| {
                let (calls, cb) = spy();
                registry.register(ActionId::from(format!("id-{}", i)), pending(cb)).unwrap();
                calls
            })
            .collect();

        assert_eq!(registry.resolve(&ActionId::from("id-3"), &success("id-3")), ResolveOutcome::Resolved);

        for (i, calls) in spies.iter().enumerate() {
            let expected = if i == 3 { 1 } else { 0 };
            assert_eq!(calls.lock().len(), expected, "callback {}", i);
        }
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn test_second_resolve_is_noop() {
        let registry = CorrelationRegistry::new();
        let (calls, cb) = spy();
        let id = ActionId::from("once");
        registry.register(id.clone(), pending(cb)).unwrap();

        assert_eq!(registry.resolve(&id, &success("once")), ResolveOutcome::Resolved);
        assert_eq!(registry.resolve(&id, &success("once")), ResolveOutcome::Unmatched);

        assert_eq!(*calls.lock(), vec![Ok(CommandOutput::Done)]);
        assert!(!registry.contains(&id));
    }

    #[test]
    fn test_resolve_unknown_id_is_unmatched() {
        let registry = CorrelationRegistry::new();
        let (calls, cb) = spy();
        registry.register(ActionId::from("known"), pending(cb)).unwrap();

        assert_eq!(registry.resolve(&ActionId::from("never"), &success("never")), ResolveOutcome::Unmatched);
        assert!(calls.lock().is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = CorrelationRegistry::new();
        let (first, cb1) = spy();
        let (second, cb2) = spy();
        let id = ActionId::from("dup");

        registry.register(id.clone(), pending(cb1)).unwrap();
        let err = registry.register(id.clone(), pending(cb2)).unwrap_err();

        assert_eq!(err, AmiError::DuplicateActionId(id.clone()));
        assert_eq!(*second.lock(), vec![Err(AmiError::DuplicateActionId(id.clone()))]);
        assert!(first.lock().is_empty());

        registry.resolve(&id, &success("dup"));
        assert_eq!(first.lock().len(), 1);
        assert_eq!(second.lock().len(), 1);
    }

    #[test]
    fn test_fail_all_resolves_everything_once() {
        let registry = CorrelationRegistry::new();
        let spies: Vec<Calls> = (0..7)
            .map(|i| {
                let (calls, cb) = spy();
                registry.register(ActionId::from(format!("k-{}", i)), pending(cb)).unwrap();
                calls
            })
            .collect();

        assert_eq!(registry.fail_all("socket closed"), 7);
        assert!(registry.is_empty());
        assert_eq!(registry.fail_all("again"), 0);

        for calls in spies {
            assert_eq!(
                *calls.lock(),
                vec![Err(AmiError::ConnectionLost { reason: "socket closed".to_string() })]
            );
        }
    }

    #[test]
    fn test_callback_may_register_while_resolving() {
        let registry = Arc::new(CorrelationRegistry::new());
        let (inner_calls, inner_cb) = spy();
        let reg = registry.clone();

        let outer: ResponseCallback = Box::new(move |_| {
            reg.register(ActionId::from("follow-up"), pending(inner_cb)).unwrap();
        });
        registry.register(ActionId::from("first"), pending(outer)).unwrap();

        registry.resolve(&ActionId::from("first"), &success("first"));
        assert!(registry.contains(&ActionId::from("follow-up")));
        assert!(inner_calls.lock().is_empty());
    }

    #[test]
    fn test_panicking_interpreter_still_answers() {
        let registry = CorrelationRegistry::new();
        let (calls, cb) = spy();
        let interpreter: ResponseInterpreter = Arc::new(|_| panic!("bad frame"));
        registry
            .register(ActionId::from("p"), PendingCommand::new("broken", interpreter, cb))
            .unwrap();

        assert_eq!(registry.resolve(&ActionId::from("p"), &success("p")), ResolveOutcome::Resolved);
        assert_eq!(*calls.lock(), vec![Err(AmiError::Internal("bad frame".to_string()))]);
    }

    #[test]
    fn test_panicking_callback_does_not_block_fail_all() {
        let registry = CorrelationRegistry::new();
        registry
            .register(ActionId::from("boom"), pending(Box::new(|_| panic!("callback fault"))))
            .unwrap();
        let (calls, cb) = spy();
        registry.register(ActionId::from("fine"), pending(cb)).unwrap();

        assert_eq!(registry.fail_all("eof"), 2);
        assert_eq!(calls.lock().len(), 1);
    }

    #[test]
    fn test_cancel_hands_back_without_invoking() {
        let registry = CorrelationRegistry::new();
        let (calls, cb) = spy();
        registry.register(ActionId::from("c"), pending(cb)).unwrap();

        let taken = registry.cancel(&ActionId::from("c")).unwrap();
        assert_eq!(taken.command(), "test");
        assert!(calls.lock().is_empty());
        assert!(registry.is_empty());

        taken.complete(Err(AmiError::Transmission("closed".into())));
        assert_eq!(calls.lock().len(), 1);
    }

    #[test]
    fn test_expire_overdue() {
        let registry = CorrelationRegistry::with_timeout(Some(Duration::from_secs(5)));
        let (late, cb1) = spy();
        let (patient, cb2) = spy();
        let now = Instant::now();

        registry.register(ActionId::from("late"), pending(cb1)).unwrap();
        registry
            .register(ActionId::from("patient"), pending(cb2).with_deadline(now + Duration::from_secs(60)))
            .unwrap();

        assert_eq!(registry.expire_overdue(now + Duration::from_secs(1)), 0);
        assert_eq!(registry.expire_overdue(now + Duration::from_secs(10)), 1);

        assert_eq!(*late.lock(), vec![Err(AmiError::Timeout(ActionId::from("late")))]);
        assert!(patient.lock().is_empty());
        assert!(registry.contains(&ActionId::from("patient")));
    }

    #[test]
    fn test_drop_fails_pending() {
        let (calls, cb) = spy();
        {
            let registry = CorrelationRegistry::new();
            registry.register(ActionId::from("d"), pending(cb)).unwrap();
        }
        assert_eq!(
            *calls.lock(),
            vec![Err(AmiError::ConnectionLost { reason: "registry dropped".to_string() })]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_expires_in_background() {
        let registry = Arc::new(CorrelationRegistry::with_timeout(Some(Duration::from_secs(3))));
        let (calls, cb) = spy();
        registry.register(ActionId::from("slow"), pending(cb)).unwrap();

        let reaper = CorrelationRegistry::spawn_reaper(&registry, Duration::from_millis(500));
        tokio::time::sleep(Duration::from_secs(4)).await;

        assert_eq!(calls.lock().len(), 1);
        assert!(registry.is_empty());

        drop(registry);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(reaper.is_finished());
    }

    #[test]
    fn test_concurrent_register_and_fail_all() {
        let registry = Arc::new(CorrelationRegistry::new());
        let total = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let workers: Vec<_> = (0..4)
            .map(|t| {
                let registry = registry.clone();
                let total = total.clone();
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let total = total.clone();
                        let cb: ResponseCallback = Box::new(move |_| {
                            total.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                        });
                        registry.register(ActionId::from(format!("{}-{}", t, i)), pending(cb)).unwrap();
                    }
                })
            })
            .collect();

        let mut failed = 0;
        for _ in 0..20 {
            failed += registry.fail_all("flap");
        }
        for worker in workers {
            worker.join().unwrap();
        }
        failed += registry.fail_all("final");

        assert_eq!(failed, 800);
        assert_eq!(total.load(std::sync::atomic::Ordering::SeqCst), 800);
    }
}
