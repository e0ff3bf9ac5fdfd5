//! Messages traveling through the dispatcher queue.
use slog::Logger;
use std::sync::{Arc, Condvar, Mutex};

use crate::event::LogEvent;
use crate::handler::{Handler, HandlerList};
use crate::Result;

pub(crate) enum QueueMessage {
    /// Periodic wakeup from the awaker; carries no event.
    Tick,
    Event(LogEvent),
    AddHandler(Box<dyn Handler>),
    RemoveHandler(String),
    Action(HandlerAction),
    AsyncWait(WaitHandle),
    SyncWait(WaitHandle),
    /// The close sentinel: dispatched to handlers, then the worker stops.
    Close(LogEvent),
}

/// A barrier signaled once the worker has dispatched every event enqueued
/// before it.
#[derive(Debug, Clone)]
pub struct WaitHandle(Arc<WaitInner>);

#[derive(Debug)]
struct WaitInner {
    done: Mutex<bool>,
    cond: Condvar,
}

impl WaitHandle {
    pub(crate) fn new() -> Self {
        WaitHandle(Arc::new(WaitInner {
            done: Mutex::new(false),
            cond: Condvar::new(),
        }))
    }

    /// Returns `true` once the worker has passed this barrier.
    pub fn is_complete(&self) -> bool {
        *self.0.done.lock().unwrap()
    }

    /// Blocks until the worker passes this barrier.
    pub fn wait(&self) {
        let mut done = self.0.done.lock().unwrap();
        while !*done {
            done = self.0.cond.wait(done).unwrap();
        }
    }

    pub(crate) fn complete(&self) {
        *self.0.done.lock().unwrap() = true;
        self.0.cond.notify_all();
    }
}

/// An operation executed on the worker thread against the handler list.
pub(crate) struct HandlerAction {
    pub(crate) run: Box<dyn FnOnce(&Logger, &mut HandlerList) -> Result<()> + Send>,
    pub(crate) done: ActionHandle,
}

/// The completion handle of a queued action.
///
/// The action's result is handed out exactly once: the first
/// [`wait`](ActionHandle::wait) or successful
/// [`try_result`](ActionHandle::try_result) takes it, later calls report
/// plain success.
#[derive(Debug, Clone)]
pub struct ActionHandle(Arc<ActionInner>);

#[derive(Debug)]
struct ActionInner {
    state: Mutex<ActionState>,
    cond: Condvar,
}

#[derive(Debug)]
enum ActionState {
    Pending,
    Done(Result<()>),
    Taken,
}

impl ActionHandle {
    pub(crate) fn new() -> Self {
        ActionHandle(Arc::new(ActionInner {
            state: Mutex::new(ActionState::Pending),
            cond: Condvar::new(),
        }))
    }

    /// Takes the action's result, if it has already run.
    pub fn try_result(&self) -> Option<Result<()>> {
        let mut state = self.0.state.lock().unwrap();
        match std::mem::replace(&mut *state, ActionState::Taken) {
            ActionState::Pending => {
                *state = ActionState::Pending;
                None
            }
            ActionState::Done(result) => Some(result),
            ActionState::Taken => Some(Ok(())),
        }
    }

    /// Blocks until the action has run (or was cancelled by shutdown) and
    /// takes its result.
    pub fn wait(&self) -> Result<()> {
        let mut state = self.0.state.lock().unwrap();
        loop {
            match std::mem::replace(&mut *state, ActionState::Taken) {
                ActionState::Pending => {
                    *state = ActionState::Pending;
                    state = self.0.cond.wait(state).unwrap();
                }
                ActionState::Done(result) => return result,
                ActionState::Taken => return Ok(()),
            }
        }
    }

    pub(crate) fn complete(&self, r: Result<()>) {
        let mut state = self.0.state.lock().unwrap();
        if let ActionState::Pending = *state {
            *state = ActionState::Done(r);
        }
        self.0.cond.notify_all();
    }
}
