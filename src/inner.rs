use std::cell::RefCell;
use std::error::Error;
use std::fmt::{self, Debug, Display, Formatter};
use std::mem;
use std::rc::Rc;

use log::trace;

use crate::error::{Fault, StateError};
use crate::hooks::{self, Phase};

/// Lifecycle of a future.
///
/// A future settles at most once and never leaves a terminal state:
/// `Pending` may become `Resolved` or `Failed`, nothing else.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum State {
    Pending,
    Resolved,
    Failed,
}

impl State {
    pub fn is_pending(self) -> bool {
        self == State::Pending
    }
}

impl Display for State {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            State::Pending => "pending",
            State::Resolved => "resolved",
            State::Failed => "failed",
        })
    }
}

pub(crate) type Core<T> = Rc<RefCell<Inner<T>>>;

// One-shot handlers are drained out of the core on settlement; the repeatable
// ones (progress, cancellation) are individually shared so dispatch can run
// over a snapshot without holding the core borrow.
type ResolveHandler<T> = Box<dyn FnOnce(&Rc<T>)>;
type FinallyHandler = Box<dyn FnOnce()>;
type ProgressHandler = Rc<RefCell<dyn FnMut(f32)>>;
type CancelObserver = Rc<RefCell<dyn FnMut()>>;

/// One registered catch handler.
///
/// `matches` is the declared-type test, evaluated against the fault's runtime
/// type at dispatch. An entry with no body is the sentinel registered by
/// `Future::done`: it fires the unobserved-failure path when it is the only
/// matching entry left.
pub(crate) struct CatchEntry {
    pub(crate) matches: fn(&(dyn Error + 'static)) -> bool,
    pub(crate) run: Option<Box<dyn FnOnce(&Fault)>>,
}

pub(crate) fn match_any(_: &(dyn Error + 'static)) -> bool {
    true
}

pub(crate) fn match_type<E: Error + 'static>(err: &(dyn Error + 'static)) -> bool {
    err.is::<E>()
}

// Shared between a Future and its Promise.
pub(crate) struct Inner<T> {
    name: Option<String>,
    state: State,
    value: Option<Rc<T>>,
    error: Option<Fault>,
    progress: f32,
    resolve_handlers: Vec<ResolveHandler<T>>,
    catch_handlers: Vec<CatchEntry>,
    finally_handlers: Vec<FinallyHandler>,
    progress_handlers: Vec<ProgressHandler>,
    cancel_observers: Vec<(u64, CancelObserver)>,
    next_observer_id: u64,
}

impl<T> Inner<T> {
    pub(crate) fn state(&self) -> State {
        self.state
    }

    pub(crate) fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn value(&self) -> Option<Rc<T>> {
        self.value.clone()
    }

    pub(crate) fn error(&self) -> Option<Fault> {
        self.error.clone()
    }

    pub(crate) fn progress(&self) -> f32 {
        self.progress
    }

    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("<future>")
    }
}

impl<T: Debug> Debug for Inner<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Inner {{ name: {:?}, state: {:?}, value: {:?}, error: {:?}, progress: {} }}",
            self.name, self.state, self.value, self.error, self.progress
        )
    }
}

pub(crate) fn new_core<T>(name: Option<String>) -> Core<T> {
    hooks::notify_transition(Phase::Initialized, name.as_deref());
    Rc::new(RefCell::new(Inner {
        name,
        state: State::Pending,
        value: None,
        error: None,
        progress: 0.0,
        resolve_handlers: Vec::new(),
        catch_handlers: Vec::new(),
        finally_handlers: Vec::new(),
        progress_handlers: Vec::new(),
        cancel_observers: Vec::new(),
        next_observer_id: 0,
    }))
}

/// Transition to Resolved and run the settlement sequence: resolve handlers
/// in registration order, then finally handlers, with the transition
/// notifications bracketing the whole handler phase.
pub(crate) fn resolve<T>(core: &Core<T>, value: Rc<T>) -> Result<(), StateError> {
    let name = {
        let mut inner = core.borrow_mut();
        if !inner.state.is_pending() {
            return Err(StateError::DoubleSettlement {
                name: inner.label().to_owned(),
                state: inner.state,
            });
        }
        inner.state = State::Resolved;
        inner.value = Some(value.clone());
        trace!("`{}` resolved", inner.label());
        inner.name.clone()
    };

    hooks::notify_transition(Phase::ResolvedBeforeCallbacks, name.as_deref());

    let (handlers, finals) = release_handlers(core);
    for handler in handlers {
        handler(&value);
    }
    for handler in finals {
        handler();
    }

    hooks::notify_transition(Phase::ResolvedAfterCallbacks, name.as_deref());
    Ok(())
}

/// Transition to Failed and run the settlement sequence: every catch entry
/// whose declared type matches the fault's runtime type, in registration
/// order, then finally handlers. Matching is not first-match-wins; a general
/// and a specific handler both fire when both match, and a non-matching
/// handler never consumes the error for the others.
pub(crate) fn fail<T>(core: &Core<T>, fault: Fault) -> Result<(), StateError> {
    let name = {
        let mut inner = core.borrow_mut();
        if !inner.state.is_pending() {
            return Err(StateError::DoubleSettlement {
                name: inner.label().to_owned(),
                state: inner.state,
            });
        }
        inner.state = State::Failed;
        inner.error = Some(fault.clone());
        trace!("`{}` failed: {}", inner.label(), fault);
        inner.name.clone()
    };

    hooks::notify_transition(Phase::FailedBeforeCallbacks, name.as_deref());

    let (catches, finals) = release_catch_handlers(core);
    let matched = catches.iter().filter(|c| (c.matches)(&*fault)).count();
    for entry in catches {
        if !(entry.matches)(&*fault) {
            continue;
        }
        match entry.run {
            Some(run) => run(&fault),
            // The `done` sentinel: fires only when it is the sole match.
            None if matched == 1 => unobserved_failure(name.as_deref(), &fault),
            None => {}
        }
    }
    for handler in finals {
        handler();
    }

    hooks::notify_transition(Phase::FailedAfterCallbacks, name.as_deref());
    Ok(())
}

// The single release point: every handler collection leaves the core here,
// exactly once per settlement. The variant not being dispatched is dropped
// outright; futures may be retained indefinitely after settling, so nothing
// captured by a handler may stay reachable through the core.
fn release_handlers<T>(core: &Core<T>) -> (Vec<ResolveHandler<T>>, Vec<FinallyHandler>) {
    let mut inner = core.borrow_mut();
    inner.catch_handlers.clear();
    inner.progress_handlers.clear();
    inner.cancel_observers.clear();
    (
        mem::take(&mut inner.resolve_handlers),
        mem::take(&mut inner.finally_handlers),
    )
}

fn release_catch_handlers<T>(core: &Core<T>) -> (Vec<CatchEntry>, Vec<FinallyHandler>) {
    let mut inner = core.borrow_mut();
    inner.resolve_handlers.clear();
    inner.progress_handlers.clear();
    inner.cancel_observers.clear();
    (
        mem::take(&mut inner.catch_handlers),
        mem::take(&mut inner.finally_handlers),
    )
}

fn unobserved_failure(name: Option<&str>, fault: &Fault) {
    if !hooks::notify_uncaught(fault) {
        panic!(
            "unobserved failure in `{}`: {}",
            name.unwrap_or("<future>"),
            fault
        );
    }
}

/// Store a progress value and notify observers; only legal while Pending.
pub(crate) fn set_progress<T>(core: &Core<T>, value: f32) -> Result<(), StateError> {
    let snapshot = {
        let mut inner = core.borrow_mut();
        if !inner.state.is_pending() {
            return Err(StateError::ProgressMisuse {
                name: inner.label().to_owned(),
                state: inner.state,
            });
        }
        inner.progress = value;
        inner.progress_handlers.clone()
    };
    for handler in snapshot {
        if let Ok(mut f) = handler.try_borrow_mut() {
            f(value);
        }
    }
    Ok(())
}

/// Notify every cancellation observer, in subscription order. Never settles
/// anything; a no-op once the future has settled.
pub(crate) fn request_cancel<T>(core: &Core<T>) {
    let snapshot: Vec<CancelObserver> = {
        let inner = core.borrow();
        if !inner.state.is_pending() {
            return;
        }
        trace!("`{}` cancel requested", inner.label());
        inner.cancel_observers.iter().map(|(_, f)| f.clone()).collect()
    };
    for observer in snapshot {
        if let Ok(mut f) = observer.try_borrow_mut() {
            f();
        }
    }
}

/// Append a resolve handler, or run it now if already Resolved. On a Failed
/// future the handler is dropped: it will never be invoked, and nothing may
/// be retained past settlement.
pub(crate) fn add_resolve_handler<T>(core: &Core<T>, handler: ResolveHandler<T>) {
    let now = {
        let mut inner = core.borrow_mut();
        match inner.state {
            State::Pending => {
                inner.resolve_handlers.push(handler);
                None
            }
            State::Resolved => inner.value.clone().map(|v| (handler, v)),
            State::Failed => None,
        }
    };
    if let Some((handler, value)) = now {
        handler(&value);
    }
}

/// Append a catch entry, or dispatch it now if already Failed and matching.
pub(crate) fn add_catch_entry<T>(core: &Core<T>, entry: CatchEntry) {
    let now = {
        let mut inner = core.borrow_mut();
        match inner.state {
            State::Pending => {
                inner.catch_handlers.push(entry);
                None
            }
            State::Failed => inner
                .error
                .clone()
                .map(|fault| (entry, fault, inner.name.clone())),
            State::Resolved => None,
        }
    };
    if let Some((entry, fault, name)) = now {
        if (entry.matches)(&*fault) {
            match entry.run {
                Some(run) => run(&fault),
                // `done` after the failure: the handler lists were already
                // released, so nothing else can have matched.
                None => unobserved_failure(name.as_deref(), &fault),
            }
        }
    }
}

/// Append a finally handler, or run it now if already settled.
pub(crate) fn add_finally_handler<T>(core: &Core<T>, handler: FinallyHandler) {
    let now = {
        let mut inner = core.borrow_mut();
        match inner.state {
            State::Pending => {
                inner.finally_handlers.push(handler);
                None
            }
            State::Resolved | State::Failed => Some(handler),
        }
    };
    if let Some(handler) = now {
        handler();
    }
}

/// Append a progress handler; dropped once settled (progress can no longer
/// change).
pub(crate) fn add_progress_handler<T>(core: &Core<T>, handler: Box<dyn FnMut(f32)>) {
    let mut inner = core.borrow_mut();
    if inner.state.is_pending() {
        let shared: Rc<RefCell<dyn FnMut(f32)>> = Rc::new(RefCell::new(handler));
        inner.progress_handlers.push(shared);
    }
}

/// Append a cancellation observer; returns its id while Pending, `None` once
/// settled (the observer can never fire and is dropped).
pub(crate) fn add_cancel_observer<T>(core: &Core<T>, observer: Box<dyn FnMut()>) -> Option<u64> {
    let mut inner = core.borrow_mut();
    if !inner.state.is_pending() {
        return None;
    }
    let id = inner.next_observer_id;
    inner.next_observer_id += 1;
    let shared: Rc<RefCell<dyn FnMut()>> = Rc::new(RefCell::new(observer));
    inner.cancel_observers.push((id, shared));
    Some(id)
}

pub(crate) fn remove_cancel_observer<T>(core: &Core<T>, id: u64) {
    core.borrow_mut().cancel_observers.retain(|(i, _)| *i != id);
}
