//! Process-wide diagnostic hooks.
//!
//! Two observer lists are maintained per thread (execution is single-threaded,
//! so thread-local storage *is* process-wide storage for this crate):
//!
//! * transition observers, fired at every lifecycle edge of every future, and
//! * uncaught-error observers, consulted only when a future marked with
//!   [`Future::done`](crate::Future::done) fails with no matching catch
//!   handler — if at least one is installed the error is routed there instead
//!   of being re-raised.
//!
//! Both lists are inert until something subscribes. Subscribing returns a
//! [`HookHandle`]; observers fire in subscription order until the handle is
//! passed back through [`HookHandle::unsubscribe`].

use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug, Formatter};
use std::rc::Rc;

use crate::error::Fault;

/// Lifecycle edge reported to transition observers.
///
/// The `*BeforeCallbacks`/`*AfterCallbacks` pairs bracket the
/// handler-invocation phase of a settlement, so an observer can tell whether
/// some other code runs inside a settlement or around it.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Phase {
    Initialized,
    ResolvedBeforeCallbacks,
    ResolvedAfterCallbacks,
    FailedBeforeCallbacks,
    FailedAfterCallbacks,
}

/// Event passed to transition observers.
#[derive(Clone, Copy, Debug)]
pub struct Transition<'a> {
    pub phase: Phase,
    /// Diagnostic name of the future, if it was given one.
    pub name: Option<&'a str>,
}

type TransitionObserver = Rc<RefCell<dyn FnMut(&Transition<'_>)>>;
type UncaughtObserver = Rc<RefCell<dyn FnMut(&Fault)>>;

thread_local! {
    static TRANSITION_OBSERVERS: RefCell<Vec<(u64, TransitionObserver)>> =
        RefCell::new(Vec::new());
    static UNCAUGHT_OBSERVERS: RefCell<Vec<(u64, UncaughtObserver)>> =
        RefCell::new(Vec::new());
    static NEXT_HOOK_ID: Cell<u64> = const { Cell::new(0) };
}

fn next_id() -> u64 {
    NEXT_HOOK_ID.with(|id| {
        let n = id.get();
        id.set(n + 1);
        n
    })
}

#[derive(Clone, Copy, Debug)]
enum HookList {
    Transition,
    Uncaught,
}

/// Identifies one hook subscription.
pub struct HookHandle {
    list: HookList,
    id: u64,
}

impl HookHandle {
    /// Remove the observer this handle was returned for. Removing an observer
    /// that already fired this dispatch does not un-fire it.
    pub fn unsubscribe(self) {
        match self.list {
            HookList::Transition => TRANSITION_OBSERVERS.with(|l| {
                l.borrow_mut().retain(|(id, _)| *id != self.id);
            }),
            HookList::Uncaught => UNCAUGHT_OBSERVERS.with(|l| {
                l.borrow_mut().retain(|(id, _)| *id != self.id);
            }),
        }
    }
}

impl Debug for HookHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "HookHandle({:?}, {})", self.list, self.id)
    }
}

/// Subscribe to every future's lifecycle transitions.
///
/// ```
/// # use deferred::{future_promise, hooks};
/// # use deferred::hooks::Phase;
/// # use std::cell::RefCell;
/// # use std::rc::Rc;
/// let phases = Rc::new(RefCell::new(Vec::new()));
/// let handle = hooks::on_transition({
///     let phases = phases.clone();
///     move |t| phases.borrow_mut().push(t.phase)
/// });
///
/// let (_fut, prom) = future_promise();
/// prom.resolve(1);
///
/// assert_eq!(*phases.borrow(), [Phase::Initialized,
///                               Phase::ResolvedBeforeCallbacks,
///                               Phase::ResolvedAfterCallbacks]);
/// handle.unsubscribe();
/// ```
pub fn on_transition<F>(observer: F) -> HookHandle
where
    F: FnMut(&Transition<'_>) + 'static,
{
    let id = next_id();
    TRANSITION_OBSERVERS.with(|l| {
        l.borrow_mut().push((id, Rc::new(RefCell::new(observer))));
    });
    HookHandle { list: HookList::Transition, id }
}

/// Subscribe to failures that reach [`Future::done`](crate::Future::done)
/// without a matching catch handler. While at least one observer is
/// installed, such failures are routed here instead of being re-raised.
pub fn on_uncaught<F>(observer: F) -> HookHandle
where
    F: FnMut(&Fault) + 'static,
{
    let id = next_id();
    UNCAUGHT_OBSERVERS.with(|l| {
        l.borrow_mut().push((id, Rc::new(RefCell::new(observer))));
    });
    HookHandle { list: HookList::Uncaught, id }
}

// Dispatch runs over a snapshot so observers may subscribe or unsubscribe
// mid-flight; an observer re-entered by its own callback is skipped.
pub(crate) fn notify_transition(phase: Phase, name: Option<&str>) {
    let snapshot: Vec<TransitionObserver> =
        TRANSITION_OBSERVERS.with(|l| l.borrow().iter().map(|(_, f)| f.clone()).collect());
    if snapshot.is_empty() {
        return;
    }
    let event = Transition { phase, name };
    for observer in snapshot {
        if let Ok(mut f) = observer.try_borrow_mut() {
            f(&event);
        }
    }
}

/// Returns whether any observer was notified.
pub(crate) fn notify_uncaught(fault: &Fault) -> bool {
    let snapshot: Vec<UncaughtObserver> =
        UNCAUGHT_OBSERVERS.with(|l| l.borrow().iter().map(|(_, f)| f.clone()).collect());
    if snapshot.is_empty() {
        return false;
    }
    for observer in snapshot {
        if let Ok(mut f) = observer.try_borrow_mut() {
            f(fault);
        }
    }
    true
}
