use std::error::Error;
use std::fmt::{self, Debug, Formatter};
use std::rc::Rc;

use crate::error::{Fault, StateError};
use crate::inner::{self, Core, State};

/// The write side of a deferred value.
///
/// A `Promise` is held by whoever owns the underlying operation; that owner
/// is responsible for calling [`resolve`](Promise::resolve) or
/// [`fail`](Promise::fail) exactly once. Settling a second time is a
/// programming error and is raised loudly: the plain methods panic, the
/// `try_*` twins return [`StateError`].
///
/// The owner may also report progress while pending, and may subscribe to
/// cancellation requests coming from the [`Future`](crate::Future) side. The
/// core never initiates work itself: a promise dropped without settling
/// simply leaves its future pending forever.
pub struct Promise<T> {
    pub(crate) core: Core<T>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Promise { core: self.core.clone() }
    }
}

impl<T> Promise<T> {
    pub(crate) fn new(core: Core<T>) -> Promise<T> {
        Promise { core }
    }

    pub fn state(&self) -> State {
        self.core.borrow().state()
    }

    pub fn is_pending(&self) -> bool {
        self.state().is_pending()
    }

    pub fn name(&self) -> Option<String> {
        self.core.borrow().name().map(str::to_owned)
    }

    /// Last progress value reported, default 0.
    pub fn progress(&self) -> f32 {
        self.core.borrow().progress()
    }

    /// Settle with a value, running all resolve handlers and then all finally
    /// handlers synchronously before returning.
    ///
    /// # Panics
    ///
    /// If the future has already settled.
    pub fn resolve(&self, value: T) {
        if let Err(err) = self.try_resolve(value) {
            panic!("{}", err);
        }
    }

    /// Like [`resolve`](Promise::resolve), but reports double settlement as
    /// an error instead of panicking. The value is dropped on error.
    pub fn try_resolve(&self, value: T) -> Result<(), StateError> {
        inner::resolve(&self.core, Rc::new(value))
    }

    pub(crate) fn resolve_rc(&self, value: Rc<T>) {
        if let Err(err) = inner::resolve(&self.core, value) {
            panic!("{}", err);
        }
    }

    /// Settle with an error, running every catch handler whose declared type
    /// matches, then all finally handlers, synchronously before returning.
    ///
    /// # Panics
    ///
    /// If the future has already settled. Also re-raises the error itself if
    /// the future was marked [`done`](crate::Future::done), no other catch
    /// handler matches, and no uncaught-error hook is installed.
    pub fn fail<E: Error + 'static>(&self, error: E) {
        self.fail_fault(Rc::new(error));
    }

    /// Like [`fail`](Promise::fail), but reports double settlement as an
    /// error instead of panicking.
    pub fn try_fail<E: Error + 'static>(&self, error: E) -> Result<(), StateError> {
        self.try_fail_fault(Rc::new(error))
    }

    /// [`fail`](Promise::fail) with an already-shared fault. This is how an
    /// error observed on one future is forwarded into another without
    /// re-wrapping, preserving its runtime type for typed catch handlers.
    pub fn fail_fault(&self, fault: Fault) {
        if let Err(err) = self.try_fail_fault(fault) {
            panic!("{}", err);
        }
    }

    pub fn try_fail_fault(&self, fault: Fault) -> Result<(), StateError> {
        inner::fail(&self.core, fault)
    }

    /// Report progress in `[0, 1]`, notifying progress observers in
    /// registration order.
    ///
    /// # Panics
    ///
    /// If the future has already settled; progress is only meaningful while
    /// pending.
    pub fn set_progress(&self, value: f32) {
        if let Err(err) = self.try_set_progress(value) {
            panic!("{}", err);
        }
    }

    pub fn try_set_progress(&self, value: f32) -> Result<(), StateError> {
        inner::set_progress(&self.core, value)
    }

    /// Subscribe to cancellation requests from the future side.
    ///
    /// The observer runs synchronously each time
    /// [`request_cancel`](crate::Future::request_cancel) is called while the
    /// future is pending. Observers are released on settlement; the returned
    /// handle removes one early.
    pub fn on_cancel<F>(&self, observer: F) -> Subscription
    where
        F: FnMut() + 'static,
        T: 'static,
    {
        match inner::add_cancel_observer(&self.core, Box::new(observer)) {
            Some(id) => {
                let weak = Rc::downgrade(&self.core);
                Subscription::active(move || {
                    if let Some(core) = weak.upgrade() {
                        inner::remove_cancel_observer(&core, id);
                    }
                })
            }
            None => Subscription::inert(),
        }
    }
}

impl<T: Debug> Debug for Promise<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Promise({:?})", *self.core.borrow())
    }
}

/// Removable handle for one cancellation observer.
///
/// Returned by [`Promise::on_cancel`]. Dropping the handle leaves the
/// observer in place; call [`unsubscribe`](Subscription::unsubscribe) to
/// remove it before settlement does.
pub struct Subscription {
    remove: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    fn active<F: FnOnce() + 'static>(remove: F) -> Subscription {
        Subscription { remove: Some(Box::new(remove)) }
    }

    // Registration on an already-settled future: there is nothing to remove.
    fn inert() -> Subscription {
        Subscription { remove: None }
    }

    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl Debug for Subscription {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Subscription({})",
            if self.remove.is_some() { "active" } else { "inert" }
        )
    }
}
