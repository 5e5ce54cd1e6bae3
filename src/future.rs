use std::cell::RefCell;
use std::error::Error;
use std::fmt::{self, Debug, Formatter};
use std::rc::Rc;

use crate::error::Fault;
use crate::future_promise;
use crate::inner::{self, CatchEntry, Core, State};

/// The read side of a deferred value.
///
/// A `Future` is a handle onto a shared core that its [`Promise`] will settle
/// exactly once, either with a value or with an error. Until then it is
/// `Pending`; handlers registered on it run synchronously, in registration
/// order, on whatever call settles the core.
///
/// Handles are cheap to clone and all observe the same core. They are
/// single-threaded (`!Send`): this crate models deferred completion, not
/// concurrency.
///
/// ```
/// # use deferred::future_promise;
/// let (fut, prom) = future_promise();
///
/// fut.on_resolved(|v: &i32| println!("got {}", v))
///    .finally(|| println!("settled"));
///
/// prom.resolve(123);
/// assert_eq!(fut.value().as_deref(), Some(&123));
/// ```
///
/// [`Promise`]: crate::Promise
pub struct Future<T> {
    pub(crate) core: Core<T>,
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Future { core: self.core.clone() }
    }
}

impl<T> Future<T> {
    pub(crate) fn new(core: Core<T>) -> Future<T> {
        Future { core }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> State {
        self.core.borrow().state()
    }

    pub fn is_pending(&self) -> bool {
        self.state().is_pending()
    }

    /// Diagnostic name, if one was given at construction.
    pub fn name(&self) -> Option<String> {
        self.core.borrow().name().map(str::to_owned)
    }

    /// The resolved value, shared; `None` unless `Resolved`.
    pub fn value(&self) -> Option<Rc<T>> {
        self.core.borrow().value()
    }

    /// The failure payload; `None` unless `Failed`.
    pub fn error(&self) -> Option<Fault> {
        self.core.borrow().error()
    }

    /// Last progress reported through the promise, default 0.
    pub fn progress(&self) -> f32 {
        self.core.borrow().progress()
    }

    /// Register a handler for the resolved value.
    ///
    /// Runs synchronously when the future resolves; if it already resolved,
    /// runs immediately. If the future failed (or later fails) the handler is
    /// never invoked.
    pub fn on_resolved<F>(&self, f: F) -> &Self
    where
        F: FnOnce(&T) + 'static,
    {
        inner::add_resolve_handler(&self.core, Box::new(move |v: &Rc<T>| f(&**v)));
        self
    }

    /// Register a handler for a failure of any type.
    ///
    /// All matching catch handlers fire on failure, in registration order;
    /// this one matches everything. If the future already failed, it runs
    /// immediately.
    pub fn catch<F>(&self, f: F) -> &Self
    where
        F: FnOnce(&Fault) + 'static,
    {
        inner::add_catch_entry(
            &self.core,
            CatchEntry { matches: inner::match_any, run: Some(Box::new(f)) },
        );
        self
    }

    /// Register a handler for failures of the concrete type `E`.
    ///
    /// The handler fires only if the fault's runtime type is `E`; a
    /// non-matching handler is skipped entirely and never consumes the error
    /// for the others. A general [`catch`](Future::catch) and a specific
    /// `catch_err` may both fire for the same failure.
    ///
    /// ```
    /// # use deferred::future_promise;
    /// # #[derive(Debug, thiserror::Error)]
    /// # #[error("bad input")]
    /// # struct BadInput;
    /// let (fut, prom) = future_promise::<u32>();
    ///
    /// fut.catch_err::<BadInput, _>(|e| println!("rejected: {}", e))
    ///    .catch(|e| println!("something failed: {}", e));
    ///
    /// prom.fail(BadInput); // both handlers fire, in registration order
    /// ```
    pub fn catch_err<E, F>(&self, f: F) -> &Self
    where
        E: Error + 'static,
        F: FnOnce(&E) + 'static,
    {
        inner::add_catch_entry(
            &self.core,
            CatchEntry {
                matches: inner::match_type::<E>,
                run: Some(Box::new(move |fault: &Fault| {
                    if let Some(err) = fault.downcast_ref::<E>() {
                        f(err);
                    }
                })),
            },
        );
        self
    }

    /// Register a handler invoked exactly once on settlement, either outcome,
    /// after the resolve/catch handlers. If already settled, runs
    /// immediately.
    pub fn finally<F>(&self, f: F) -> &Self
    where
        F: FnOnce() + 'static,
    {
        inner::add_finally_handler(&self.core, Box::new(f));
        self
    }

    /// Observe progress updates made through the promise.
    pub fn on_progress<F>(&self, f: F) -> &Self
    where
        F: FnMut(f32) + 'static,
    {
        inner::add_progress_handler(&self.core, Box::new(f));
        self
    }

    /// Mark this future as terminally observed.
    ///
    /// A failure is otherwise retained silently until something inspects it.
    /// After `done`, a failure with no other matching catch handler is
    /// re-raised synchronously as a panic out of the `fail` call — or routed
    /// to the process-wide hook if one is installed via
    /// [`hooks::on_uncaught`](crate::hooks::on_uncaught). Calling `done` on an
    /// already-failed future performs the same check immediately.
    pub fn done(&self) {
        inner::add_catch_entry(&self.core, CatchEntry { matches: inner::match_any, run: None });
    }

    /// Shorthand for registering a resolve handler and then
    /// [`done`](Future::done).
    pub fn done_with<F>(&self, f: F)
    where
        F: FnOnce(&T) + 'static,
    {
        self.on_resolved(f);
        self.done();
    }

    /// Ask the owner of this future to abandon the underlying operation.
    ///
    /// Purely advisory: notifies the promise's cancellation observers and
    /// nothing more. The owner may honor it (typically by failing with
    /// [`Canceled`](crate::Canceled)) or ignore it. A no-op once settled.
    pub fn request_cancel(&self) {
        inner::request_cancel(&self.core);
    }
}

impl<T: 'static> Future<T> {
    /// Construct an already-resolved `Future`.
    ///
    /// ```
    /// # use deferred::Future;
    /// let fut = Future::with_value(123);
    /// assert_eq!(fut.value().as_deref(), Some(&123));
    /// ```
    pub fn with_value(value: T) -> Future<T> {
        let (fut, prom) = future_promise();
        prom.resolve(value);
        fut
    }

    /// Construct an already-failed `Future`.
    pub fn with_error<E: Error + 'static>(error: E) -> Future<T> {
        let (fut, prom) = future_promise();
        prom.fail(error);
        fut
    }

    /// Map the resolved value into a new future.
    ///
    /// Returns a child future which resolves with `f(value)` when this one
    /// resolves. If this future fails instead, the error is forwarded into
    /// the child untouched, so typed catch handlers keep working downstream.
    /// Requesting cancellation of the child forwards the request to this
    /// future while it is still pending.
    ///
    /// ```
    /// # use deferred::future_promise;
    /// let (fut, prom) = future_promise();
    ///
    /// let doubled = fut.then(|v| v * 2);
    /// prom.resolve(21);
    /// assert_eq!(doubled.value().as_deref(), Some(&42));
    /// ```
    pub fn then<R, F>(&self, f: F) -> Future<R>
    where
        R: 'static,
        F: FnOnce(&T) -> R + 'static,
    {
        let (fut, prom) = future_promise();

        {
            let p = prom.clone();
            self.on_resolved(move |v| p.resolve(f(v)));
        }
        {
            let p = prom.clone();
            self.catch(move |fault| {
                if p.is_pending() {
                    p.fail_fault(fault.clone());
                }
            });
        }
        {
            let parent = self.clone();
            prom.on_cancel(move || {
                if parent.is_pending() {
                    parent.request_cancel();
                }
            });
        }

        fut
    }

    /// Sequentially continue into another future.
    ///
    /// When this future resolves, `f` is invoked once to produce the next
    /// future; its eventual outcome (value or error) is forwarded into the
    /// returned future. If this future fails, the error propagates directly
    /// and `f` is never invoked. Cancellation requests on the returned future
    /// always target the currently active step: the produced future while it
    /// is pending, otherwise this one.
    ///
    /// ```
    /// # use deferred::{future_promise, Future};
    /// let (fut, prom) = future_promise();
    ///
    /// let chained = fut.chain(|v: &i32| Future::with_value(v + 1));
    /// prom.resolve(1);
    /// assert_eq!(chained.value().as_deref(), Some(&2));
    /// ```
    pub fn chain<R, F>(&self, f: F) -> Future<R>
    where
        R: 'static,
        F: FnOnce(&T) -> Future<R> + 'static,
    {
        let (fut, prom) = future_promise();
        let active: Rc<RefCell<Option<Future<R>>>> = Rc::new(RefCell::new(None));

        {
            let p = prom.clone();
            let active = active.clone();
            self.on_resolved(move |v| {
                let next = f(v);
                *active.borrow_mut() = Some(next.clone());
                {
                    let p = p.clone();
                    next.catch(move |fault| {
                        if p.is_pending() {
                            p.fail_fault(fault.clone());
                        }
                    });
                }
                inner::add_resolve_handler(
                    &next.core,
                    Box::new(move |v: &Rc<R>| {
                        if p.is_pending() {
                            p.resolve_rc(v.clone());
                        }
                    }),
                );
            });
        }
        {
            let p = prom.clone();
            self.catch(move |fault| {
                if p.is_pending() {
                    p.fail_fault(fault.clone());
                }
            });
        }
        {
            let source = self.clone();
            prom.on_cancel(move || {
                let current = active.borrow().clone();
                match current {
                    Some(next) if next.is_pending() => next.request_cancel(),
                    _ => {
                        if source.is_pending() {
                            source.request_cancel();
                        }
                    }
                }
            });
        }

        fut
    }
}

impl<T: Debug> Debug for Future<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Future({:?})", *self.core.borrow())
    }
}
