//! Deferred values for callback-driven hosts
//! ==========================================
//!
//! Quick example:
//!
//! ```
//! # use deferred::future_promise;
//! let (fut, prom) = future_promise();
//!
//! // do something when the value is ready
//! let fut = fut.then(|v| v + 1);
//!
//! // ... later, whoever owns the work completes it
//! prom.resolve(123);
//!
//! assert_eq!(fut.value().as_deref(), Some(&124));
//! ```
//!
//! This crate implements a pair of concepts: [`Future`]s — read-only handles
//! onto a value that may not be determined yet — and [`Promise`]s — the
//! write-once side that settles it. It is built for environments that run on
//! callbacks rather than on an async runtime: embedded scripting hosts, game
//! loops, UI frameworks. A future here models "work that will complete
//! later"; it never creates concurrency of its own. There is no queue, no
//! scheduler and nothing ever blocks: "pending" only means that nobody has
//! settled the promise yet, and every handler runs synchronously, on the
//! caller's stack, inside the `resolve` or `fail` call that settles it.
//!
//! A future is settled exactly once: `Pending` becomes either `Resolved` or
//! `Failed`, terminally. Settling twice — and reporting progress after
//! settling — is a loud usage error rather than a silent no-op, so such bugs
//! surface at the offending call site (see [`StateError`]).
//!
//! Handlers come in four kinds, each invoked in registration order:
//! resolve handlers ([`Future::on_resolved`]), typed catch handlers
//! ([`Future::catch`], [`Future::catch_err`]), finally handlers
//! ([`Future::finally`]) and progress observers ([`Future::on_progress`]).
//! Catch dispatch is by runtime type, and every matching handler fires — a
//! catch-all and a specific handler can coexist. A failure nobody catches is
//! retained silently until the future is marked terminally observed with
//! [`Future::done`], at which point it is re-raised (or routed to the
//! process-wide [`hooks`]).
//!
//! Futures compose. [`Future::then`] maps the resolved value into a child
//! future; [`Future::chain`] continues into a future produced from the
//! value; [`all`] joins a group, [`any`] races one, and [`sequence`] /
//! [`fold`] / [`aggregate`] run future-producing steps strictly in order.
//! Each combinator forwards cancellation requests ([`Future::request_cancel`])
//! to whichever underlying future is currently active. Cancellation is
//! cooperative throughout: it notifies the owner ([`Promise::on_cancel`])
//! and settles nothing by itself.

mod error;
mod future;
pub mod hooks;
mod inner;
mod promise;
mod util;


pub use error::{Canceled, Fault, StateError};
pub use future::Future;
pub use inner::State;
pub use promise::{Promise, Subscription};
pub use util::{aggregate, all, any, fold, sequence};

use crate::inner::new_core;

/// Construct a `Future`/`Promise` pair.
///
/// The `Promise` is handed to whoever owns the deferred work, which must
/// eventually call [`Promise::resolve`] or [`Promise::fail`] exactly once;
/// the `Future` is handed to whoever wants the outcome. Both are cheap
/// handles onto the same core and may be cloned freely.
///
/// ```
/// # use deferred::future_promise;
/// let (fut, prom) = future_promise::<i32>();
/// assert!(fut.is_pending());
/// prom.resolve(1);
/// assert_eq!(fut.value().as_deref(), Some(&1));
/// ```
pub fn future_promise<T>() -> (Future<T>, Promise<T>) {
    pair(None)
}

/// As [`future_promise`], with a diagnostic name.
///
/// The name shows up in `Debug` output, in [`StateError`] messages, in log
/// lines and in [`hooks::Transition`] events; it has no behavioral effect.
pub fn future_promise_named<T>(name: impl Into<String>) -> (Future<T>, Promise<T>) {
    pair(Some(name.into()))
}

fn pair<T>(name: Option<String>) -> (Future<T>, Promise<T>) {
    let core = new_core(name);
    (Future::new(core.clone()), Promise::new(core))
}
