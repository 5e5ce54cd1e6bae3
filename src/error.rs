use std::error::Error;
use std::rc::Rc;

use crate::inner::State;

/// The error payload carried by a failed future.
///
/// Any `std::error::Error` type may be passed to `Promise::fail`; it is stored
/// behind an `Rc` so every matching catch handler can observe the same payload.
/// Typed catch handlers recover the concrete type by downcast.
pub type Fault = Rc<dyn Error + 'static>;

/// A future was used in a way its state no longer permits.
///
/// These are programming errors, not runtime conditions: the plain
/// `resolve`/`fail`/`set_progress` methods panic with the corresponding
/// variant's message, while the `try_*` twins return it for callers that
/// prefer `?`-style propagation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    /// `resolve` or `fail` was called on a future that had already settled.
    #[error("cannot settle `{name}`: future is already {state}")]
    DoubleSettlement { name: String, state: State },

    /// `set_progress` was called on a future that had already settled.
    #[error("cannot report progress on `{name}`: future is already {state}")]
    ProgressMisuse { name: String, state: State },
}

/// A ready-made error for owners that honor a cancellation request.
///
/// `Future::request_cancel` is advisory: it never settles anything itself.
/// An owner that decides to honor the request typically does so by failing
/// with this type, which downstream code can match with
/// `catch_err::<Canceled>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, thiserror::Error)]
#[error("operation was canceled")]
pub struct Canceled;
