//! Combinators over groups of futures: parallel join ([`all`]), parallel
//! race ([`any`]), and ordered sequencing ([`sequence`], [`fold`],
//! [`aggregate`]).
//!
//! "Parallel" here means only that the inputs are all outstanding at once;
//! execution stays single-threaded and synchronous. Every combinator forwards
//! an input's failure into its result only after checking the result is still
//! pending, so late settlements of sibling inputs are ignored rather than
//! tripping the double-settlement check.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use crate::future_promise;
use crate::{Future, Promise};

/// Join a group of futures: resolves once every input has resolved, fails as
/// soon as any input fails (first failure wins).
///
/// An empty input resolves immediately. Completion is only checked once every
/// input has been subscribed, so a prefix of inputs resolving synchronously
/// during registration cannot settle the result early.
///
/// The result's progress is the arithmetic mean of the inputs' reported
/// progress, each starting at 0. Requesting cancellation of the result
/// broadcasts the request to every input still pending.
///
/// ```
/// # use deferred::{all, future_promise};
/// let (a, pa) = future_promise();
/// let (b, pb) = future_promise();
///
/// let joined = all([a, b]);
/// pa.resolve(1);
/// assert!(joined.is_pending());
/// pb.resolve(2);
/// assert!(!joined.is_pending());
/// ```
pub fn all<T, I>(futures: I) -> Future<()>
where
    T: 'static,
    I: IntoIterator<Item = Future<T>>,
{
    let (fut, prom) = future_promise();

    let total = Rc::new(Cell::new(0usize));
    let resolved = Rc::new(Cell::new(0usize));
    // Set only after every input is subscribed; see module docs.
    let finished = Rc::new(Cell::new(false));
    let reported: Rc<RefCell<Vec<f32>>> = Rc::new(RefCell::new(Vec::new()));

    let mut inputs = Vec::new();
    for input in futures {
        let index = inputs.len();
        total.set(total.get() + 1);
        reported.borrow_mut().push(0.0);

        {
            let total = total.clone();
            let resolved = resolved.clone();
            let finished = finished.clone();
            let p = prom.clone();
            input.on_resolved(move |_| {
                resolved.set(resolved.get() + 1);
                if finished.get() && resolved.get() == total.get() && p.is_pending() {
                    p.resolve(());
                }
            });
        }
        {
            let p = prom.clone();
            input.catch(move |fault| {
                if p.is_pending() {
                    p.fail_fault(fault.clone());
                }
            });
        }
        {
            let reported = reported.clone();
            let p = prom.clone();
            input.on_progress(move |value| {
                reported.borrow_mut()[index] = value;
                if p.is_pending() {
                    let table = reported.borrow();
                    let mean = table.iter().sum::<f32>() / table.len() as f32;
                    drop(table);
                    p.set_progress(mean);
                }
            });
        }

        inputs.push(input);
    }

    finished.set(true);
    if prom.is_pending() && resolved.get() == total.get() {
        prom.resolve(());
    }

    prom.on_cancel(move || {
        for input in &inputs {
            if input.is_pending() {
                input.request_cancel();
            }
        }
    });

    fut
}

/// Race a group of futures: settles with whichever input settles first,
/// resolution or failure alike. Later settlements are observed but ignored.
///
/// An empty input resolves immediately. Requesting cancellation of the
/// result broadcasts the request to every input still pending.
pub fn any<T, I>(futures: I) -> Future<()>
where
    T: 'static,
    I: IntoIterator<Item = Future<T>>,
{
    let (fut, prom) = future_promise();

    // First-settlement latch; everything after the first is a no-op.
    let settled = Rc::new(Cell::new(false));

    let mut inputs = Vec::new();
    for input in futures {
        {
            let settled = settled.clone();
            let p = prom.clone();
            input.on_resolved(move |_| {
                if !settled.get() {
                    settled.set(true);
                    p.resolve(());
                }
            });
        }
        {
            let settled = settled.clone();
            let p = prom.clone();
            input.catch(move |fault| {
                if !settled.get() {
                    settled.set(true);
                    p.fail_fault(fault.clone());
                }
            });
        }
        inputs.push(input);
    }

    if inputs.is_empty() {
        prom.resolve(());
    }

    prom.on_cancel(move || {
        for input in &inputs {
            if input.is_pending() {
                input.request_cancel();
            }
        }
    });

    fut
}

struct SequenceState<T, F> {
    factories: RefCell<VecDeque<F>>,
    produced: RefCell<Vec<Future<T>>>,
    result: Promise<Vec<Future<T>>>,
}

/// Run future-producing factories strictly in order.
///
/// Factory `i + 1` is invoked only once the future produced by factory `i`
/// has resolved; if any step fails, the result fails with that error and no
/// further factories run. On completion of the final step the result
/// resolves with the ordered list of every produced future, so a caller can
/// inspect each intermediate outcome.
///
/// Requesting cancellation of the result forwards the request to the
/// currently active step only: completed steps are never re-cancelled, and
/// steps not yet created cannot be. An empty factory list resolves
/// immediately with an empty list.
///
/// ```
/// # use deferred::{sequence, Future};
/// let seq = sequence([
///     || Future::with_value(1),
///     || Future::with_value(2),
/// ]);
/// let steps = seq.value().unwrap();
/// assert_eq!(steps.len(), 2);
/// assert_eq!(steps[1].value().as_deref(), Some(&2));
/// ```
pub fn sequence<T, I, F>(factories: I) -> Future<Vec<Future<T>>>
where
    T: 'static,
    I: IntoIterator<Item = F>,
    F: FnOnce() -> Future<T> + 'static,
{
    let (fut, prom) = future_promise();
    let state = Rc::new(SequenceState {
        factories: RefCell::new(factories.into_iter().collect()),
        produced: RefCell::new(Vec::new()),
        result: prom,
    });

    advance_sequence(&state);

    {
        let state = state.clone();
        state.result.clone().on_cancel(move || {
            let current = state.produced.borrow().last().cloned();
            if let Some(step) = current {
                if step.is_pending() {
                    step.request_cancel();
                }
            }
        });
    }

    fut
}

fn advance_sequence<T, F>(state: &Rc<SequenceState<T, F>>)
where
    T: 'static,
    F: FnOnce() -> Future<T> + 'static,
{
    let next = state.factories.borrow_mut().pop_front();
    match next {
        None => {
            if state.result.is_pending() {
                let produced = state.produced.borrow().clone();
                state.result.resolve(produced);
            }
        }
        Some(factory) => {
            let step = factory();
            state.produced.borrow_mut().push(step.clone());
            {
                let state = state.clone();
                step.on_resolved(move |_| advance_sequence(&state));
            }
            {
                let state = state.clone();
                step.catch(move |fault| {
                    if state.result.is_pending() {
                        state.result.fail_fault(fault.clone());
                    }
                });
            }
        }
    }
}

struct FoldState<T, F> {
    steps: RefCell<VecDeque<F>>,
    active: RefCell<Option<Future<T>>>,
    result: Promise<T>,
}

/// Thread a value through future-producing steps: an asynchronous left fold.
///
/// Each step receives the value the previous step resolved with (the first
/// receives `initial`); the result resolves with the final value, or fails
/// with the first step error, after which no further steps run. Cancellation
/// of the result targets the currently active step. An empty step list
/// resolves immediately with `initial`.
///
/// ```
/// # use deferred::{fold, Future};
/// let folded = fold(1, [
///     |v: i32| Future::with_value(v + 10),
///     |v: i32| Future::with_value(v * 2),
/// ]);
/// assert_eq!(folded.value().as_deref(), Some(&22));
/// ```
pub fn fold<T, I, F>(initial: T, steps: I) -> Future<T>
where
    T: Clone + 'static,
    I: IntoIterator<Item = F>,
    F: FnOnce(T) -> Future<T> + 'static,
{
    let (fut, prom) = future_promise();
    let state = Rc::new(FoldState {
        steps: RefCell::new(steps.into_iter().collect()),
        active: RefCell::new(None),
        result: prom,
    });

    advance_fold(&state, initial);

    {
        let state = state.clone();
        state.result.clone().on_cancel(move || {
            let current = state.active.borrow().clone();
            if let Some(step) = current {
                if step.is_pending() {
                    step.request_cancel();
                }
            }
        });
    }

    fut
}

fn advance_fold<T, F>(state: &Rc<FoldState<T, F>>, acc: T)
where
    T: Clone + 'static,
    F: FnOnce(T) -> Future<T> + 'static,
{
    let next = state.steps.borrow_mut().pop_front();
    match next {
        None => {
            if state.result.is_pending() {
                state.result.resolve(acc);
            }
        }
        Some(step) => {
            let produced = step(acc);
            *state.active.borrow_mut() = Some(produced.clone());
            {
                let state = state.clone();
                produced.on_resolved(move |value: &T| advance_fold(&state, value.clone()));
            }
            {
                let state = state.clone();
                produced.catch(move |fault| {
                    if state.result.is_pending() {
                        state.result.fail_fault(fault.clone());
                    }
                });
            }
        }
    }
}

/// [`fold`] over a source collection: for each element `x` of `source`, a
/// step `|acc| f(acc, x)`.
///
/// ```
/// # use deferred::{aggregate, Future};
/// let sum = aggregate(0, [1, 2, 3], |acc, x| Future::with_value(acc + x));
/// assert_eq!(sum.value().as_deref(), Some(&6));
/// ```
pub fn aggregate<T, I, F>(initial: T, source: I, f: F) -> Future<T>
where
    T: Clone + 'static,
    I: IntoIterator<Item = T>,
    F: Fn(T, T) -> Future<T> + 'static,
{
    let f = Rc::new(f);
    let steps: Vec<Box<dyn FnOnce(T) -> Future<T>>> = source
        .into_iter()
        .map(|item| {
            let f = f.clone();
            Box::new(move |acc: T| (*f)(acc, item)) as Box<dyn FnOnce(T) -> Future<T>>
        })
        .collect();
    fold(initial, steps)
}
