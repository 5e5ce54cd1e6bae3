// Combinator behavior through the public API only.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use deferred::{aggregate, all, any, fold, future_promise, sequence, Future};

#[derive(Debug, thiserror::Error)]
#[error("step failed: {0}")]
struct StepError(&'static str);

fn cancel_counter<T: 'static>(prom: &deferred::Promise<T>) -> Rc<Cell<u32>> {
    let count = Rc::new(Cell::new(0));
    {
        let count = count.clone();
        prom.on_cancel(move || count.set(count.get() + 1));
    }
    count
}

#[test]
fn all_resolves_once_every_input_resolves() {
    let (a, pa) = future_promise();
    let (b, pb) = future_promise();
    let (c, pc) = future_promise();

    let joined = all([a, b, c]);
    let settles = Rc::new(Cell::new(0));
    {
        let settles = settles.clone();
        joined.on_resolved(move |_| settles.set(settles.get() + 1));
    }

    pa.resolve(1);
    pb.resolve(2);
    assert!(joined.is_pending());
    pc.resolve(3);

    assert_eq!(settles.get(), 1);
}

#[test]
fn all_fails_with_the_first_failure() {
    let (a, pa) = future_promise::<i32>();
    let (b, pb) = future_promise::<i32>();
    let (c, pc) = future_promise::<i32>();

    let joined = all([a, b, c]);
    joined.catch(|_| {});

    pa.resolve(1);
    pb.fail(StepError("b"));
    assert!(joined.error().unwrap().is::<StepError>());

    // later sibling settlements neither re-fail nor re-resolve the result
    pc.resolve(3);
    assert!(joined.error().unwrap().is::<StepError>());
}

#[test]
fn all_tolerates_multiple_failures() {
    let (a, pa) = future_promise::<i32>();
    let (b, pb) = future_promise::<i32>();

    let joined = all([a, b]);
    let caught = Rc::new(Cell::new(0));
    {
        let caught = caught.clone();
        joined.catch(move |_| caught.set(caught.get() + 1));
    }

    pa.fail(StepError("a"));
    pb.fail(StepError("b"));
    assert_eq!(caught.get(), 1);
}

#[test]
fn all_of_nothing_resolves_immediately() {
    let joined = all(Vec::<Future<i32>>::new());
    assert!(!joined.is_pending());
}

#[test]
fn all_with_presettled_inputs_waits_for_full_subscription() {
    // every input resolves synchronously during registration; the result
    // must still settle exactly once, after the whole group is wired
    let joined = all([
        Future::with_value(1),
        Future::with_value(2),
        Future::with_value(3),
    ]);
    assert!(!joined.is_pending());
    assert!(joined.error().is_none());
}

#[test]
fn all_cancellation_reaches_only_pending_inputs() {
    let (a, pa) = future_promise::<i32>();
    let (b, pb) = future_promise::<i32>();
    let a_cancels = cancel_counter(&pa);
    let b_cancels = cancel_counter(&pb);

    let joined = all([a, b]);
    pa.resolve(1);

    joined.request_cancel();
    assert_eq!(a_cancels.get(), 0);
    assert_eq!(b_cancels.get(), 1);

    pb.resolve(2);
    joined.request_cancel();
    assert_eq!(b_cancels.get(), 1);
}

#[test]
fn all_reports_mean_progress() {
    let (a, pa) = future_promise::<i32>();
    let (b, pb) = future_promise::<i32>();

    let joined = all([a, b]);
    let observed = Rc::new(Cell::new(0.0f32));
    {
        let observed = observed.clone();
        joined.on_progress(move |p| observed.set(p));
    }

    pa.set_progress(0.5);
    pb.set_progress(0.3);

    assert!((observed.get() - 0.4).abs() < 1e-6);
    assert!((joined.progress() - 0.4).abs() < 1e-6);
}

#[test]
fn any_takes_the_first_resolution() {
    let (a, pa) = future_promise::<i32>();
    let (b, pb) = future_promise::<i32>();

    let raced = any([a, b]);
    pa.resolve(1);
    assert!(!raced.is_pending());

    // the later settlement is observed but ignored
    pb.resolve(2);
    assert!(raced.error().is_none());
}

#[test]
fn any_takes_the_first_failure() {
    let (a, pa) = future_promise::<i32>();
    let (b, pb) = future_promise::<i32>();

    let raced = any([a, b]);
    raced.catch(|_| {});

    pa.fail(StepError("first"));
    assert!(raced.error().unwrap().is::<StepError>());

    pb.resolve(2);
    assert!(raced.error().unwrap().is::<StepError>());
}

#[test]
fn any_of_nothing_resolves_immediately() {
    let raced = any(Vec::<Future<i32>>::new());
    assert!(!raced.is_pending());
}

#[test]
fn any_cancellation_broadcasts_to_pending_inputs() {
    let (a, pa) = future_promise::<i32>();
    let (b, pb) = future_promise::<i32>();
    let a_cancels = cancel_counter(&pa);
    let b_cancels = cancel_counter(&pb);

    let raced = any([a, b]);
    raced.request_cancel();

    assert_eq!(a_cancels.get(), 1);
    assert_eq!(b_cancels.get(), 1);
}

#[test]
fn sequence_runs_factories_strictly_in_order() {
    let (first, first_prom) = future_promise::<i32>();
    let second_made = Rc::new(Cell::new(false));

    let seq = sequence([
        {
            let first = first.clone();
            Box::new(move || first) as Box<dyn FnOnce() -> Future<i32>>
        },
        {
            let second_made = second_made.clone();
            Box::new(move || {
                second_made.set(true);
                Future::with_value(2)
            })
        },
    ]);

    assert!(!second_made.get());
    first_prom.resolve(1);
    assert!(second_made.get());

    let steps = seq.value().unwrap();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].value().as_deref(), Some(&1));
    assert_eq!(steps[1].value().as_deref(), Some(&2));
}

#[test]
fn sequence_failure_stops_factory_invocation() {
    let invoked = Rc::new(Cell::new(false));

    let seq = sequence([
        Box::new(|| Future::<i32>::with_error(StepError("early"))) as Box<dyn FnOnce() -> Future<i32>>,
        {
            let invoked = invoked.clone();
            Box::new(move || {
                invoked.set(true);
                Future::with_value(2)
            })
        },
    ]);

    assert!(!invoked.get());
    assert!(seq.error().unwrap().is::<StepError>());
}

#[test]
fn sequence_of_nothing_resolves_immediately() {
    let seq = sequence(Vec::<Box<dyn FnOnce() -> Future<i32>>>::new());
    assert_eq!(seq.value().unwrap().len(), 0);
}

#[test]
fn sequence_cancellation_targets_the_active_step() {
    let (first, first_prom) = future_promise::<i32>();
    let (second, second_prom) = future_promise::<i32>();
    let first_cancels = cancel_counter(&first_prom);
    let second_cancels = cancel_counter(&second_prom);

    let seq = sequence([
        {
            let first = first.clone();
            Box::new(move || first) as Box<dyn FnOnce() -> Future<i32>>
        },
        {
            let second = second.clone();
            Box::new(move || second)
        },
    ]);

    seq.request_cancel();
    assert_eq!((first_cancels.get(), second_cancels.get()), (1, 0));

    first_prom.resolve(1);
    seq.request_cancel();
    assert_eq!((first_cancels.get(), second_cancels.get()), (1, 1));

    second_prom.resolve(2);
    seq.request_cancel();
    assert_eq!((first_cancels.get(), second_cancels.get()), (1, 1));
}

#[test]
fn fold_threads_the_accumulated_value() {
    let folded = fold(1, [
        |v: i32| Future::with_value(v + 10),
        |v: i32| Future::with_value(v * 2),
    ]);
    assert_eq!(folded.value().as_deref(), Some(&22));
}

#[test]
fn fold_fails_with_the_first_step_error() {
    let reached = Rc::new(Cell::new(false));

    let folded = fold(1, [
        Box::new(|_: i32| Future::<i32>::with_error(StepError("mid")))
            as Box<dyn FnOnce(i32) -> Future<i32>>,
        {
            let reached = reached.clone();
            Box::new(move |v: i32| {
                reached.set(true);
                Future::with_value(v)
            })
        },
    ]);

    assert!(!reached.get());
    assert!(folded.error().unwrap().is::<StepError>());
}

#[test]
fn fold_without_steps_yields_the_initial_value() {
    let folded = fold(41, Vec::<Box<dyn FnOnce(i32) -> Future<i32>>>::new());
    assert_eq!(folded.value().as_deref(), Some(&41));
}

#[test]
fn fold_cancellation_targets_the_active_step() {
    let (step, step_prom) = future_promise::<i32>();
    let cancels = cancel_counter(&step_prom);

    let folded = fold(0, [{
        let step = step.clone();
        move |_: i32| step
    }]);

    folded.request_cancel();
    assert_eq!(cancels.get(), 1);

    step_prom.resolve(1);
    assert_eq!(folded.value().as_deref(), Some(&1));
}

#[test]
fn aggregate_folds_a_collection() {
    let sum = aggregate(0, [1, 2, 3], |acc, x| Future::with_value(acc + x));
    assert_eq!(sum.value().as_deref(), Some(&6));
}

#[test]
fn aggregate_runs_one_step_at_a_time() {
    let (gate, gate_prom) = future_promise::<i32>();
    let steps_run = Rc::new(Cell::new(0));

    let sum = {
        let steps_run = steps_run.clone();
        let gate = gate.clone();
        aggregate(0, [1, 2], move |acc, x| {
            steps_run.set(steps_run.get() + 1);
            if steps_run.get() == 1 {
                // first step completes only when the gate opens
                gate.then(move |g| acc + x + g)
            } else {
                Future::with_value(acc + x)
            }
        })
    };

    assert_eq!(steps_run.get(), 1);
    assert!(sum.is_pending());

    gate_prom.resolve(10);
    assert_eq!(steps_run.get(), 2);
    assert_eq!(sum.value().as_deref(), Some(&13));
}
