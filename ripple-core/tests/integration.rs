//! Integration Tests for Reactive System
//!
//! These tests verify that cells, derivations and effects work together
//! correctly through the public surface.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use ripple_core::graph::{NodeId, NodeState};
use ripple_core::reactive::{
    batch, create_cell, create_derivation, create_effect, dispose, flush, on_effect_error, read,
    write, Cell, Derivation, Effect, Runtime,
};
use ripple_core::{FlushMode, ReactiveError, RuntimeConfig};

fn counter() -> (Arc<AtomicI32>, Arc<AtomicI32>) {
    let count = Arc::new(AtomicI32::new(0));
    (count.clone(), count)
}

/// The counter sample: count = 5, doubled = count * 2, an effect logging
/// doubled.
#[test]
fn doubled_counter_scenario() {
    let count = create_cell(5);
    let count_clone = count.clone();
    let doubled = create_derivation(move || Ok(count_clone.read()? * 2));

    // Created but not read: still dirty, nothing computed
    assert!(!doubled.has_value());

    let printed = Rc::new(RefCell::new(Vec::new()));
    let printed_clone = printed.clone();
    let doubled_clone = doubled.clone();
    let _log = create_effect(move || {
        printed_clone.borrow_mut().push(doubled_clone.read()?);
        Ok(())
    })
    .unwrap();
    assert_eq!(*printed.borrow(), vec![10]);

    write(&count, 8).unwrap();
    assert_eq!(*printed.borrow(), vec![10, 16]);

    let flushes = Runtime::stats().flushes;
    write(&count, 8).unwrap();
    assert_eq!(*printed.borrow(), vec![10, 16]);
    assert_eq!(Runtime::stats().flushes, flushes);
}

struct Diamond {
    a: Cell<i32>,
    b_runs: Arc<AtomicI32>,
    c_runs: Arc<AtomicI32>,
    d: Effect,
    seen: Rc<RefCell<Vec<(i32, i32)>>>,
}

/// A feeds B and C, both feed effect D.
fn diamond() -> Diamond {
    let a = create_cell(1);
    let (b_runs, b_runs_clone) = counter();
    let (c_runs, c_runs_clone) = counter();

    let a_b = a.clone();
    let b = create_derivation(move || {
        b_runs_clone.fetch_add(1, Ordering::SeqCst);
        Ok(a_b.read()? + 1)
    });
    let a_c = a.clone();
    let c = create_derivation(move || {
        c_runs_clone.fetch_add(1, Ordering::SeqCst);
        Ok(a_c.read()? * 10)
    });

    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen_clone = seen.clone();
    let d = create_effect(move || {
        seen_clone.borrow_mut().push((b.read()?, c.read()?));
        Ok(())
    })
    .unwrap();

    Diamond { a, b_runs, c_runs, d, seen }
}

#[test]
fn diamond_is_glitch_free() {
    let diamond = diamond();
    write(&diamond.a, 2).unwrap();

    assert_eq!(diamond.d.run_count(), 2);
    // Never (3, 10) or (2, 20): both sides reflect a = 2
    assert_eq!(*diamond.seen.borrow(), vec![(2, 10), (3, 20)]);
}

#[test]
fn diamond_recomputes_each_branch_once() {
    let diamond = diamond();
    assert_eq!(diamond.b_runs.load(Ordering::SeqCst), 1);
    assert_eq!(diamond.c_runs.load(Ordering::SeqCst), 1);

    write(&diamond.a, 2).unwrap();
    assert_eq!(diamond.b_runs.load(Ordering::SeqCst), 2);
    assert_eq!(diamond.c_runs.load(Ordering::SeqCst), 2);
}

#[test]
fn equal_write_triggers_nothing() {
    let diamond = diamond();
    let before = Runtime::stats();

    write(&diamond.a, 1).unwrap();

    assert_eq!(Runtime::stats(), before);
    assert_eq!(diamond.b_runs.load(Ordering::SeqCst), 1);
    assert_eq!(diamond.c_runs.load(Ordering::SeqCst), 1);
    assert_eq!(diamond.d.run_count(), 1);
}

#[test]
fn unread_derivation_never_computes() {
    let (calls, calls_clone) = counter();
    let source = create_cell(0);
    let source_clone = source.clone();
    let _lazy = create_derivation(move || {
        calls_clone.fetch_add(1, Ordering::SeqCst);
        Ok(source_clone.read()?)
    });

    for value in 1..=5 {
        write(&source, value).unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn mutually_dependent_derivations_are_rejected() {
    let slot: Rc<RefCell<Option<Derivation<i32>>>> = Rc::new(RefCell::new(None));

    let slot_clone = slot.clone();
    let first = create_derivation(move || {
        let second = slot_clone.borrow().clone();
        match second {
            Some(second) => Ok(second.read()? + 1),
            None => Ok(0),
        }
    });
    let first_clone = first.clone();
    let second = create_derivation(move || Ok(first_clone.read()? + 1));
    *slot.borrow_mut() = Some(second.clone());

    assert!(matches!(first.read(), Err(ReactiveError::CycleDetected { .. })));
    assert!(matches!(second.read(), Err(ReactiveError::CycleDetected { .. })));
}

#[test]
fn cycle_through_an_effect_fails_creation() {
    let slot: Rc<RefCell<Option<Derivation<i32>>>> = Rc::new(RefCell::new(None));
    let slot_clone = slot.clone();
    let looped = create_derivation(move || {
        let me = slot_clone.borrow().clone();
        match me {
            Some(me) => me.read(),
            None => Ok(0),
        }
    });
    *slot.borrow_mut() = Some(looped.clone());

    let looped_clone = looped.clone();
    let err = create_effect(move || {
        looped_clone.read()?;
        Ok(())
    })
    .unwrap_err();
    assert!(matches!(err, ReactiveError::CycleDetected { .. }));
}

#[test]
fn batch_coalesces_independent_writes() {
    let cells: Vec<Cell<i32>> = (0..5).map(create_cell).collect();
    let (runs, runs_clone) = counter();
    let (total, total_clone) = counter();
    let readers = cells.clone();
    let _sum = create_effect(move || {
        let mut sum = 0;
        for cell in &readers {
            sum += cell.read()?;
        }
        total_clone.store(sum, Ordering::SeqCst);
        runs_clone.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();
    assert_eq!(total.load(Ordering::SeqCst), 10);

    let (single_runs, single_clone) = counter();
    let first = cells[0].clone();
    let _single = create_effect(move || {
        first.read()?;
        single_clone.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();

    let flushes = Runtime::stats().flushes;
    batch(|| {
        for (i, cell) in cells.iter().enumerate() {
            cell.write(100 + i as i32).unwrap();
        }
    })
    .unwrap();

    assert_eq!(Runtime::stats().flushes, flushes + 1);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(total.load(Ordering::SeqCst), 510);
    assert_eq!(single_runs.load(Ordering::SeqCst), 2);
}

#[test]
fn disposed_effect_stops_running() {
    let source = create_cell(0);
    let (runs, runs_clone) = counter();
    let source_clone = source.clone();
    let effect = create_effect(move || {
        source_clone.read()?;
        runs_clone.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();

    dispose(&effect);
    for value in 1..=3 {
        write(&source, value).unwrap();
    }
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn self_feeding_effect_hits_the_runaway_guard() {
    Runtime::configure(RuntimeConfig::default().with_max_flush_iterations(25)).unwrap();

    let ticks = create_cell(0);
    let ticks_clone = ticks.clone();
    let effect = create_effect(move || {
        let current = ticks_clone.read()?;
        if current > 0 {
            ticks_clone.write(current + 1)?;
        }
        Ok(())
    })
    .unwrap();

    let err = write(&ticks, 1).unwrap_err();
    assert!(matches!(err, ReactiveError::MaxFlushIterationsExceeded { limit: 25 }));
    assert_eq!(effect.run_count(), 26);
    assert_eq!(Runtime::pending_count(), 0);
    assert!(!Runtime::is_flushing());
}

/// An effect that bumps the source of a derivation it reads keeps running
/// until the derivation settles, and stays subscribed afterwards.
#[test]
fn effect_writing_through_a_derivation_stays_subscribed() {
    let a = create_cell(0);
    let a_clone = a.clone();
    let d = create_derivation(move || Ok(a_clone.read()? * 2));

    let seen = Rc::new(RefCell::new(Vec::new()));
    let (seen_clone, d_clone, a_writer) = (seen.clone(), d.clone(), a.clone());
    let effect = create_effect(move || {
        let value = d_clone.read()?;
        seen_clone.borrow_mut().push(value);
        if value < 4 {
            a_writer.write(a_writer.peek()? + 1)?;
        }
        Ok(())
    })
    .unwrap();

    assert_eq!(*seen.borrow(), vec![0, 2, 4]);
    assert_eq!(a.peek().unwrap(), 2);
    assert_eq!(d.state(), Some(NodeState::Clean));

    write(&a, 100).unwrap();
    assert_eq!(seen.borrow().last(), Some(&200));
    assert_eq!(effect.run_count(), 4);
}

/// Writing back into a transitive dependency never settles.
#[test]
fn feedback_through_a_derivation_hits_the_runaway_guard() {
    Runtime::configure(RuntimeConfig::default().with_max_flush_iterations(20)).unwrap();

    let a = create_cell(0);
    let a_clone = a.clone();
    let next = create_derivation(move || Ok(a_clone.read()? + 1));

    let (next_clone, a_writer) = (next.clone(), a.clone());
    let effect = create_effect(move || {
        let value = next_clone.read()?;
        if value > 1 {
            a_writer.write(value)?;
        }
        Ok(())
    })
    .unwrap();

    let err = write(&a, 1000).unwrap_err();
    assert!(matches!(err, ReactiveError::MaxFlushIterationsExceeded { limit: 20 }));
    assert_eq!(effect.run_count(), 21);
    assert_eq!(Runtime::pending_count(), 0);
}

/// An effect whose first run hits a failing derivation runs again once the
/// derivation's input is fixed.
#[test]
fn effect_recovers_after_derivation_error() {
    let (reports, reports_clone) = counter();
    on_effect_error(move |_, _| {
        reports_clone.fetch_add(1, Ordering::SeqCst);
    });

    let a = create_cell(0);
    let a_clone = a.clone();
    let checked = create_derivation(move || {
        let value = a_clone.read()?;
        if value == 0 {
            return Err(ReactiveError::custom("zero is not allowed"));
        }
        Ok(value)
    });

    let seen = Rc::new(RefCell::new(Vec::new()));
    let (seen_clone, checked_clone) = (seen.clone(), checked.clone());
    let effect = create_effect(move || {
        seen_clone.borrow_mut().push(checked_clone.read()?);
        Ok(())
    })
    .unwrap();

    assert_eq!(reports.load(Ordering::SeqCst), 1);
    assert_eq!(effect.dependency_count(), 1);
    assert!(seen.borrow().is_empty());

    write(&a, 5).unwrap();
    assert_eq!(*seen.borrow(), vec![5]);
    assert_eq!(reports.load(Ordering::SeqCst), 1);
}

#[test]
fn effect_writes_settle_in_later_passes() {
    let name = create_cell(String::from("Jao"));
    let shout = create_cell(String::new());

    let (name_clone, shout_clone) = (name.clone(), shout.clone());
    let _upper = create_effect(move || {
        shout_clone.write(name_clone.read()?.to_uppercase())?;
        Ok(())
    })
    .unwrap();

    let banner = Rc::new(RefCell::new(Vec::new()));
    let (banner_clone, shout_reader) = (banner.clone(), shout.clone());
    let _render = create_effect(move || {
        banner_clone.borrow_mut().push(shout_reader.read()?);
        Ok(())
    })
    .unwrap();

    write(&name, String::from("Bao")).unwrap();
    assert_eq!(*banner.borrow(), vec!["JAO", "BAO"]);
}

#[test]
fn effect_errors_are_reported_and_isolated() {
    let reported: Rc<RefCell<Vec<(NodeId, String)>>> = Rc::new(RefCell::new(Vec::new()));
    let reported_clone = reported.clone();
    on_effect_error(move |effect, err| {
        reported_clone.borrow_mut().push((effect, err.to_string()));
    });

    let query = create_cell(String::from("cats"));
    let (query_a, query_b) = (query.clone(), query.clone());

    let failing = create_effect(move || {
        if query_a.read()?.is_empty() {
            return Err(ReactiveError::custom("empty search"));
        }
        Ok(())
    })
    .unwrap();

    let (runs, runs_clone) = counter();
    let _healthy = create_effect(move || {
        query_b.read()?;
        runs_clone.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();

    write(&query, String::new()).unwrap();

    assert_eq!(*reported.borrow(), vec![(failing.id(), String::from("empty search"))]);
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    // The failing effect keeps its subscriptions
    write(&query, String::from("dogs")).unwrap();
    assert_eq!(failing.run_count(), 3);
    assert_eq!(reported.borrow().len(), 1);
}

#[test]
fn failing_initial_run_is_reported() {
    let (reports, reports_clone) = counter();
    on_effect_error(move |_, _| {
        reports_clone.fetch_add(1, Ordering::SeqCst);
    });

    let effect = create_effect(|| Err(ReactiveError::custom("fetch failed"))).unwrap();
    assert!(!effect.is_disposed());
    assert_eq!(reports.load(Ordering::SeqCst), 1);
}

#[test]
fn reading_a_disposed_cell_aborts_the_flush() {
    let trigger = create_cell(0);
    let gone = create_cell(1);
    let (trigger_clone, gone_clone) = (trigger.clone(), gone.clone());

    let (reports, reports_clone) = counter();
    on_effect_error(move |_, _| {
        reports_clone.fetch_add(1, Ordering::SeqCst);
    });

    let _effect = create_effect(move || {
        trigger_clone.read()?;
        gone_clone.read()?;
        Ok(())
    })
    .unwrap();

    dispose(&gone);
    let err = write(&trigger, 1).unwrap_err();
    assert!(matches!(err, ReactiveError::DisposedNodeAccess { node } if node == gone.id()));
    assert_eq!(reports.load(Ordering::SeqCst), 0);
}

#[test]
fn effects_run_in_height_order() {
    let base = create_cell(1);
    let order = Rc::new(RefCell::new(Vec::new()));

    let base_clone = base.clone();
    let level1 = create_derivation(move || Ok(base_clone.read()? + 1));
    let level1_clone = level1.clone();
    let level2 = create_derivation(move || Ok(level1_clone.read()? + 1));

    // Registered deepest first
    let (order_deep, level2_clone) = (order.clone(), level2.clone());
    let _deep = create_effect(move || {
        level2_clone.read()?;
        order_deep.borrow_mut().push("deep");
        Ok(())
    })
    .unwrap();
    let (order_shallow, base_reader) = (order.clone(), base.clone());
    let _shallow = create_effect(move || {
        base_reader.read()?;
        order_shallow.borrow_mut().push("shallow");
        Ok(())
    })
    .unwrap();

    order.borrow_mut().clear();
    write(&base, 2).unwrap();
    assert_eq!(*order.borrow(), vec!["shallow", "deep"]);
}

#[test]
fn manual_flush_mode_coalesces_a_turn() {
    Runtime::configure(RuntimeConfig::from_json(r#"{ "flush_mode": "manual" }"#).unwrap()).unwrap();
    assert_eq!(Runtime::config().flush_mode, FlushMode::Manual);

    let name = create_cell(String::new());
    let power = create_cell(0);
    let (runs, runs_clone) = counter();
    let (name_clone, power_clone) = (name.clone(), power.clone());
    let _form = create_effect(move || {
        name_clone.read()?;
        power_clone.read()?;
        runs_clone.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();

    // A click handler doing several writes before yielding
    write(&name, String::from("Piccolo")).unwrap();
    write(&power, 3000).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    flush().unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn roster_modify_notifies_dependents() {
    #[derive(Debug, Clone, PartialEq)]
    struct Character {
        id: usize,
        name: String,
        power: u32,
    }

    let roster = create_cell(vec![Character {
        id: 1,
        name: String::from("Goku"),
        power: 9000,
    }]);
    let roster_clone = roster.clone();
    let strongest = create_derivation(move || {
        Ok(roster_clone
            .read()?
            .iter()
            .max_by_key(|c| c.power)
            .map(|c| c.name.clone()))
    });

    assert_eq!(read(&strongest).unwrap().as_deref(), Some("Goku"));

    roster
        .modify(|chars| {
            let id = chars.len() + 1;
            chars.push(Character {
                id,
                name: String::from("Vegeta"),
                power: 9001,
            });
        })
        .unwrap();

    assert_eq!(read(&strongest).unwrap().as_deref(), Some("Vegeta"));
    assert_eq!(roster.read().unwrap()[1].id, 2);
}
