//! End-to-end scheduling scenarios against the public API.

use std::cell::RefCell;
use std::rc::Rc;

use chronon::{SimDuration, SimError, Simulator, VirtualTime};
use proptest::prelude::*;

type Log = Rc<RefCell<Vec<(usize, VirtualTime)>>>;

fn secs(n: u64) -> VirtualTime {
    VirtualTime::from_secs(n)
}

fn record(sim: &mut Simulator, at: VirtualTime, tag: usize, log: &Log) -> chronon::EventId {
    let log = Rc::clone(log);
    sim.schedule_at(at, move |sim| log.borrow_mut().push((tag, sim.now())))
        .unwrap()
}

// ── Concrete scenarios ────────────────────────────────────────────────

#[test]
fn test_equal_times_dispatch_fifo() {
    let mut sim = Simulator::new();
    let log: Log = Rc::default();

    record(&mut sim, secs(5), 0, &log);
    record(&mut sim, secs(2), 1, &log);
    record(&mut sim, secs(2), 2, &log);
    record(&mut sim, secs(8), 3, &log);
    sim.run().unwrap();

    assert_eq!(
        *log.borrow(),
        vec![(1, secs(2)), (2, secs(2)), (0, secs(5)), (3, secs(8))]
    );
}

#[test]
fn test_cancel_before_run_dispatches_nothing() {
    let mut sim = Simulator::new();
    let log: Log = Rc::default();

    let a = record(&mut sim, secs(10), 0, &log);
    sim.cancel(a);

    assert_eq!(sim.run().unwrap(), 0);
    assert!(log.borrow().is_empty());
}

#[test]
fn test_reentrant_schedule_sees_advancing_clock() {
    let mut sim = Simulator::new();
    let log: Log = Rc::default();

    let l = Rc::clone(&log);
    sim.schedule_at(secs(3), move |sim| {
        l.borrow_mut().push((0, sim.now()));
        let l = Rc::clone(&l);
        sim.schedule(SimDuration::secs(2), move |sim| l.borrow_mut().push((1, sim.now())))
            .unwrap();
    })
    .unwrap();
    sim.run().unwrap();

    assert_eq!(*log.borrow(), vec![(0, secs(3)), (1, secs(5))]);
}

#[test]
fn test_stop_deadline_before_run() {
    let mut sim = Simulator::new();
    let log: Log = Rc::default();

    sim.stop_at(secs(4)).unwrap();
    record(&mut sim, secs(1), 1, &log);
    record(&mut sim, secs(4), 4, &log);
    record(&mut sim, secs(6), 6, &log);
    sim.run().unwrap();

    assert_eq!(*log.borrow(), vec![(1, secs(1)), (4, secs(4))]);
    assert_eq!(sim.now(), secs(4));
}

#[test]
fn test_schedule_at_now_is_accepted() {
    let mut sim = Simulator::new();
    let log: Log = Rc::default();

    // Outside a dispatch: runs on the next loop iteration.
    let now = sim.now();
    record(&mut sim, now, 0, &log);

    // During a dispatch: runs after the current callback returns.
    let l = Rc::clone(&log);
    sim.schedule_at(secs(1), move |sim| {
        let now = sim.now();
        let inner = Rc::clone(&l);
        sim.schedule_at(now, move |sim| inner.borrow_mut().push((2, sim.now())))
            .unwrap();
        l.borrow_mut().push((1, now));
    })
    .unwrap();
    sim.run().unwrap();

    assert_eq!(
        *log.borrow(),
        vec![(0, VirtualTime::ZERO), (1, secs(1)), (2, secs(1))]
    );
}

#[test]
fn test_negative_delay_leaves_pending_set_unchanged() {
    let mut sim = Simulator::new();
    sim.schedule(SimDuration::secs(1), |_| {}).unwrap();

    let err = sim.schedule(SimDuration::secs(-1), |_| {}).unwrap_err();
    assert!(matches!(err, SimError::InvalidDelay { .. }));
    assert_eq!(sim.pending_count(), 1);
}

#[test]
fn test_independent_simulators_do_not_interfere() {
    let mut a = Simulator::new();
    let mut b = Simulator::new();
    let log: Log = Rc::default();

    record(&mut a, secs(1), 0, &log);
    record(&mut b, secs(2), 1, &log);
    a.run().unwrap();

    assert_eq!(*log.borrow(), vec![(0, secs(1))]);
    assert_eq!(b.now(), VirtualTime::ZERO);
    assert_eq!(b.pending_count(), 1);
}

#[test]
fn test_simulators_on_separate_threads() {
    let handles: Vec<_> = (0..4u64)
        .map(|n| {
            std::thread::spawn(move || {
                let mut sim = Simulator::new();
                for k in 0..=n {
                    sim.schedule_at(secs(k), |_| {}).unwrap();
                }
                sim.run().unwrap()
            })
        })
        .collect();

    let counts: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(counts, vec![1, 2, 3, 4]);
}

// ── Properties ────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn prop_dispatch_is_time_ordered_and_fifo(times in prop::collection::vec(0u64..50, 0..64)) {
        let mut sim = Simulator::new();
        let log: Log = Rc::default();
        for (tag, t) in times.iter().enumerate() {
            record(&mut sim, VirtualTime::from_nanos(*t), tag, &log);
        }
        sim.run().unwrap();

        let mut expected: Vec<(usize, VirtualTime)> = times
            .iter()
            .enumerate()
            .map(|(tag, t)| (tag, VirtualTime::from_nanos(*t)))
            .collect();
        // Stable sort keeps insertion order among equal times.
        expected.sort_by_key(|(_, t)| *t);
        prop_assert_eq!(&*log.borrow(), &expected);
    }

    #[test]
    fn prop_cancelled_events_never_run(
        times in prop::collection::vec(0u64..50, 1..64),
        cancel_mask in prop::collection::vec(any::<bool>(), 64),
    ) {
        let mut sim = Simulator::new();
        let log: Log = Rc::default();
        let ids: Vec<_> = times
            .iter()
            .enumerate()
            .map(|(tag, t)| record(&mut sim, VirtualTime::from_nanos(*t), tag, &log))
            .collect();
        for (tag, id) in ids.iter().enumerate() {
            if cancel_mask[tag] {
                sim.cancel(*id);
            }
        }
        sim.run().unwrap();

        for (tag, _) in log.borrow().iter() {
            prop_assert!(!cancel_mask[*tag], "cancelled event {} ran", tag);
        }
        let survivors = (0..times.len()).filter(|tag| !cancel_mask[*tag]).count();
        prop_assert_eq!(log.borrow().len(), survivors);
    }

    #[test]
    fn prop_reentrant_events_never_precede_earlier_pending(
        seeds in prop::collection::vec((0u64..20, 0u64..20), 1..32),
    ) {
        let mut sim = Simulator::new();
        let observed = Rc::new(RefCell::new(Vec::new()));
        for (start, delta) in seeds {
            let obs = Rc::clone(&observed);
            sim.schedule_at(VirtualTime::from_nanos(start), move |sim| {
                obs.borrow_mut().push(sim.now());
                let obs = Rc::clone(&obs);
                sim.schedule(SimDuration::nanos(delta as i64), move |sim| {
                    obs.borrow_mut().push(sim.now())
                })
                .unwrap();
            })
            .unwrap();
        }
        let dispatched = sim.run().unwrap();

        let observed = observed.borrow();
        prop_assert_eq!(observed.len() as u64, dispatched);
        for window in observed.windows(2) {
            prop_assert!(window[0] <= window[1]);
        }
    }

    #[test]
    fn prop_destroy_twice_matches_once(times in prop::collection::vec(0u64..50, 0..16)) {
        let build = || {
            let mut sim = Simulator::new();
            for t in &times {
                sim.schedule_at(VirtualTime::from_nanos(*t), |_| {}).unwrap();
            }
            sim
        };
        let mut once = build();
        once.destroy();
        let mut twice = build();
        twice.destroy();
        twice.destroy();

        prop_assert_eq!(once.state(), twice.state());
        prop_assert_eq!(once.pending_count(), twice.pending_count());
        prop_assert_eq!(once.now(), twice.now());
    }
}
