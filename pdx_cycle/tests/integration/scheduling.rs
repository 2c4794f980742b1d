//! Absolute scheduling: drift-free deadlines, interrupted sleeps, overruns.

use super::*;
use pdx_cycle::{ConstantWriter, EngineEvent};
use proptest::prelude::*;

#[test]
fn thousand_cycles_at_one_khz_span_exactly_one_second() {
    let cfg = config(REFERENCE);
    // Lateness well inside the 250us tolerance.
    let clock = SimClock::new(ANCHOR).with_jitter(vec![0, 12_000, 87_000, 3_000, 149_000]);
    let mut e = engine(&cfg, clock);
    let mut app = ConstantWriter::new(0, 0x66);

    let mut deadlines = Vec::with_capacity(1000);
    for _ in 0..1000 {
        deadlines.push(e.step(&mut app).unwrap().deadline);
    }

    assert_eq!(deadlines[0], ANCHOR.add_nanos(PERIOD_NS));
    assert!(
        deadlines
            .windows(2)
            .all(|w| w[1].diff_nanos(&w[0]) == PERIOD_NS as i64)
    );
    assert_eq!(deadlines[999].diff_nanos(&ANCHOR), 1_000_000_000);
    assert_eq!(e.stats().overruns, 0);
    assert_eq!(e.stats().cycle_count, 1000);
    assert_eq!(
        e.master().application_time_ns(),
        Some(ANCHOR.add_nanos(1_000_000_000).as_nanos())
    );
}

#[test]
fn application_time_is_the_scheduled_deadline() {
    let cfg = config(REFERENCE);
    let mut e = engine(&cfg, SimClock::new(ANCHOR).with_jitter(vec![42_000]));
    let mut app = ConstantWriter::new(0, 0x66);

    let out = e.step(&mut app).unwrap();
    assert_eq!(e.master().application_time_ns(), Some(out.deadline.as_nanos()));
    assert_eq!(e.master().counters().app_time_updates, 1);
}

#[test]
fn interrupted_sleep_waits_for_the_same_deadline() {
    let cfg = config(REFERENCE);
    let clock = SimClock::new(ANCHOR);
    clock.interrupt_next(3);
    let mut e = engine(&cfg, clock.clone());
    let mut app = ConstantWriter::new(0, 0x66);

    let out = e.step(&mut app).unwrap();
    assert_eq!(out.deadline, ANCHOR.add_nanos(PERIOD_NS));
    assert!(out.overrun.is_none());
    assert_eq!(clock.requested_deadlines(), vec![out.deadline; 4]);
    assert_eq!(e.stats().interrupts, 3);

    let events = drain(&mut e);
    assert!(events.contains(&EngineEvent::SleepInterrupted {
        deadline: out.deadline,
        count: 3
    }));

    // The schedule is unaffected.
    let next = e.step(&mut app).unwrap();
    assert_eq!(next.deadline, ANCHOR.add_nanos(2 * PERIOD_NS));
}

#[test]
fn late_wakeup_is_reported_without_stopping_the_loop() {
    let cfg = config(REFERENCE);
    let clock = SimClock::new(ANCHOR).with_jitter(vec![0, 0, 400_000, 0]);
    let mut e = engine(&cfg, clock);
    let mut app = ConstantWriter::new(0, 0x66);

    let outcomes: Vec<_> = (0..8).map(|_| e.step(&mut app).unwrap()).collect();
    let late: Vec<_> = outcomes.iter().filter(|o| o.overrun.is_some()).collect();
    assert_eq!(late.len(), 2);
    assert_eq!(late[0].cycle, 3);
    assert_eq!(late[1].cycle, 7);
    assert_eq!(late[0].overrun.map(|o| o.lateness_ns), Some(400_000));

    let events = drain(&mut e);
    let overruns = events
        .iter()
        .filter(|ev| matches!(ev, EngineEvent::Overrun(_)))
        .count();
    assert_eq!(overruns, 2);
    assert_eq!(e.stats().overruns, 2);
    assert_eq!(outcomes[7].deadline, ANCHOR.add_nanos(8 * PERIOD_NS));
}

#[test]
fn missed_deadline_runs_immediately_and_keeps_the_grid() {
    let cfg = config(REFERENCE);
    let clock = SimClock::new(ANCHOR);
    let mut e = engine(&cfg, clock.clone());
    let mut app = ConstantWriter::new(0, 0x66);

    e.step(&mut app).unwrap();
    // Simulated stall of 2.3 periods after cycle 1.
    clock.advance(2_300_000);
    let sleeps_before = clock.requested_deadlines().len();

    let out = e.step(&mut app).unwrap();
    let overrun = out.overrun.expect("deadline passed");
    assert!(overrun.missed_before_sleep);
    assert_eq!(overrun.lateness_ns, 1_300_000);
    assert_eq!(out.deadline, ANCHOR.add_nanos(2 * PERIOD_NS));
    assert_eq!(clock.requested_deadlines().len(), sleeps_before);

    // Catch up on the original grid.
    let out = e.step(&mut app).unwrap();
    assert_eq!(out.deadline, ANCHOR.add_nanos(3 * PERIOD_NS));
    assert!(out.overrun.is_some());
    let out = e.step(&mut app).unwrap();
    assert_eq!(out.deadline, ANCHOR.add_nanos(4 * PERIOD_NS));
    assert!(out.overrun.is_none());
}

#[test]
fn statistics_are_published_every_interval() {
    let mut cfg = config(REFERENCE);
    cfg.cycle.stats_interval = 25;
    let mut e = engine(&cfg, SimClock::new(ANCHOR));
    let mut app = ConstantWriter::new(0, 0x66);

    e.run_for(&mut app, 100).unwrap();
    let counts: Vec<u64> = drain(&mut e)
        .into_iter()
        .filter_map(|ev| match ev {
            EngineEvent::Statistics(s) => Some(s.cycle_count),
            _ => None,
        })
        .collect();
    assert_eq!(counts, vec![25, 50, 75, 100]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn deadlines_never_drift(
        jitter in proptest::collection::vec(0u64..900_000, 1..16),
        cycles in 1usize..200,
    ) {
        let cfg = config(REFERENCE);
        let mut e = engine(&cfg, SimClock::new(ANCHOR).with_jitter(jitter));
        let mut app = ConstantWriter::new(0, 0x66);

        for k in 1..=cycles {
            let out = e.step(&mut app).unwrap();
            prop_assert_eq!(out.deadline, ANCHOR.add_nanos(k as u64 * PERIOD_NS));
        }
    }
}
