//! Cooperative shutdown: cancel flag, terminal phase, master release.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use super::*;
use pdx_cycle::{ConstantWriter, CycleContext, CycleError, EngineEvent, Phase};

#[test]
fn preset_cancel_flag_runs_no_cycle() {
    let cfg = config(REFERENCE);
    let mut e = engine(&cfg, SimClock::new(ANCHOR));
    let mut app = ConstantWriter::new(0, 0x66);

    let cancel = AtomicBool::new(true);
    let stats = e.run(&mut app, &cancel).unwrap();
    assert_eq!(stats.cycle_count, 0);
    assert_eq!(e.phase(), Phase::Stopped);
    assert!(e.master().is_released());
    assert_eq!(e.master().counters().sends, 0);
}

#[test]
fn cancel_set_by_application_completes_the_cycle() {
    let cfg = config(REFERENCE);
    let mut e = engine(&cfg, SimClock::new(ANCHOR));

    let cancel = AtomicBool::new(false);
    let mut app = |ctx: &mut CycleContext<'_>| {
        ctx.data.write_u8(0, 0x66);
        if ctx.cycle == 7 {
            cancel.store(true, Ordering::Release);
        }
    };
    let stats = e.run(&mut app, &cancel).unwrap();

    assert_eq!(stats.cycle_count, 7);
    // The cycle that raised the flag still queued and sent its outputs.
    assert_eq!(e.master().counters().sends, 7);
    assert!(e.master().is_released());
    assert!(!e.master().is_active());

    let events = drain(&mut e);
    assert_eq!(events.last(), Some(&EngineEvent::ShutDown { cycles: 7 }));
}

#[test]
fn stepping_after_shutdown_is_an_error() {
    let cfg = config(REFERENCE);
    let mut e = engine(&cfg, SimClock::new(ANCHOR));
    let mut app = ConstantWriter::new(0, 0x66);

    e.run_for(&mut app, 2).unwrap();
    e.shutdown();
    e.shutdown();
    assert!(matches!(e.step(&mut app), Err(CycleError::ShutDown)));

    let shutdowns = drain(&mut e)
        .iter()
        .filter(|ev| matches!(ev, EngineEvent::ShutDown { .. }))
        .count();
    assert_eq!(shutdowns, 1);
}

#[test]
fn dropping_the_loop_releases_the_master() {
    let cfg = config(REFERENCE);
    let mut library = SimulatedLibrary::from_config(&cfg);
    let probe = library.probe(0).unwrap();
    let mut e = setup(&mut library, &cfg, SimClock::new(ANCHOR), Vec::new()).unwrap();
    e.run_for(&mut ConstantWriter::new(0, 0x66), 3).unwrap();
    assert!(probe.is_active());

    drop(e);
    assert!(probe.is_released());
    assert_eq!(probe.counters().sends, 3);
}

#[test]
fn cancel_from_another_thread() {
    let cfg = config(REFERENCE);
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();

    let worker = thread::spawn(move || {
        let mut e = engine(&cfg, SimClock::new(ANCHOR));
        let mut app = ConstantWriter::new(0, 0x66);
        let stats = e.run(&mut app, &flag).unwrap();
        (stats.cycle_count, e.master().is_released())
    });

    thread::sleep(std::time::Duration::from_millis(20));
    cancel.store(true, Ordering::Release);
    let (cycles, released) = worker.join().unwrap();
    assert!(cycles > 0);
    assert!(released);
}

#[test]
fn cycle_limit_stops_and_releases() {
    let cfg = config(REFERENCE);
    let mut e = engine(&cfg, SimClock::new(ANCHOR));
    let mut app = ConstantWriter::new(0, 0x66);

    let cancel = AtomicBool::new(false);
    let stats = e.run_until(&mut app, &cancel, Some(12)).unwrap();
    assert_eq!(stats.cycle_count, 12);
    assert_eq!(e.phase(), Phase::Stopped);
    assert!(e.master().is_released());
    assert_eq!(e.master().counters().sends, 12);
}

#[test]
fn cancel_interrupts_a_bounded_run() {
    let cfg = config(REFERENCE);
    let mut e = engine(&cfg, SimClock::new(ANCHOR));

    let cancel = AtomicBool::new(false);
    let mut app = |ctx: &mut CycleContext<'_>| {
        if ctx.cycle == 4 {
            cancel.store(true, Ordering::Release);
        }
    };
    let stats = e.run_until(&mut app, &cancel, Some(100_000_000)).unwrap();

    assert_eq!(stats.cycle_count, 4);
    assert!(e.master().is_released());
    let events = drain(&mut e);
    assert_eq!(events.last(), Some(&EngineEvent::ShutDown { cycles: 4 }));
}
