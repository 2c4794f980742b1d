//! Change-only reporting of link and exchange state.

use super::*;
use pdx_common::master::{AlStates, WcState};
use pdx_cycle::{ConstantWriter, CycleContext, EngineEvent, LinkTransition};

fn link_changes(events: &[EngineEvent]) -> Vec<LinkTransition> {
    events
        .iter()
        .filter_map(|ev| match ev {
            EngineEvent::LinkChanged(t) => Some(*t),
            _ => None,
        })
        .collect()
}

#[test]
fn activation_is_reported_as_al_state_change() {
    let cfg = config(REFERENCE);
    let mut e = engine(&cfg, SimClock::new(ANCHOR));
    let mut app = ConstantWriter::new(0, 0x66);

    let out = e.step(&mut app).unwrap();
    let t = out.link.expect("PREOP -> OP");
    assert_eq!(t.previous.al_states, AlStates::PREOP);
    assert_eq!(t.al_states, Some(AlStates::OP));
    assert_eq!(t.slaves_responding, None);
    assert_eq!(t.link_up, None);
}

#[test]
fn up_down_up_yields_exactly_two_link_transitions() {
    let cfg = config(REFERENCE);
    let mut e = engine(&cfg, SimClock::new(ANCHOR));
    let mut app = ConstantWriter::new(0, 0x66);

    e.run_for(&mut app, 5).unwrap();
    drain(&mut e);

    e.master_mut().set_link_up(false);
    e.run_for(&mut app, 5).unwrap();
    e.master_mut().set_link_up(true);
    e.run_for(&mut app, 5).unwrap();

    let changes = link_changes(&drain(&mut e));
    assert_eq!(changes.len(), 2);
    assert_eq!(changes[0].link_up, Some(false));
    assert_eq!(changes[0].slaves_responding, Some(0));
    assert_eq!(changes[1].link_up, Some(true));
    assert_eq!(changes[1].current.al_states, AlStates::OP);
    assert_eq!(e.stats().link_transitions, 3);
}

#[test]
fn link_loss_degrades_the_exchange() {
    let cfg = config(REFERENCE);
    let mut e = engine(&cfg, SimClock::new(ANCHOR));

    let mut flags = Vec::new();
    let mut app = |ctx: &mut CycleContext<'_>| flags.push(ctx.degraded);
    e.run_for(&mut app, 3).unwrap();
    e.master_mut().set_link_up(false);
    e.run_for(&mut app, 3).unwrap();
    e.master_mut().set_link_up(true);
    e.run_for(&mut app, 3).unwrap();

    // Cycle 1 has no frame yet; the link comes back in cycle 7 and its
    // first frame is processed in cycle 8.
    assert_eq!(
        flags,
        vec![true, false, false, true, true, true, true, false, false]
    );
    assert!(e.master().counters().frames_lost >= 3);

    let degradations = drain(&mut e)
        .iter()
        .filter_map(|ev| match ev {
            EngineEvent::ExchangeChanged(t) => Some(*t),
            _ => None,
        })
        .filter(|t| t.is_degradation())
        .count();
    assert_eq!(degradations, 1);
}

#[test]
fn link_state_is_sampled_every_interval() {
    let mut cfg = config(REFERENCE);
    cfg.cycle.link_check_interval = 10;
    let mut e = engine(&cfg, SimClock::new(ANCHOR));
    let mut app = ConstantWriter::new(0, 0x66);

    e.run_for(&mut app, 3).unwrap();
    e.master_mut().set_link_up(false);

    let reported: Vec<u64> = (0..20)
        .filter_map(|_| {
            let out = e.step(&mut app).unwrap();
            out.link.map(|_| out.cycle)
        })
        .collect();
    assert_eq!(reported, vec![11]);
}

#[test]
fn lost_slave_makes_exchange_incomplete() {
    let cfg = config(WITH_INPUTS);
    let mut e = engine(&cfg, SimClock::new(ANCHOR));
    let mut app = ConstantWriter::new(0, 0x66);

    e.run_for(&mut app, 3).unwrap();
    drain(&mut e);
    assert!(!e.monitor().is_degraded());

    e.master_mut().set_slave_online(1, false);
    e.run_for(&mut app, 3).unwrap();

    let events = drain(&mut e);
    let links = link_changes(&events);
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].slaves_responding, Some(1));
    assert_eq!(links[0].link_up, None);

    let exchange: Vec<_> = events
        .iter()
        .filter_map(|ev| match ev {
            EngineEvent::ExchangeChanged(t) => Some(*t),
            _ => None,
        })
        .collect();
    assert_eq!(exchange.len(), 1);
    assert_eq!(exchange[0].working_counter, Some(2));
    assert_eq!(exchange[0].wc_state, Some(WcState::Incomplete));
    assert!(e.monitor().is_degraded());
}
