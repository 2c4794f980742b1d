//! Process-data flow between the application and the slaves.

use super::*;
use pdx_common::master::WcState;
use pdx_cycle::{ConstantWriter, CycleContext, EngineEvent};

#[test]
fn constant_writer_sets_only_its_own_byte() {
    let cfg = config(REFERENCE);
    let mut e = engine(&cfg, SimClock::new(ANCHOR));
    let mut app = ConstantWriter::from_config(&cfg, e.offsets()).unwrap();
    assert_eq!(app.offset(), 0);
    assert_eq!(app.value(), 0x66);
    assert_eq!(e.offsets().offset(0x0005, 2), Some(1));

    e.step(&mut app).unwrap();

    assert_eq!(domain_image(&mut e), vec![0x66, 0x00]);
    assert_eq!(e.master().slave_value(0, 0x0005, 1), Some(0x66));
    assert_eq!(e.master().slave_value(0, 0x0005, 2), Some(0));
    assert_eq!(e.master().counters().sends, 1);
}

#[test]
fn outputs_persist_across_cycles() {
    let cfg = config(REFERENCE);
    let mut e = engine(&cfg, SimClock::new(ANCHOR));
    let mut first = |ctx: &mut CycleContext<'_>| {
        if ctx.cycle == 1 {
            ctx.data.write_u8(1, 0x5A);
        }
    };
    e.run_for(&mut first, 5).unwrap();
    assert_eq!(domain_image(&mut e), vec![0x00, 0x5A]);
    assert_eq!(e.master().slave_value(0, 0x0005, 2), Some(0x5A));
}

#[test]
fn inputs_arrive_one_cycle_after_send() {
    let cfg = config(WITH_INPUTS);
    let mut e = engine(&cfg, SimClock::new(ANCHOR));
    let input = e.offsets().offset(0x6000, 1).unwrap();
    assert_eq!(input, 1);
    assert!(e.master_mut().set_input(1, 0x6000, 1, 0xBEEF));

    let mut seen = Vec::new();
    let mut app = |ctx: &mut CycleContext<'_>| {
        seen.push((ctx.cycle, ctx.data.read_u16(input), ctx.degraded));
        ctx.data.write_u8(0, 0x66);
    };
    e.run_for(&mut app, 3).unwrap();

    assert_eq!(
        seen,
        vec![(1, 0x0000, true), (2, 0xBEEF, false), (3, 0xBEEF, false)]
    );
}

#[test]
fn working_counter_completes_after_first_round_trip() {
    let cfg = config(WITH_INPUTS);
    let mut e = engine(&cfg, SimClock::new(ANCHOR));
    let mut app = ConstantWriter::new(0, 0x66);

    let first = e.step(&mut app).unwrap();
    assert!(first.exchange.is_none(), "first observation is the baseline");
    assert!(first.degraded);

    let second = e.step(&mut app).unwrap();
    let t = second.exchange.expect("exchange became complete");
    assert!(t.is_recovery());
    // Outputs of slave 0 (+2), inputs of slave 1 (+1).
    assert_eq!(t.working_counter, Some(3));
    assert_eq!(t.wc_state, Some(WcState::Complete));
    assert!(!second.degraded);

    for _ in 0..10 {
        assert!(e.step(&mut app).unwrap().exchange.is_none());
    }
    let changes = drain(&mut e)
        .iter()
        .filter(|ev| matches!(ev, EngineEvent::ExchangeChanged(_)))
        .count();
    assert_eq!(changes, 1);
}

#[test]
fn application_sees_resolved_offsets() {
    let cfg = config(WITH_INPUTS);
    let mut e = engine(&cfg, SimClock::new(ANCHOR));
    let mut lookups = Vec::new();
    let mut app = |ctx: &mut CycleContext<'_>| {
        lookups.push((
            ctx.offsets.offset(0x0005, 1),
            ctx.offsets.offset(0x6000, 1),
            ctx.data.len(),
        ));
    };
    e.step(&mut app).unwrap();
    assert_eq!(lookups, vec![(Some(0), Some(1), 3)]);
}

/// Identical object index on an input terminal and an output terminal.
const SHARED_INDEX: &str = r#"
[shared]
service_name = "pdx-it"

[master]
index = 0

[[slaves]]
position = 0
vendor_id = 0x00000002
product_code = 0x03F03052

[[slaves.entries]]
index = 0x7000
subindex = 1
direction = "input"

[[slaves]]
position = 1
vendor_id = 0x00000002
product_code = 0x07113052

[[slaves.entries]]
index = 0x7000
subindex = 1

[application]
index = 0x7000
subindex = 1
"#;

#[test]
fn constant_writer_targets_the_output_slave() {
    let cfg = config(SHARED_INDEX);
    let mut e = engine(&cfg, SimClock::new(ANCHOR));
    let mut app = ConstantWriter::from_config(&cfg, e.offsets()).unwrap();

    let output_slave = e.offsets().slave(1).unwrap();
    let output = e.offsets().slave_entry(output_slave, 0x7000, 1).unwrap();
    let input_slave = e.offsets().slave(0).unwrap();
    let input = e.offsets().slave_entry(input_slave, 0x7000, 1).copied().unwrap();
    assert_eq!(app.offset(), output.byte_offset);
    assert_ne!(app.offset(), input.byte_offset);

    assert!(e.master_mut().set_input(0, 0x7000, 1, 0x12));
    e.run_for(&mut app, 5).unwrap();

    assert_eq!(e.master().slave_value(1, 0x7000, 1), Some(0x66));
    assert_eq!(domain_image(&mut e)[input.byte_offset], 0x12);
}
