//! Setup aborts with the failing step and releases the master.

use super::*;
use pdx_common::config::PdoEntryConfig;
use pdx_common::master::MasterError;
use pdx_cycle::ConfigurationError;

fn try_setup(library: &mut SimulatedLibrary, cfg: &EngineConfig) -> Result<SimEngine, ConfigurationError> {
    setup(library, cfg, SimClock::new(ANCHOR), Vec::new())
}

#[test]
fn unknown_pdo_entry_aborts_before_activation() {
    let bus = config(REFERENCE);
    let mut library = SimulatedLibrary::from_config(&bus);
    let probe = library.probe(0).unwrap();

    let mut cfg = bus.clone();
    cfg.slaves[0].entries.push(PdoEntryConfig {
        index: 0x0005,
        subindex: 3,
        bit_length: 8,
        direction: Default::default(),
        aliased: false,
    });

    let err = try_setup(&mut library, &cfg).err().expect("setup must fail");
    assert_eq!(
        err,
        ConfigurationError::PdoUnresolved {
            index: 0x0005,
            subindex: 3,
            source: MasterError::UnknownEntry {
                index: 0x0005,
                subindex: 3
            },
        }
    );
    assert_eq!(probe.counters().activations, 0);
    assert!(!probe.is_active());
    assert!(probe.is_released());
}

#[test]
fn missing_slave_names_the_address() {
    let bus = config(REFERENCE);
    let mut library = SimulatedLibrary::from_config(&bus);
    let probe = library.probe(0).unwrap();

    let mut cfg = bus.clone();
    cfg.slaves[0].position = 4;

    let err = try_setup(&mut library, &cfg).err().expect("setup must fail");
    match err {
        ConfigurationError::SlaveConfiguration { identity, source } => {
            assert_eq!(identity.alias, 69);
            assert_eq!(identity.position, 4);
            assert_eq!(
                source,
                MasterError::SlaveNotFound {
                    alias: 69,
                    position: 4
                }
            );
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(probe.is_released());
}

#[test]
fn unavailable_master_index() {
    let cfg = config(REFERENCE);
    let mut library = SimulatedLibrary::new();
    let err = try_setup(&mut library, &cfg).err().expect("setup must fail");
    assert_eq!(err, ConfigurationError::MasterNotFound { index: 0 });
    assert_eq!(err.to_string(), "master 0 not found");
}

#[test]
fn master_can_only_be_reserved_once() {
    let cfg = config(REFERENCE);
    let mut library = SimulatedLibrary::from_config(&cfg);
    let _first = try_setup(&mut library, &cfg).expect("first reservation");
    let err = try_setup(&mut library, &cfg).err().expect("already reserved");
    assert!(matches!(err, ConfigurationError::MasterNotFound { index: 0 }));
}
