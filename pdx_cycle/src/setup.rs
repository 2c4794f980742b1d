//! Setup sequence.
//!
//! 1. Request the master by index
//! 2. Probe and log the initial link state (monitor baseline)
//! 3. Create the domain
//! 4. Configure every slave and register its PDO entries
//! 5. Activate the master
//! 6. Fetch the domain buffer and seal the offset table against its size
//!
//! Any failure aborts the sequence with the [`ConfigurationError`] of the
//! failing step. Once a master has been obtained it is released before the
//! error is returned, and a registration failure never reaches activation.

use pdx_common::config::EngineConfig;
use pdx_common::master::{FieldbusMaster, MasterLibrary};
use pdx_common::time::CycleTimer;
use tracing::{debug, info, warn};

use crate::clock::CycleClock;
use crate::cycle::ExchangeLoop;
use crate::error::ConfigurationError;
use crate::events::EventSink;
use crate::monitor::StateMonitor;
use crate::registry::{OffsetRegistry, OffsetTable};

/// Run the setup sequence and build the exchange loop.
///
/// The schedule is anchored on the first cycle, not here.
pub fn setup<L, T, S>(
    library: &mut L,
    config: &EngineConfig,
    timer: T,
    sink: S,
) -> Result<ExchangeLoop<L::Master, T, S>, ConfigurationError>
where
    L: MasterLibrary,
    T: CycleTimer,
    S: EventSink,
{
    let index = config.master.index;
    let mut master = library
        .request_master(index)
        .ok_or(ConfigurationError::MasterNotFound { index })?;
    info!("Master {} reserved", index);

    let mut monitor = StateMonitor::new(
        config.cycle.link_check_interval,
        config.slaves.len() as u32,
    );

    let offsets = match configure(&mut master, config, &mut monitor) {
        Ok(offsets) => offsets,
        Err(e) => {
            warn!("Setup failed: {}; releasing master {}", e, index);
            master.release();
            return Err(e);
        }
    };

    let period_ns = config.cycle.period_ns();
    let clock = CycleClock::new(timer, period_ns, config.cycle.overrun_tolerance_ns());
    info!(
        "Setup complete: {} slave(s), {} PDO entries, domain {} bytes, period {}ns",
        config.slaves.len(),
        offsets.len(),
        offsets.domain_len(),
        period_ns
    );

    Ok(ExchangeLoop::new(
        master,
        offsets,
        monitor,
        clock,
        sink,
        config.cycle.stats_interval,
    ))
}

fn configure<M: FieldbusMaster>(
    master: &mut M,
    config: &EngineConfig,
    monitor: &mut StateMonitor,
) -> Result<OffsetTable, ConfigurationError> {
    let initial = master.master_state();
    monitor.observe_link(initial);
    info!("{} slave(s).", initial.slaves_responding);
    info!("AL states: 0x{:02X}.", initial.al_states.bits());
    info!("Link is {}.", if initial.link_up { "up" } else { "down" });

    let domain = master
        .create_domain()
        .map_err(ConfigurationError::DomainCreation)?;
    debug!("Domain {} created", domain);

    let mut registry = OffsetRegistry::new(domain);
    for slave in &config.slaves {
        let identity = slave.identity();
        let slave_id = master
            .configure_slave(identity)
            .map_err(|source| ConfigurationError::SlaveConfiguration { identity, source })?;
        debug!("Slave {} configured as {}", identity, slave_id);
        registry.add_slave(slave_id)?;

        for entry in &slave.entries {
            if entry.aliased {
                registry.register_aliased(master, slave_id, entry.index, entry.subindex)?;
            } else {
                registry.register(master, slave_id, entry.index, entry.subindex)?;
            }
        }
    }

    master.activate().map_err(ConfigurationError::Activation)?;
    info!("Master activated");

    let domain_len = master
        .domain_data(domain)
        .map(|data| data.len())
        .ok_or(ConfigurationError::DomainDataUnavailable(domain))?;

    registry.seal(domain_len)
}
