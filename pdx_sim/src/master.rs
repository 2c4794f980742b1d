//! Simulated fieldbus master.
//!
//! `SimulatedMaster` implements `FieldbusMaster` over a virtual bus of
//! `SimulatedSlave`s. The process image behaves like a logical read/write
//! frame:
//!
//! - `send()` takes the queued domain image, hands output entries to online
//!   slaves and fills input entries from them; the frame is then in flight
//! - `receive()` collects frames that were in flight
//! - `domain_process()` copies the input entries of the collected frame into
//!   the domain image and updates the working counter
//!
//! Output bytes of the domain image are never written by the bus, so values
//! written by the application stay visible until it overwrites them.
//!
//! Working counter per slave and domain: +2 when it accepted outputs, +1 when
//! it provided inputs.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use pdx_common::config::{EngineConfig, PdoDirection, SlaveConfig};
use pdx_common::master::{
    AlStates, DomainId, ExchangeStateSnapshot, FieldbusMaster, LinkStateSnapshot, MasterError,
    MasterLibrary, PdoPlacement, SlaveConfigId, SlaveIdentity, WcState,
};
use tracing::{debug, info};

// ─── Slaves ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct SimEntry {
    index: u16,
    subindex: u8,
    bit_length: u16,
    direction: PdoDirection,
    value: u64,
}

impl SimEntry {
    fn byte_len(&self) -> usize {
        (self.bit_length as usize).div_ceil(8)
    }

    fn mask(&self) -> u64 {
        if self.bit_length >= 64 {
            u64::MAX
        } else {
            (1u64 << self.bit_length) - 1
        }
    }
}

/// A virtual slave device with a fixed PDO mapping.
#[derive(Debug, Clone)]
pub struct SimulatedSlave {
    identity: SlaveIdentity,
    entries: Vec<SimEntry>,
    online: bool,
    al_state: AlStates,
}

impl SimulatedSlave {
    /// Create an online slave in PREOP with an empty mapping.
    pub fn new(identity: SlaveIdentity) -> Self {
        Self {
            identity,
            entries: Vec::new(),
            online: true,
            al_state: AlStates::PREOP,
        }
    }

    /// Add a mapped PDO entry.
    pub fn with_entry(
        mut self,
        index: u16,
        subindex: u8,
        bit_length: u16,
        direction: PdoDirection,
    ) -> Self {
        self.entries.push(SimEntry {
            index,
            subindex,
            bit_length,
            direction,
            value: 0,
        });
        self
    }

    /// Bus address and identity.
    pub fn identity(&self) -> SlaveIdentity {
        self.identity
    }

    /// Whether the slave answers on the bus.
    pub fn is_online(&self) -> bool {
        self.online
    }

    /// Current application-layer state.
    pub fn al_state(&self) -> AlStates {
        self.al_state
    }

    /// Last value of a mapped entry (received output or provided input).
    pub fn value(&self, index: u16, subindex: u8) -> Option<u64> {
        self.find(index, subindex).map(|i| self.entries[i].value)
    }

    fn find(&self, index: u16, subindex: u8) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.index == index && e.subindex == subindex)
    }
}

impl From<&SlaveConfig> for SimulatedSlave {
    fn from(config: &SlaveConfig) -> Self {
        config
            .entries
            .iter()
            .fold(Self::new(config.identity()), |slave, e| {
                slave.with_entry(e.index, e.subindex, e.bit_length, e.direction)
            })
    }
}

// ─── Domains ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Registration {
    slave: usize,
    entry: usize,
    placement: PdoPlacement,
}

#[derive(Debug)]
struct Frame {
    data: Vec<u8>,
    working_counter: u32,
}

#[derive(Debug, Default)]
struct SimDomain {
    regs: Vec<Registration>,
    size: usize,
    data: Vec<u8>,
    queued: bool,
    in_flight: Option<Frame>,
    arrived: Option<Frame>,
    state: ExchangeStateSnapshot,
    expected_wc: u32,
}

fn read_value(data: &[u8], placement: &PdoPlacement, entry: &SimEntry) -> u64 {
    let mut bytes = [0u8; 8];
    let len = entry.byte_len();
    bytes[..len].copy_from_slice(&data[placement.byte_offset..placement.byte_offset + len]);
    u64::from_le_bytes(bytes) & entry.mask()
}

fn write_value(data: &mut [u8], placement: &PdoPlacement, entry: &SimEntry) {
    let len = entry.byte_len();
    let bytes = (entry.value & entry.mask()).to_le_bytes();
    data[placement.byte_offset..placement.byte_offset + len].copy_from_slice(&bytes[..len]);
}

/// Working counter a domain frame collects from the given slaves.
fn working_counter(regs: &[Registration], slaves: &[SimulatedSlave], online_only: bool) -> u32 {
    let mut outputs = HashSet::new();
    let mut inputs = HashSet::new();
    for reg in regs {
        let slave = &slaves[reg.slave];
        if online_only && !slave.online {
            continue;
        }
        match slave.entries[reg.entry].direction {
            PdoDirection::Output => outputs.insert(reg.slave),
            PdoDirection::Input => inputs.insert(reg.slave),
        };
    }
    (2 * outputs.len() + inputs.len()) as u32
}

// ─── Master ─────────────────────────────────────────────────────────

/// Cyclic call counters of a simulated master.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimCounters {
    /// `send()` calls.
    pub sends: u64,
    /// `receive()` calls.
    pub receives: u64,
    /// Queued frames dropped because the link was down.
    pub frames_lost: u64,
    /// `application_time()` calls.
    pub app_time_updates: u64,
    /// `activate()` attempts.
    pub activations: u64,
}

#[derive(Debug, Default)]
struct ProbeState {
    counters: SimCounters,
    active: bool,
    released: bool,
}

/// Lifecycle observer that outlives its master.
///
/// Taken before the master is handed to a library, it still reports
/// activation and release after the master itself has been dropped.
/// Counters are refreshed on `activate()`, `send()` and `release()`.
#[derive(Debug, Clone, Default)]
pub struct SimProbe {
    state: Arc<Mutex<ProbeState>>,
}

impl SimProbe {
    /// Counters as of the last refresh.
    pub fn counters(&self) -> SimCounters {
        self.state.lock().counters
    }

    /// Whether the master is activated and not released.
    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    /// Whether `release()` was called.
    pub fn is_released(&self) -> bool {
        self.state.lock().released
    }

    fn sync(&self, counters: SimCounters, active: bool, released: bool) {
        let mut st = self.state.lock();
        st.counters = counters;
        st.active = active;
        st.released = released;
    }
}

/// Software-emulated fieldbus master.
#[derive(Debug)]
pub struct SimulatedMaster {
    index: u32,
    slaves: Vec<SimulatedSlave>,
    link_up: bool,
    configs: Vec<usize>,
    domains: Vec<SimDomain>,
    active: bool,
    released: bool,
    app_time_ns: Option<u64>,
    counters: SimCounters,
    probe: SimProbe,
    fail_domain_creation: bool,
    fail_activation: bool,
}

impl SimulatedMaster {
    /// Create master `index` with the given bus, link up.
    pub fn new(index: u32, slaves: Vec<SimulatedSlave>) -> Self {
        Self {
            index,
            slaves,
            link_up: true,
            configs: Vec::new(),
            domains: Vec::new(),
            active: false,
            released: false,
            app_time_ns: None,
            counters: SimCounters::default(),
            probe: SimProbe::default(),
            fail_domain_creation: false,
            fail_activation: false,
        }
    }

    /// Master index.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Plug or unplug the network cable.
    pub fn set_link_up(&mut self, up: bool) {
        debug!("sim master {}: link {}", self.index, if up { "up" } else { "down" });
        self.link_up = up;
    }

    /// Bring a slave (by bus order) on or off the bus.
    pub fn set_slave_online(&mut self, slave: usize, online: bool) {
        if let Some(s) = self.slaves.get_mut(slave) {
            s.online = online;
        }
    }

    /// Set the value a slave provides for an input entry.
    ///
    /// Returns `false` if the slave or entry does not exist.
    pub fn set_input(&mut self, slave: usize, index: u16, subindex: u8, value: u64) -> bool {
        let Some(s) = self.slaves.get_mut(slave) else {
            return false;
        };
        match s.find(index, subindex) {
            Some(i) => {
                s.entries[i].value = value;
                true
            }
            None => false,
        }
    }

    /// Value a slave holds for an entry.
    pub fn slave_value(&self, slave: usize, index: u16, subindex: u8) -> Option<u64> {
        self.slaves.get(slave)?.value(index, subindex)
    }

    /// Virtual bus.
    pub fn slaves(&self) -> &[SimulatedSlave] {
        &self.slaves
    }

    /// Last application time published by the engine.
    pub fn application_time_ns(&self) -> Option<u64> {
        self.app_time_ns
    }

    /// Call counters.
    pub fn counters(&self) -> SimCounters {
        self.counters
    }

    /// Whether `activate()` succeeded and `release()` was not called since.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Whether `release()` was called.
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Shared lifecycle observer.
    pub fn probe(&self) -> SimProbe {
        self.probe.clone()
    }

    fn sync_probe(&self) {
        self.probe.sync(self.counters, self.active, self.released);
    }

    /// Make `create_domain()` fail.
    pub fn fail_domain_creation(&mut self, fail: bool) {
        self.fail_domain_creation = fail;
    }

    /// Make `activate()` fail.
    pub fn fail_activation(&mut self, fail: bool) {
        self.fail_activation = fail;
    }

    fn domain_mut(&mut self, domain: DomainId) -> Result<&mut SimDomain, MasterError> {
        self.domains
            .get_mut(domain.0)
            .ok_or(MasterError::UnknownDomain(domain))
    }
}

impl FieldbusMaster for SimulatedMaster {
    fn create_domain(&mut self) -> Result<DomainId, MasterError> {
        if self.active {
            return Err(MasterError::AlreadyActive);
        }
        if self.fail_domain_creation {
            return Err(MasterError::Other("out of domain slots".to_string()));
        }
        self.domains.push(SimDomain::default());
        Ok(DomainId(self.domains.len() - 1))
    }

    fn configure_slave(&mut self, identity: SlaveIdentity) -> Result<SlaveConfigId, MasterError> {
        if self.active {
            return Err(MasterError::AlreadyActive);
        }
        let pos = self
            .slaves
            .iter()
            .position(|s| {
                s.identity.alias == identity.alias && s.identity.position == identity.position
            })
            .ok_or(MasterError::SlaveNotFound {
                alias: identity.alias,
                position: identity.position,
            })?;

        let found = self.slaves[pos].identity;
        if found.vendor_id != identity.vendor_id || found.product_code != identity.product_code {
            return Err(MasterError::IdentityMismatch {
                expected: identity,
                found,
            });
        }

        if let Some(existing) = self.configs.iter().position(|&s| s == pos) {
            return Ok(SlaveConfigId(existing));
        }
        self.configs.push(pos);
        Ok(SlaveConfigId(self.configs.len() - 1))
    }

    fn register_pdo_entry(
        &mut self,
        slave: SlaveConfigId,
        index: u16,
        subindex: u8,
        domain: DomainId,
    ) -> Result<PdoPlacement, MasterError> {
        if self.active {
            return Err(MasterError::AlreadyActive);
        }
        let slave_pos = *self
            .configs
            .get(slave.0)
            .ok_or(MasterError::UnknownSlaveConfig(slave))?;
        let entry = self.slaves[slave_pos]
            .find(index, subindex)
            .ok_or(MasterError::UnknownEntry { index, subindex })?;
        let bit_length = self.slaves[slave_pos].entries[entry].bit_length;
        let byte_len = self.slaves[slave_pos].entries[entry].byte_len();

        let dom = self.domain_mut(domain)?;
        if let Some(reg) = dom
            .regs
            .iter()
            .find(|r| r.slave == slave_pos && r.entry == entry)
        {
            return Ok(reg.placement);
        }

        let placement = PdoPlacement {
            byte_offset: dom.size,
            bit_position: 0,
            bit_length,
        };
        dom.size += byte_len;
        dom.regs.push(Registration {
            slave: slave_pos,
            entry,
            placement,
        });
        Ok(placement)
    }

    fn activate(&mut self) -> Result<(), MasterError> {
        if self.active {
            return Err(MasterError::AlreadyActive);
        }
        self.counters.activations += 1;
        if self.fail_activation {
            self.sync_probe();
            return Err(MasterError::Other("activation rejected".to_string()));
        }

        let Self {
            domains, slaves, ..
        } = self;
        for dom in domains.iter_mut() {
            dom.data = vec![0; dom.size];
            dom.expected_wc = working_counter(&dom.regs, slaves, false);
        }
        for &s in &self.configs {
            self.slaves[s].al_state = AlStates::OP;
        }
        self.active = true;
        self.sync_probe();
        info!(
            "sim master {} activated: {} domain(s), {} slave config(s)",
            self.index,
            self.domains.len(),
            self.configs.len()
        );
        Ok(())
    }

    fn domain_data(&mut self, domain: DomainId) -> Option<&mut [u8]> {
        if !self.active {
            return None;
        }
        self.domains.get_mut(domain.0).map(|d| d.data.as_mut_slice())
    }

    fn application_time(&mut self, app_time_ns: u64) {
        self.app_time_ns = Some(app_time_ns);
        self.counters.app_time_updates += 1;
    }

    fn receive(&mut self) {
        self.counters.receives += 1;
        for dom in &mut self.domains {
            dom.arrived = dom.in_flight.take();
        }
    }

    fn domain_process(&mut self, domain: DomainId) {
        let Self {
            domains, slaves, ..
        } = self;
        let Some(dom) = domains.get_mut(domain.0) else {
            return;
        };

        dom.state = match dom.arrived.take() {
            Some(frame) => {
                for reg in &dom.regs {
                    let entry = &slaves[reg.slave].entries[reg.entry];
                    if entry.direction == PdoDirection::Input {
                        let start = reg.placement.byte_offset;
                        let end = start + entry.byte_len();
                        dom.data[start..end].copy_from_slice(&frame.data[start..end]);
                    }
                }
                let wc_state = if frame.working_counter == 0 {
                    WcState::Zero
                } else if frame.working_counter == dom.expected_wc {
                    WcState::Complete
                } else {
                    WcState::Incomplete
                };
                ExchangeStateSnapshot {
                    working_counter: frame.working_counter,
                    wc_state,
                }
            }
            None => ExchangeStateSnapshot::default(),
        };
    }

    fn domain_queue(&mut self, domain: DomainId) {
        if let Ok(dom) = self.domain_mut(domain) {
            dom.queued = true;
        }
    }

    fn send(&mut self) {
        self.counters.sends += 1;
        let deliver = self.link_up && self.active;

        let Self {
            domains,
            slaves,
            counters,
            ..
        } = self;
        for dom in domains.iter_mut().filter(|d| d.queued) {
            dom.queued = false;
            if !deliver {
                dom.in_flight = None;
                counters.frames_lost += 1;
                continue;
            }

            let mut frame = dom.data.clone();
            for reg in &dom.regs {
                let slave = &mut slaves[reg.slave];
                if !slave.online {
                    continue;
                }
                let entry = &mut slave.entries[reg.entry];
                match entry.direction {
                    PdoDirection::Output => entry.value = read_value(&frame, &reg.placement, entry),
                    PdoDirection::Input => write_value(&mut frame, &reg.placement, entry),
                }
            }
            let working_counter = working_counter(&dom.regs, slaves, true);
            dom.in_flight = Some(Frame {
                data: frame,
                working_counter,
            });
        }
        self.sync_probe();
    }

    fn master_state(&self) -> LinkStateSnapshot {
        if !self.link_up {
            return LinkStateSnapshot::default();
        }
        let online = self.slaves.iter().filter(|s| s.online);
        LinkStateSnapshot {
            slaves_responding: online.clone().count() as u32,
            al_states: online.fold(AlStates::empty(), |acc, s| acc | s.al_state),
            link_up: true,
        }
    }

    fn domain_state(&self, domain: DomainId) -> ExchangeStateSnapshot {
        self.domains
            .get(domain.0)
            .map(|d| d.state)
            .unwrap_or_default()
    }

    fn release(&mut self) {
        if self.active {
            for &s in &self.configs {
                self.slaves[s].al_state = AlStates::PREOP;
            }
        }
        for dom in &mut self.domains {
            dom.in_flight = None;
            dom.arrived = None;
        }
        self.active = false;
        self.released = true;
        self.sync_probe();
        info!("sim master {} released", self.index);
    }
}

// ─── Library ────────────────────────────────────────────────────────

/// Simulated master library holding unreserved masters by index.
#[derive(Debug, Default)]
pub struct SimulatedLibrary {
    masters: HashMap<u32, SimulatedMaster>,
}

impl SimulatedLibrary {
    /// Create a library without masters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a master; it is reachable under its own index.
    pub fn with_master(mut self, master: SimulatedMaster) -> Self {
        self.masters.insert(master.index, master);
        self
    }

    /// Probe of a master that has not been requested yet.
    pub fn probe(&self, index: u32) -> Option<SimProbe> {
        self.masters.get(&index).map(SimulatedMaster::probe)
    }

    /// Build a bus where every configured slave is present with its mapping.
    pub fn from_config(config: &EngineConfig) -> Self {
        let slaves = config.slaves.iter().map(SimulatedSlave::from).collect();
        Self::new().with_master(SimulatedMaster::new(config.master.index, slaves))
    }
}

impl MasterLibrary for SimulatedLibrary {
    type Master = SimulatedMaster;

    fn request_master(&mut self, index: u32) -> Option<SimulatedMaster> {
        self.masters.remove(&index)
    }
}
