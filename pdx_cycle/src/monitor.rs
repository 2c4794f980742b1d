//! Change-only state monitoring.
//!
//! The monitor keeps the last observed link and exchange snapshots and
//! reports a transition only when a field differs from the previous
//! observation. The first observation of each kind establishes the
//! baseline and reports nothing.

use pdx_common::master::{
    AlStates, DomainId, ExchangeStateSnapshot, FieldbusMaster, LinkStateSnapshot, WcState,
};

/// Change of the master-level link state.
///
/// Each `Option` field is `Some(new value)` only if that field changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTransition {
    pub previous: LinkStateSnapshot,
    pub current: LinkStateSnapshot,
    pub slaves_responding: Option<u32>,
    pub al_states: Option<AlStates>,
    pub link_up: Option<bool>,
}

impl LinkTransition {
    /// `None` when both snapshots are identical.
    pub fn between(previous: LinkStateSnapshot, current: LinkStateSnapshot) -> Option<Self> {
        if previous == current {
            return None;
        }
        Some(Self {
            previous,
            current,
            slaves_responding: changed(previous.slaves_responding, current.slaves_responding),
            al_states: changed(previous.al_states, current.al_states),
            link_up: changed(previous.link_up, current.link_up),
        })
    }
}

/// Change of the domain exchange state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeTransition {
    pub previous: ExchangeStateSnapshot,
    pub current: ExchangeStateSnapshot,
    pub working_counter: Option<u32>,
    pub wc_state: Option<WcState>,
}

impl ExchangeTransition {
    pub fn between(
        previous: ExchangeStateSnapshot,
        current: ExchangeStateSnapshot,
    ) -> Option<Self> {
        if previous == current {
            return None;
        }
        Some(Self {
            previous,
            current,
            working_counter: changed(previous.working_counter, current.working_counter),
            wc_state: changed(previous.wc_state, current.wc_state),
        })
    }

    /// Exchange fell out of the complete state.
    pub fn is_degradation(&self) -> bool {
        self.previous.wc_state == WcState::Complete && self.current.wc_state != WcState::Complete
    }

    /// Exchange became complete again.
    pub fn is_recovery(&self) -> bool {
        self.previous.wc_state != WcState::Complete && self.current.wc_state == WcState::Complete
    }
}

#[inline]
fn changed<T: PartialEq + Copy>(previous: T, current: T) -> Option<T> {
    (previous != current).then_some(current)
}

/// Link / exchange state tracker.
#[derive(Debug, Clone)]
pub struct StateMonitor {
    link: Option<LinkStateSnapshot>,
    exchange: Option<ExchangeStateSnapshot>,
    link_check_interval: u32,
    expected_slaves: u32,
}

impl StateMonitor {
    /// `link_check_interval` is clamped to at least 1 cycle.
    pub fn new(link_check_interval: u32, expected_slaves: u32) -> Self {
        Self {
            link: None,
            exchange: None,
            link_check_interval: link_check_interval.max(1),
            expected_slaves,
        }
    }

    /// Whether the link state should be sampled in `cycle` (1-based).
    /// The first cycle is always due.
    #[inline]
    pub fn link_due(&self, cycle: u64) -> bool {
        cycle.saturating_sub(1) % self.link_check_interval as u64 == 0
    }

    /// Sample the master state and report a change.
    pub fn check_link_state<M: FieldbusMaster + ?Sized>(
        &mut self,
        master: &M,
    ) -> Option<LinkTransition> {
        self.observe_link(master.master_state())
    }

    /// Sample the domain state and report a change.
    pub fn check_exchange_state<M: FieldbusMaster + ?Sized>(
        &mut self,
        master: &M,
        domain: DomainId,
    ) -> Option<ExchangeTransition> {
        self.observe_exchange(master.domain_state(domain))
    }

    /// Record a link snapshot; the first one becomes the baseline.
    pub fn observe_link(&mut self, current: LinkStateSnapshot) -> Option<LinkTransition> {
        let transition = self
            .link
            .and_then(|previous| LinkTransition::between(previous, current));
        self.link = Some(current);
        transition
    }

    /// Record an exchange snapshot; the first one becomes the baseline.
    pub fn observe_exchange(
        &mut self,
        current: ExchangeStateSnapshot,
    ) -> Option<ExchangeTransition> {
        let transition = self
            .exchange
            .and_then(|previous| ExchangeTransition::between(previous, current));
        self.exchange = Some(current);
        transition
    }

    pub fn link_state(&self) -> Option<LinkStateSnapshot> {
        self.link
    }

    pub fn exchange_state(&self) -> Option<ExchangeStateSnapshot> {
        self.exchange
    }

    /// The last observations show a down link, missing slaves, or an
    /// incomplete exchange.
    pub fn is_degraded(&self) -> bool {
        let link_degraded = self
            .link
            .is_some_and(|l| !l.link_up || l.slaves_responding < self.expected_slaves);
        let exchange_degraded = self
            .exchange
            .is_some_and(|e| e.wc_state != WcState::Complete);
        link_degraded || exchange_degraded
    }

    pub fn link_check_interval(&self) -> u32 {
        self.link_check_interval
    }

    pub fn expected_slaves(&self) -> u32 {
        self.expected_slaves
    }
}
