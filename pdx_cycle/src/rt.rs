//! Real-time process preparation.
//!
//! ## Sequence
//! 1. `mlockall(MCL_CURRENT | MCL_FUTURE)`: no page faults in the loop
//! 2. Prefault stack pages
//! 3. `sched_setaffinity`: pin to an isolated CPU core
//! 4. `sched_setscheduler(SCHED_FIFO, priority)`
//!
//! Steps 1, 3 and 4 are only performed with the `rt` feature; without it
//! they are no-ops so the engine runs unprivileged against the simulated
//! bus.

use pdx_common::config::CycleConfig;
use tracing::info;

use crate::error::CycleError;

/// Stack prefaulted before entering the loop.
const PREFAULT_STACK_BYTES: usize = 256 * 1024;

/// RT scheduling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtSettings {
    /// CPU core the loop thread is pinned to.
    pub cpu_core: usize,
    /// SCHED_FIFO priority (1..=99).
    pub priority: i32,
}

impl RtSettings {
    pub fn from_config(cycle: &CycleConfig) -> Self {
        Self {
            cpu_core: cycle.cpu_core,
            priority: cycle.rt_priority,
        }
    }

    /// Apply to the calling thread. Must run before the first cycle.
    pub fn apply(&self) -> Result<(), CycleError> {
        lock_memory()?;
        prefault_stack();
        pin_to_core(self.cpu_core)?;
        set_fifo_priority(self.priority)?;

        if cfg!(feature = "rt") {
            info!(
                "RT setup done: core {}, SCHED_FIFO {}",
                self.cpu_core, self.priority
            );
        } else {
            info!("RT setup skipped (built without `rt` feature)");
        }
        Ok(())
    }
}

#[cfg(feature = "rt")]
fn lock_memory() -> Result<(), CycleError> {
    use nix::sys::mman::{MlockallFlags, mlockall};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| CycleError::RtSetup(format!("mlockall failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn lock_memory() -> Result<(), CycleError> {
    Ok(())
}

fn prefault_stack() {
    let mut buf = [0u8; PREFAULT_STACK_BYTES];
    for byte in buf.iter_mut() {
        // SAFETY: `byte` is a valid, exclusive reference into `buf`.
        unsafe { core::ptr::write_volatile(byte, 0xFF) };
    }
    core::hint::black_box(&buf);
}

#[cfg(feature = "rt")]
fn pin_to_core(cpu: usize) -> Result<(), CycleError> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| CycleError::RtSetup(format!("CpuSet::set({cpu}) failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| CycleError::RtSetup(format!("sched_setaffinity failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn pin_to_core(_cpu: usize) -> Result<(), CycleError> {
    Ok(())
}

#[cfg(feature = "rt")]
fn set_fifo_priority(priority: i32) -> Result<(), CycleError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    // SAFETY: `param` is a valid sched_param; pid 0 is the calling thread.
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(CycleError::RtSetup(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        )));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn set_fifo_priority(_priority: i32) -> Result<(), CycleError> {
    Ok(())
}
