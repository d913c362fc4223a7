// SPDX-License-Identifier: GPL-2.0
//
// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! The seam between the policy and the machinery that actually parks and
//! wakes kthreads.
//!
//! The policy never touches a core directly. Every wakeup and idle
//! operation, and every perf sample the subcontrollers consume, goes
//! through this trait. Hosts implement it over their syscall layer; tests
//! implement it over scripted in-memory state.

use crate::types::Pid;
use crate::types::SchedError;

/// Lower-scheduler operations consumed by the policy.
///
/// All methods must return promptly. The policy runs on the iokernel's
/// single polling thread and never blocks; an implementation that cannot
/// complete an action immediately reports [`SchedError::Busy`] instead of
/// waiting.
pub trait Ksched {
    /// Number of kthreads of `pid` that can be woken right now. A kthread
    /// stuck mid-detach counts as unavailable even though it no longer
    /// occupies a core.
    fn threads_avail(&self, pid: Pid) -> usize;

    /// Wake a kthread of `pid` on `core`.
    fn run_on_core(&mut self, pid: Pid, core: usize) -> Result<(), SchedError>;

    /// Evict whatever runs on `core` and leave the core idle.
    fn idle_on_core(&mut self, core: usize) -> Result<(), SchedError>;

    /// Instructions per cycle retired on `core` since the previous sample,
    /// or `None` when the counters have nothing new.
    fn core_ipc(&mut self, core: usize) -> Option<f64>;

    /// Measured DRAM bandwidth, in bytes per microsecond.
    fn memory_bw(&mut self) -> f64;
}
