// SPDX-License-Identifier: GPL-2.0
//
// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! Shared test harness: a scriptable in-memory lower scheduler.

#![allow(dead_code)]

use ias_core::{Cpumask, Ksched, Pid, SchedError, Scheduler, Topology, NCPU};

/// In-memory stand-in for the syscall layer beneath the policy. Wakeups
/// and idles always succeed unless scripted otherwise, and every call is
/// logged so tests can assert the policy actually drove the hardware.
pub struct SimKsched {
    pub avail: usize,
    pub fail_run: bool,
    pub fail_idle: bool,
    pub ipc: Vec<Option<f64>>,
    pub bw: f64,
    pub run_log: Vec<(Pid, usize)>,
    pub idle_log: Vec<usize>,
}

impl Default for SimKsched {
    fn default() -> Self {
        Self {
            avail: usize::MAX,
            fail_run: false,
            fail_idle: false,
            ipc: vec![None; NCPU],
            bw: 0.0,
            run_log: Vec::new(),
            idle_log: Vec::new(),
        }
    }
}

impl Ksched for SimKsched {
    fn threads_avail(&self, _pid: Pid) -> usize {
        self.avail
    }

    fn run_on_core(&mut self, pid: Pid, core: usize) -> Result<(), SchedError> {
        if self.fail_run {
            return Err(SchedError::Busy);
        }
        self.run_log.push((pid, core));
        Ok(())
    }

    fn idle_on_core(&mut self, core: usize) -> Result<(), SchedError> {
        if self.fail_idle {
            return Err(SchedError::Busy);
        }
        self.idle_log.push(core);
        Ok(())
    }

    fn core_ipc(&mut self, core: usize) -> Option<f64> {
        self.ipc.get(core).copied().flatten()
    }

    fn memory_bw(&mut self) -> f64 {
        self.bw
    }
}

/// A policy over a synthetic topology of `nr_cores` cores with adjacent
/// sibling pairs.
pub fn harness(nr_cores: usize) -> Scheduler<SimKsched> {
    Scheduler::new(SimKsched::default(), Topology::synthetic(nr_cores))
}

/// A mask with the given bits set.
pub fn mask_of(cores: &[usize]) -> Cpumask {
    let mut mask = Cpumask::new();
    for &core in cores {
        mask.set_cpu(core).unwrap();
    }
    mask
}
