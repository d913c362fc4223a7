// SPDX-License-Identifier: GPL-2.0
//
// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! Per-process scheduling state.

use crate::cpumask::Cpumask;
use crate::types::Pid;
use crate::types::ProcIdx;
use crate::types::SchedSpec;
use crate::IAS_NPROC;
use crate::NCPU;

/// Scheduling state for one attached process.
///
/// `threads_guaranteed` counts the cores reserved at attach time (always
/// even, hyperthread-pair granularity). `threads_limit` is the dynamic
/// bound the bandwidth subcontroller moves between `threads_guaranteed`
/// and `threads_max`; `threads_active` never exceeds it.
#[derive(Debug, Clone)]
pub struct Proc {
    pub(crate) pid: Pid,
    pub(crate) idx: ProcIdx,
    pub(crate) threads_guaranteed: usize,
    pub(crate) threads_max: usize,
    pub(crate) threads_limit: usize,
    pub(crate) threads_active: usize,
    /// Cores reserved for this process; placement treats them as
    /// priority cores.
    pub(crate) claimed_cores: Cpumask,
    /// When this process last vacated each core, for the locality score.
    pub(crate) loc_last_us: Vec<u64>,
    /// Sticky "wants more cores" flag; cleared when the process reports
    /// no pending work or one of its cores is observed idle.
    pub(crate) is_congested: bool,
    pub(crate) is_bwlimited: bool,
    /// Peak IPC observed for this process.
    pub(crate) ht_max_ipc: f64,
    /// Observed IPC when sharing a physical core with each other process,
    /// indexed by that process's registry slot.
    pub(crate) ht_pairing_ipc: Vec<f64>,
}

impl Proc {
    pub(crate) fn new(pid: Pid, idx: ProcIdx, spec: &SchedSpec) -> Proc {
        Proc {
            pid,
            idx,
            threads_guaranteed: spec.guaranteed_cores,
            threads_max: spec.max_cores,
            threads_limit: spec.max_cores,
            threads_active: 0,
            claimed_cores: Cpumask::new(),
            loc_last_us: vec![0; NCPU],
            is_congested: false,
            is_bwlimited: false,
            ht_max_ipc: 0.0,
            ht_pairing_ipc: vec![0.0; IAS_NPROC],
        }
    }

    /// Whether the process still runs below its guaranteed reservation.
    /// Latency-critical placement applies while this holds; beyond it the
    /// process expands best-effort.
    pub fn is_lc(&self) -> bool {
        self.threads_active < self.threads_guaranteed
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn idx(&self) -> ProcIdx {
        self.idx
    }

    pub fn threads_guaranteed(&self) -> usize {
        self.threads_guaranteed
    }

    pub fn threads_max(&self) -> usize {
        self.threads_max
    }

    pub fn threads_limit(&self) -> usize {
        self.threads_limit
    }

    pub fn threads_active(&self) -> usize {
        self.threads_active
    }

    pub fn claimed_cores(&self) -> &Cpumask {
        &self.claimed_cores
    }

    pub fn is_congested(&self) -> bool {
        self.is_congested
    }

    pub fn is_bwlimited(&self) -> bool {
        self.is_bwlimited
    }

    pub fn ht_max_ipc(&self) -> f64 {
        self.ht_max_ipc
    }

    /// Observed IPC when paired with the process in registry slot `other`.
    pub fn pairing_ipc(&self, other: ProcIdx) -> f64 {
        self.ht_pairing_ipc[other]
    }

    /// When this process last vacated `core`, in microseconds.
    pub fn last_ran_on(&self, core: usize) -> u64 {
        self.loc_last_us[core]
    }
}
