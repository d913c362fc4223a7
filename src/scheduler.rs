// SPDX-License-Identifier: GPL-2.0
//
// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! The interference-aware placement policy.
//!
//! One [`Scheduler`] value owns all mutable policy state: the process
//! registry, the core ownership table, the idle and claimed bitmaps, and
//! the subcontroller clocks. The host's iokernel drives it through the
//! [`Policy`] entry points from a single polling thread; the policy calls
//! back into the lower scheduler through [`Ksched`] to wake or idle
//! specific cores and never blocks.

use crate::bw::BwStats;
use crate::cpumask::Cpumask;
use crate::ht;
use crate::ksched::Ksched;
use crate::proc::Proc;
use crate::stats;
use crate::topology::Topology;
use crate::types::Pid;
use crate::types::ProcIdx;
use crate::types::SchedError;
use crate::types::SchedSpec;
use crate::IAS_BW_POLL_US;
use crate::IAS_DEBUG_PRINT_US;
use crate::IAS_HT_POLL_US;
use crate::IAS_HT_WEIGHT;
use crate::IAS_NPROC;
use crate::NCPU;

/// The policy entry points the host scheduler invokes, one method per
/// slot of the C-style ops table.
pub trait Policy {
    /// Register a process and reserve its guaranteed cores, atomically or
    /// not at all. Returns the registry handle used by every other entry
    /// point.
    fn proc_attach(&mut self, pid: Pid, spec: &SchedSpec) -> Result<ProcIdx, SchedError>;

    /// Remove a process, releasing every core it occupies.
    fn proc_detach(&mut self, proc: ProcIdx);

    /// Periodic hint from the process: non-empty bitmaps mean it has
    /// queued work and wants another core, empty bitmaps mean it is
    /// content.
    fn notify_congested(&mut self, proc: ProcIdx, threads: &Cpumask, io: &Cpumask);

    /// The process reports it needs one more core right away.
    fn notify_core_needed(&mut self, proc: ProcIdx) -> Result<(), SchedError>;

    /// The main tick: advance time, run the subcontrollers on their
    /// cadences, and try to hand accumulated idle cores to congested
    /// processes.
    fn sched_poll(&mut self, now_us: u64, idle: &Cpumask);
}

/// Interference-aware core allocator.
pub struct Scheduler<K: Ksched> {
    pub(crate) ksched: K,
    pub(crate) topo: Topology,
    /// Registry slots. The vector length is the high-water mark of used
    /// indices; slots below it may be tombstones awaiting reuse.
    pub(crate) procs: Vec<Option<Proc>>,
    /// The process currently running on each core.
    pub(crate) cores: Vec<Option<ProcIdx>>,
    /// Cores reported idle and not yet re-assigned.
    pub(crate) idle_cores: Cpumask,
    /// Union of every process's claimed cores, seeded with the complement
    /// of the allowed set so reservation never leaves it.
    pub(crate) claimed_cores: Cpumask,
    pub(crate) now_us: u64,
    pub(crate) bw: BwStats,
    debug_ts: u64,
    bw_ts: u64,
    ht_ts: u64,
}

impl<K: Ksched> Scheduler<K> {
    pub fn new(ksched: K, topo: Topology) -> Scheduler<K> {
        let claimed_cores = topo.allowed().not();
        Scheduler {
            ksched,
            topo,
            procs: Vec::new(),
            cores: vec![None; NCPU],
            idle_cores: Cpumask::new(),
            claimed_cores,
            now_us: 0,
            bw: BwStats::default(),
            debug_ts: 0,
            bw_ts: 0,
            ht_ts: 0,
        }
    }

    /// The descriptor behind a registry handle, if still attached.
    pub fn proc(&self, idx: ProcIdx) -> Option<&Proc> {
        self.procs.get(idx)?.as_ref()
    }

    /// The process currently running on `core`.
    pub fn core_owner(&self, core: usize) -> Option<ProcIdx> {
        self.cores[core]
    }

    pub fn idle_cores(&self) -> &Cpumask {
        &self.idle_cores
    }

    pub fn claimed_cores(&self) -> &Cpumask {
        &self.claimed_cores
    }

    pub fn nr_procs(&self) -> usize {
        self.procs.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn topology(&self) -> &Topology {
        &self.topo
    }

    pub fn bw_stats(&self) -> &BwStats {
        &self.bw
    }

    pub fn now_us(&self) -> u64 {
        self.now_us
    }

    /// The lower-scheduler backend.
    pub fn ksched(&self) -> &K {
        &self.ksched
    }

    pub fn ksched_mut(&mut self) -> &mut K {
        &mut self.ksched
    }

    /// Iterate over attached processes in ascending slot order.
    pub(crate) fn attached(&self) -> impl Iterator<Item = &Proc> {
        self.procs.iter().filter_map(|slot| slot.as_ref())
    }

    /// Stamp the departing owner's locality clock and release `core`.
    fn cleanup_core(&mut self, core: usize) {
        if let Some(idx) = self.cores[core] {
            if let Some(p) = self.procs[idx].as_mut() {
                p.loc_last_us[core] = self.now_us;
                p.threads_active -= 1;
            }
        }
        self.cores[core] = None;
    }

    pub(crate) fn has_priority(&self, p: &Proc, core: usize) -> bool {
        p.claimed_cores.test_cpu(core)
    }

    /// Estimate how well `p` and `core` pair together. Reservation
    /// priority dominates, then cache locality, then hyperthread-pairing
    /// quality against whatever owns the sibling.
    pub(crate) fn calculate_score(&self, p: &Proc, core: usize) -> f64 {
        let sib = self.topo.sibling(core);
        let sib_owner = self.cores[sib].and_then(|idx| self.procs[idx].as_ref());

        let mut score = if self.has_priority(p, core) { 100.0 } else { 0.0 };
        score += self.loc_score(p, core);

        // If the sibling's owner holds priority over this core, it is the
        // primary of the pairing and we would be the intruder.
        let ht_score = match sib_owner {
            Some(owner) if owner.idx != p.idx && self.has_priority(owner, core) => {
                ht::pairing_score(owner, Some(p))
            }
            _ => ht::pairing_score(p, sib_owner),
        };

        score + IAS_HT_WEIGHT * ht_score
    }

    /// Pick the best core for `p`, or `None` when no candidate scores
    /// above zero. LC placement considers only the reserved cores; BE
    /// placement only idle ones.
    pub(crate) fn choose_core(&self, idx: ProcIdx, lc: bool) -> Option<usize> {
        let p = self.proc(idx)?;
        let mut best_core = None;
        let mut best_score = 0.0f64;

        for core in self.topo.allowed().iter() {
            if lc {
                if !self.has_priority(p, core) {
                    continue;
                }
                // can't re-wake on a core we already occupy
                if self.cores[core] == Some(idx) {
                    continue;
                }
            } else if self.cores[core].is_some() {
                continue;
            }

            let score = self.calculate_score(p, core);
            if score > best_score {
                best_score = score;
                best_core = Some(core);
            }
        }
        best_core
    }

    /// Pick the congested process that scores best on `core`.
    pub(crate) fn choose_kthread(&self, core: usize) -> Option<ProcIdx> {
        let mut best_proc = None;
        let mut best_score = 0.0f64;

        for p in self.attached() {
            if !p.is_congested {
                continue;
            }
            if p.threads_active >= p.threads_limit {
                continue;
            }

            let score = self.calculate_score(p, core);
            if score > best_score {
                best_score = score;
                best_proc = Some(p.idx);
            }
        }
        best_proc
    }

    /// Wake a kthread of the process in slot `idx` on `core`, evicting
    /// whatever ran there.
    pub(crate) fn run_kthread_on_core(
        &mut self,
        idx: ProcIdx,
        core: usize,
    ) -> Result<(), SchedError> {
        let pid = match self.proc(idx) {
            Some(p) => p.pid,
            None => return Err(SchedError::Invalid),
        };

        // A kthread can be stuck waiting to detach and thus temporarily
        // unavailable even though it no longer holds a core. Check with
        // the lower layer to catch the race before committing.
        if self.ksched.threads_avail(pid) == 0 {
            return Err(SchedError::Busy);
        }
        self.ksched.run_on_core(pid, core)?;

        self.cleanup_core(core);
        self.cores[core] = Some(idx);
        let _ = self.idle_cores.clear_cpu(core);
        if let Some(p) = self.procs[idx].as_mut() {
            p.threads_active += 1;
        }
        Ok(())
    }

    /// Evict the current occupant of `core` and leave the core idle.
    pub fn idle_on_core(&mut self, core: usize) -> Result<(), SchedError> {
        if self.ksched.idle_on_core(core).is_err() {
            return Err(SchedError::Busy);
        }

        self.cleanup_core(core);
        let _ = self.idle_cores.set_cpu(core);
        Ok(())
    }

    /// Grant the process one more core: on its reservation while below
    /// the guarantee, on any idle core beyond it.
    pub(crate) fn add_kthread(&mut self, idx: ProcIdx) -> Result<(), SchedError> {
        let (is_lc, at_limit) = match self.proc(idx) {
            Some(p) => (p.is_lc(), p.threads_active >= p.threads_limit),
            None => return Err(SchedError::Invalid),
        };
        if at_limit {
            return Err(SchedError::NoSpace);
        }

        let core = self.choose_core(idx, is_lc).ok_or(SchedError::NoSpace)?;
        self.run_kthread_on_core(idx, core)
    }

    /// Pick a congested process and wake it on `core`.
    pub fn add_kthread_on_core(&mut self, core: usize) -> Result<(), SchedError> {
        let idx = self.choose_kthread(core).ok_or(SchedError::NoSpace)?;
        self.run_kthread_on_core(idx, core)
    }
}

impl<K: Ksched> Policy for Scheduler<K> {
    fn proc_attach(&mut self, pid: Pid, spec: &SchedSpec) -> Result<ProcIdx, SchedError> {
        if self.procs.len() >= IAS_NPROC {
            return Err(SchedError::NoSpace);
        }
        if spec.guaranteed_cores % 2 != 0 {
            return Err(SchedError::Invalid);
        }

        // Reserve priority cores in sibling pairs, lowest free pair first.
        let mut claimed = Cpumask::new();
        let mut need = spec.guaranteed_cores;
        while need > 0 {
            let core = match self.claimed_cores.next_cleared(0) {
                Some(core) => core,
                None => {
                    // roll the partial reservation back out
                    self.claimed_cores ^= &claimed;
                    return Err(SchedError::NoSpace);
                }
            };
            let sib = self.topo.sibling(core);
            let _ = claimed.set_cpu(core);
            let _ = self.claimed_cores.set_cpu(core);
            let _ = claimed.set_cpu(sib);
            let _ = self.claimed_cores.set_cpu(sib);
            need = need.saturating_sub(2);
        }

        // Reuse the lowest tombstone, or grow the high-water mark.
        let idx = self
            .procs
            .iter()
            .position(|slot| slot.is_none())
            .unwrap_or(self.procs.len());
        let mut p = Proc::new(pid, idx, spec);
        p.claimed_cores = claimed;
        if idx == self.procs.len() {
            self.procs.push(Some(p));
        } else {
            self.procs[idx] = Some(p);
        }
        Ok(idx)
    }

    fn proc_detach(&mut self, proc: ProcIdx) {
        if proc >= self.procs.len() || self.procs[proc].is_none() {
            return;
        }

        // The departing reservation stays in the global claimed bitmap.
        self.procs[proc] = None;
        if proc == self.procs.len() - 1 {
            self.procs.pop();
        }

        for core in 0..NCPU {
            if self.cores[core] == Some(proc) {
                self.cores[core] = None;
            }
        }
    }

    fn notify_congested(&mut self, proc: ProcIdx, threads: &Cpumask, io: &Cpumask) {
        let has_work = threads.weight() + io.weight() != 0;
        {
            let p = match self.procs.get_mut(proc).and_then(|slot| slot.as_mut()) {
                Some(p) => p,
                None => return,
            };
            if !has_work {
                p.is_congested = false;
                return;
            }
            if p.is_congested {
                return;
            }
        }

        // Try to add a core right away; otherwise stay marked congested
        // and let the idle sweep retry on later ticks.
        if self.add_kthread(proc).is_err() {
            if let Some(p) = self.procs[proc].as_mut() {
                p.is_congested = true;
            }
        }
    }

    fn notify_core_needed(&mut self, proc: ProcIdx) -> Result<(), SchedError> {
        self.add_kthread(proc)
    }

    fn sched_poll(&mut self, now_us: u64, idle: &Cpumask) {
        self.now_us = now_us;

        if now_us - self.debug_ts >= IAS_DEBUG_PRINT_US {
            self.debug_ts = now_us;
            stats::print_debug_info(self);
        }
        if now_us - self.bw_ts >= IAS_BW_POLL_US {
            self.bw_ts = now_us;
            self.bw_poll();
        }
        if now_us - self.ht_ts >= IAS_HT_POLL_US {
            self.ht_ts = now_us;
            self.ht_poll();
        }

        if !idle.is_empty() {
            self.idle_cores |= idle;
        }

        // Hand accumulated idle cores to congested processes. A core with
        // no taker keeps its idle bit and is retried next tick.
        let pending: Vec<usize> = self.idle_cores.iter().collect();
        for core in pending {
            if let Some(owner) = self.cores[core] {
                // the owner went idle here on its own; it is not starved
                if let Some(p) = self.procs[owner].as_mut() {
                    p.is_congested = false;
                }
            }
            self.cleanup_core(core);
            let _ = self.add_kthread_on_core(core);
        }
    }
}
