// SPDX-License-Identifier: GPL-2.0
//
// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! Hyperthread-pairing and cache-locality estimation.
//!
//! Sibling logical cores contend for the physical core's pipelines and
//! caches, so how much a process suffers depends on who it shares with.
//! The HT subcontroller samples per-core IPC on its cadence and maintains,
//! per process, the peak observed IPC and a matrix of observed IPC against
//! each possible sibling process. The scoring side turns those into a
//! pairing quality in `[0, 1]` plus a locality estimate that decays as the
//! process's last run on a core recedes.

use crate::ksched::Ksched;
use crate::proc::Proc;
use crate::scheduler::Scheduler;
use crate::IAS_EWMA_FACTOR;
use crate::IAS_LOC_DECAY_US;

/// How well `primary` fares with `secondary` on the sibling: the ratio of
/// the observed paired IPC to `primary`'s best solo IPC. Zero until a
/// baseline exists, and a full 1.0 against an idle sibling.
pub(crate) fn pairing_score(primary: &Proc, secondary: Option<&Proc>) -> f64 {
    if primary.ht_max_ipc == 0.0 {
        return 0.0;
    }
    match secondary {
        None => 1.0,
        Some(other) => (primary.ht_pairing_ipc[other.idx] / primary.ht_max_ipc).max(0.0),
    }
}

impl<K: Ksched> Scheduler<K> {
    /// Cache-warmth estimate for running `p` on `core`: decays linearly
    /// from the moment the process last vacated the core, with the
    /// sibling's caches counted at half weight.
    pub(crate) fn loc_score(&self, p: &Proc, core: usize) -> f64 {
        let warm = |c: usize| {
            let age = self.now_us.saturating_sub(p.loc_last_us[c]);
            IAS_LOC_DECAY_US.saturating_sub(age) as f64 / IAS_LOC_DECAY_US as f64
        };
        warm(core) + 0.5 * warm(self.topo.sibling(core))
    }

    /// Fold fresh per-core IPC samples into the pairing matrix.
    pub(crate) fn ht_poll(&mut self) {
        let allowed: Vec<usize> = self.topo.allowed().iter().collect();
        for core in allowed {
            let Some(owner_idx) = self.cores[core] else {
                continue;
            };
            let Some(sample) = self.ksched.core_ipc(core) else {
                continue;
            };

            let sib = self.topo.sibling(core);
            let sib_owner = if sib == core { None } else { self.cores[sib] };
            let Some(owner) = self.procs[owner_idx].as_mut() else {
                continue;
            };

            if sample > owner.ht_max_ipc {
                owner.ht_max_ipc = sample;
            }
            if let Some(other) = sib_owner {
                let prev = owner.ht_pairing_ipc[other];
                owner.ht_pairing_ipc[other] = if prev == 0.0 {
                    sample
                } else {
                    prev + IAS_EWMA_FACTOR * (sample - prev)
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ksched::testing::StubKsched;
    use crate::scheduler::Policy;
    use crate::topology::Topology;
    use crate::types::{Pid, SchedSpec};
    use crate::Cpumask;

    const BE4: SchedSpec = SchedSpec {
        guaranteed_cores: 0,
        max_cores: 4,
    };

    fn sched4() -> Scheduler<StubKsched> {
        Scheduler::new(StubKsched::default(), Topology::synthetic(4))
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn paired_samples_build_the_matrix() {
        let mut sched = sched4();
        let a = sched.proc_attach(Pid(1), &BE4).unwrap();
        let b = sched.proc_attach(Pid(2), &BE4).unwrap();
        sched.run_kthread_on_core(a, 0).unwrap();
        sched.run_kthread_on_core(b, 1).unwrap();

        sched.ksched.ipc[0] = Some(1.5);
        sched.ht_poll();
        assert!(approx(sched.proc(a).unwrap().ht_max_ipc(), 1.5));
        assert!(approx(sched.proc(a).unwrap().pairing_ipc(b), 1.5));
        // no sample arrived for core 1
        assert!(approx(sched.proc(b).unwrap().ht_max_ipc(), 0.0));

        // later samples fold in as a moving average; the peak is sticky
        sched.ksched.ipc[0] = Some(0.5);
        sched.ht_poll();
        assert!(approx(sched.proc(a).unwrap().pairing_ipc(b), 1.25));
        assert!(approx(sched.proc(a).unwrap().ht_max_ipc(), 1.5));
    }

    #[test]
    fn solo_samples_raise_the_peak_only() {
        let mut sched = sched4();
        let a = sched.proc_attach(Pid(1), &BE4).unwrap();
        sched.run_kthread_on_core(a, 0).unwrap();

        sched.ksched.ipc[0] = Some(2.0);
        sched.ht_poll();

        let p = sched.proc(a).unwrap();
        assert!(approx(p.ht_max_ipc(), 2.0));
        for other in 0..crate::IAS_NPROC {
            assert!(approx(p.pairing_ipc(other), 0.0));
        }
    }

    #[test]
    fn pairing_score_edges() {
        let mut sched = sched4();
        let a = sched.proc_attach(Pid(1), &BE4).unwrap();
        let b = sched.proc_attach(Pid(2), &BE4).unwrap();
        sched.run_kthread_on_core(a, 0).unwrap();
        sched.run_kthread_on_core(b, 1).unwrap();
        sched.ksched.ipc[0] = Some(2.0);
        sched.ht_poll();
        sched.ksched.ipc[0] = None;

        let pa = sched.proc(a).unwrap();
        let pb = sched.proc(b).unwrap();
        // idle sibling is as good as it gets
        assert!(approx(pairing_score(pa, None), 1.0));
        assert!(approx(pairing_score(pa, Some(pb)), 1.0));
        // no baseline yet, so the other side scores zero everywhere
        assert!(approx(pairing_score(pb, Some(pa)), 0.0));
        assert!(approx(pairing_score(pb, None), 0.0));
    }

    #[test]
    fn locality_decays_linearly() {
        let mut sched = sched4();
        let a = sched.proc_attach(Pid(1), &BE4).unwrap();
        sched.sched_poll(1000, &Cpumask::new());

        {
            let p = sched.procs[a].as_mut().unwrap();
            p.loc_last_us[0] = 950;
        }
        let p = sched.proc(a).unwrap();
        // core 0 itself: 50us old out of a 200us window
        assert!(approx(sched.loc_score(p, 0), 150.0 / 200.0));
        // its sibling sees the same warmth at half weight
        assert!(approx(sched.loc_score(p, 1), 0.5 * 150.0 / 200.0));
        // a stone-cold core scores nothing
        assert!(approx(sched.loc_score(p, 2), 0.0));
    }
}
