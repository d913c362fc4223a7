// SPDX-License-Identifier: GPL-2.0
//
// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! The memory-bandwidth subcontroller.
//!
//! Best-effort expansion is only free while DRAM bandwidth is plentiful; a
//! saturated memory bus slows every latency-critical process on the
//! machine. On its cadence the subcontroller folds the measured bandwidth
//! into a moving average and steers it between two watermarks: above the
//! high mark it revokes one best-effort core from the most expanded
//! process and pins its thread limit down; below the low mark it lets
//! punished processes grow back toward their maximum, one thread per
//! cadence.

use std::cmp::Reverse;

use log::debug;

use crate::ksched::Ksched;
use crate::scheduler::Scheduler;
use crate::IAS_BW_HIGH_WATERMARK;
use crate::IAS_BW_LOW_WATERMARK;
use crate::IAS_EWMA_FACTOR;
use crate::NCPU;

/// Bandwidth-controller state, exported for the debug report.
#[derive(Debug, Clone, Default)]
pub struct BwStats {
    /// Moving average of the measured bandwidth, in bytes per microsecond.
    pub bw_cur: f64,
    /// Cores revoked since start.
    pub bw_punish: i64,
    /// Relax passes that grew at least one thread limit back.
    pub bw_relax: i64,
}

impl<K: Ksched> Scheduler<K> {
    pub(crate) fn bw_poll(&mut self) {
        let sample = self.ksched.memory_bw();
        let cur = self.bw.bw_cur;
        self.bw.bw_cur = if cur == 0.0 {
            sample
        } else {
            cur + IAS_EWMA_FACTOR * (sample - cur)
        };

        if self.bw.bw_cur >= IAS_BW_HIGH_WATERMARK {
            self.bw_punish();
        } else if self.bw.bw_cur <= IAS_BW_LOW_WATERMARK {
            self.bw_relax();
        }
    }

    /// Revoke one best-effort core from the most expanded process and cap
    /// its thread limit at what remains.
    fn bw_punish(&mut self) {
        let victim = self
            .attached()
            .filter(|p| p.threads_active > p.threads_guaranteed)
            .max_by_key(|p| (p.threads_active - p.threads_guaranteed, Reverse(p.idx)))
            .map(|p| p.idx);
        let Some(idx) = victim else {
            return;
        };

        // A process above its guarantee necessarily owns a core outside
        // its reservation; take the highest-numbered one.
        let target = self.procs[idx].as_ref().and_then(|p| {
            (0..NCPU)
                .rev()
                .find(|&core| self.cores[core] == Some(idx) && !p.claimed_cores.test_cpu(core))
        });
        let Some(core) = target else {
            return;
        };
        if self.idle_on_core(core).is_err() {
            // transient; the next cadence retries
            return;
        }

        if let Some(p) = self.procs[idx].as_mut() {
            p.threads_limit = p.threads_active.max(p.threads_guaranteed);
            p.is_bwlimited = true;
            debug!(
                "bw: revoked core {} from pid {}, limit now {}",
                core, p.pid, p.threads_limit
            );
        }
        self.bw.bw_punish += 1;
    }

    /// Let punished processes grow back, one thread per cadence.
    fn bw_relax(&mut self) {
        let mut relaxed = false;
        for slot in self.procs.iter_mut() {
            let Some(p) = slot.as_mut() else {
                continue;
            };
            if !p.is_bwlimited {
                continue;
            }

            p.threads_limit += 1;
            if p.threads_limit >= p.threads_max {
                p.threads_limit = p.threads_max;
                p.is_bwlimited = false;
            }
            relaxed = true;
        }
        if relaxed {
            self.bw.bw_relax += 1;
        }
    }
}
